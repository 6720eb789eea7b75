//! `vinoteka sync ...`: manual entry points into the sync pipeline.

use serde_json::json;

use vinoteka_core::domain::sync::{SyncTaskState, TaskKind};
use vinoteka_sync::{drift_report, enqueue_all, purge_tasks, SyncServices, WorkDispatcher};

use crate::commands::{with_database, CommandResult, Failure};

const CLI_CORRELATION_PREFIX: &str = "cli";

pub fn enqueue(kind: &str, input_id: &str) -> CommandResult {
    let command = "sync enqueue";
    let kind = match parse_kind(kind) {
        Ok(kind) => kind,
        Err(failure) => return CommandResult::from_failure(command, failure),
    };
    let input_id = input_id.to_string();

    let result = with_database(|config, pool| async move {
        let services = SyncServices::from_pool(pool, &config);
        let correlation_id = correlation_id();
        let task_id = services
            .dispatcher
            .enqueue(kind, &input_id, &correlation_id)
            .await
            .map_err(|error| ("enqueue", error.to_string(), 6u8))?;
        Ok::<_, Failure>(json!({
            "task_id": task_id.0,
            "task_kind": kind.as_str(),
            "input_id": input_id,
            "correlation_id": correlation_id,
        }))
    });

    match result {
        Ok(data) => CommandResult::success_with(command, "task enqueued", Some(data)),
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

pub fn enqueue_all_variants(kind: &str) -> CommandResult {
    let command = "sync enqueue-all";
    let kind = match parse_kind(kind) {
        Ok(TaskKind::ProjectCollection) => {
            return CommandResult::failure(
                command,
                "invalid_argument",
                "enqueue-all enumerates variant ids; use project-variant or compute-related",
                1,
            );
        }
        Ok(kind) => kind,
        Err(failure) => return CommandResult::from_failure(command, failure),
    };

    let result = with_database(|config, pool| async move {
        let services = SyncServices::from_pool(pool, &config);
        let summary = enqueue_all(
            services.source.as_ref(),
            services.flat.as_ref(),
            services.dispatcher.as_ref(),
            kind,
            &correlation_id(),
        )
        .await
        .map_err(|error| ("enqueue", error.to_string(), 6u8))?;
        Ok::<_, Failure>(summary.enqueued)
    });

    match result {
        Ok(enqueued) => CommandResult::success_with(
            command,
            format!("enqueued {enqueued} {} tasks", kind.as_str()),
            Some(json!({ "enqueued": enqueued, "task_kind": kind.as_str() })),
        ),
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

pub fn drift() -> CommandResult {
    let command = "sync drift";
    let result = with_database(|config, pool| async move {
        let services = SyncServices::from_pool(pool, &config);
        let report = drift_report(
            services.source.as_ref(),
            services.flat.as_ref(),
            services.related.as_ref(),
            services.queue.as_ref(),
            config.ranking.computation_version,
        )
        .await
        .map_err(|error| ("drift", error.to_string(), 6u8))?;
        Ok::<_, Failure>(report)
    });

    match result {
        Ok(report) => {
            let message = if report.is_clean() {
                "projections match the source catalog".to_string()
            } else {
                format!(
                    "{} variants missing a projection, {} served after unpublishing, \
                     {} related records outdated",
                    report.missing_projection.len(),
                    report.stale_published.len(),
                    report.outdated_related
                )
            };
            let data = serde_json::to_value(&report).ok();
            CommandResult::success_with(command, message, data)
        }
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

pub fn purge(kind: Option<&str>, states: &[String]) -> CommandResult {
    let command = "sync purge";
    let kind = match kind.map(parse_kind).transpose() {
        Ok(kind) => kind,
        Err(failure) => return CommandResult::from_failure(command, failure),
    };
    let states = match states
        .iter()
        .map(|state| {
            SyncTaskState::parse(state).ok_or_else(|| {
                ("invalid_argument", format!("unknown task state `{state}`"), 1u8)
            })
        })
        .collect::<Result<Vec<_>, Failure>>()
    {
        Ok(states) => states,
        Err(failure) => return CommandResult::from_failure(command, failure),
    };

    let result = with_database(|_, pool| async move {
        let queue = vinoteka_db::repositories::SqlSyncQueueRepository::new(pool);
        purge_tasks(&queue, kind, &states)
            .await
            .map_err(|error| ("purge", error.to_string(), 6u8))
    });

    match result {
        Ok(removed) => CommandResult::success_with(
            command,
            format!("purged {removed} tasks"),
            Some(json!({ "removed": removed })),
        ),
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

pub fn run_once(max_tasks: usize) -> CommandResult {
    let command = "sync run-once";
    let result = with_database(|config, pool| async move {
        let services = SyncServices::from_pool(pool, &config);
        services
            .worker(format!("{CLI_CORRELATION_PREFIX}-worker"))
            .run_once(max_tasks)
            .await
            .map_err(|error| ("worker", error.to_string(), 6u8))
    });

    match result {
        Ok(summary) => CommandResult::success_with(
            command,
            format!("processed {} tasks", summary.processed),
            Some(json!({
                "processed": summary.processed,
                "completed": summary.completed,
                "retry_scheduled": summary.retry_scheduled,
                "failed_terminal": summary.failed_terminal,
                "follow_ups_enqueued": summary.follow_ups_enqueued,
            })),
        ),
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

fn parse_kind(value: &str) -> Result<TaskKind, Failure> {
    TaskKind::parse(value).ok_or_else(|| {
        let known: Vec<&str> = TaskKind::ALL.iter().map(TaskKind::as_str).collect();
        (
            "invalid_argument",
            format!("unknown task kind `{value}` (expected one of: {})", known.join(", ")),
            1u8,
        )
    })
}

fn correlation_id() -> String {
    format!("{CLI_CORRELATION_PREFIX}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S%.6fZ"))
}
