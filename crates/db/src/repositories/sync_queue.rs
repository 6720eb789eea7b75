use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use vinoteka_core::domain::sync::{SyncTask, SyncTaskId, SyncTaskState, TaskKind, TaskOutcome};

use super::{
    format_timestamp, parse_count, parse_optional_timestamp, parse_timestamp, parse_u32,
    RepositoryError, SyncQueueRepository,
};
use crate::DbPool;

const TASK_COLUMNS: &str = "id,
    kind,
    input_id,
    state,
    attempt_count,
    max_retries,
    available_at,
    claimed_by,
    claimed_at,
    last_error,
    error_class,
    outcome,
    result_fingerprint,
    completed_at,
    correlation_id,
    created_at,
    updated_at";

pub struct SqlSyncQueueRepository {
    pool: DbPool,
}

impl SqlSyncQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SyncQueueRepository for SqlSyncQueueRepository {
    async fn save_task(&self, task: SyncTask) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sync_task (
                id,
                kind,
                input_id,
                state,
                attempt_count,
                max_retries,
                available_at,
                claimed_by,
                claimed_at,
                last_error,
                error_class,
                outcome,
                result_fingerprint,
                completed_at,
                correlation_id,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                input_id = excluded.input_id,
                state = excluded.state,
                attempt_count = excluded.attempt_count,
                max_retries = excluded.max_retries,
                available_at = excluded.available_at,
                claimed_by = excluded.claimed_by,
                claimed_at = excluded.claimed_at,
                last_error = excluded.last_error,
                error_class = excluded.error_class,
                outcome = excluded.outcome,
                result_fingerprint = excluded.result_fingerprint,
                completed_at = excluded.completed_at,
                correlation_id = excluded.correlation_id,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(task.kind.as_str())
        .bind(&task.input_id)
        .bind(task.state.as_str())
        .bind(i64::from(task.attempt_count))
        .bind(i64::from(task.max_retries))
        .bind(format_timestamp(task.available_at))
        .bind(task.claimed_by.as_deref())
        .bind(task.claimed_at.map(format_timestamp))
        .bind(task.last_error.as_deref())
        .bind(task.error_class.as_deref())
        .bind(task.outcome.map(|outcome| outcome.as_str()))
        .bind(task.result_fingerprint.as_deref())
        .bind(task.completed_at.map(format_timestamp))
        .bind(&task.correlation_id)
        .bind(format_timestamp(task.created_at))
        .bind(format_timestamp(task.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_task(&self, id: &SyncTaskId) -> Result<Option<SyncTask>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM sync_task WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(task_from_row).transpose()
    }

    async fn next_claimable(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<SyncTask>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS}
             FROM sync_task
             WHERE (state IN ('queued', 'retryable_failed') AND available_at <= ?)
                OR (state = 'running' AND claimed_at IS NOT NULL AND claimed_at < ?)
             ORDER BY available_at ASC, created_at ASC, id ASC
             LIMIT 1"
        ))
        .bind(format_timestamp(now))
        .bind(format_timestamp(stale_before))
        .fetch_optional(&self.pool)
        .await?;

        row.map(task_from_row).transpose()
    }

    async fn swap_task(
        &self,
        previous: &SyncTask,
        next: SyncTask,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE sync_task SET
                state = ?,
                attempt_count = ?,
                max_retries = ?,
                available_at = ?,
                claimed_by = ?,
                claimed_at = ?,
                last_error = ?,
                error_class = ?,
                outcome = ?,
                result_fingerprint = ?,
                completed_at = ?,
                updated_at = ?
             WHERE id = ?
               AND state = ?
               AND updated_at = ?
               AND IFNULL(claimed_by, '') = ?",
        )
        .bind(next.state.as_str())
        .bind(i64::from(next.attempt_count))
        .bind(i64::from(next.max_retries))
        .bind(format_timestamp(next.available_at))
        .bind(next.claimed_by.as_deref())
        .bind(next.claimed_at.map(format_timestamp))
        .bind(next.last_error.as_deref())
        .bind(next.error_class.as_deref())
        .bind(next.outcome.map(|outcome| outcome.as_str()))
        .bind(next.result_fingerprint.as_deref())
        .bind(next.completed_at.map(format_timestamp))
        .bind(format_timestamp(next.updated_at))
        .bind(&previous.id.0)
        .bind(previous.state.as_str())
        .bind(format_timestamp(previous.updated_at))
        .bind(previous.claimed_by.as_deref().unwrap_or_default())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_tasks(
        &self,
        kind: Option<TaskKind>,
        state: Option<SyncTaskState>,
        limit: usize,
    ) -> Result<Vec<SyncTask>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {TASK_COLUMNS} FROM sync_task WHERE 1 = 1"
        ));
        if let Some(kind) = kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(state) = state {
            query.push(" AND state = ").push_bind(state.as_str());
        }
        query.push(" ORDER BY created_at ASC, id ASC LIMIT ");
        query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(task_from_row).collect()
    }

    async fn count_by_state(&self) -> Result<Vec<(SyncTaskState, u64)>, RepositoryError> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS count FROM sync_task GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let state = parse_state(row.try_get("state")?)?;
            counts.insert(state, parse_count("count", row.try_get("count")?)?);
        }

        Ok(SyncTaskState::ALL
            .iter()
            .map(|state| (*state, counts.get(state).copied().unwrap_or(0)))
            .collect())
    }

    async fn purge(
        &self,
        kind: Option<TaskKind>,
        states: &[SyncTaskState],
    ) -> Result<u64, RepositoryError> {
        if states.is_empty() {
            return Ok(0);
        }

        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM sync_task WHERE state IN (");
        let mut separated = query.separated(", ");
        for state in states {
            separated.push_bind(state.as_str());
        }
        separated.push_unseparated(")");
        if let Some(kind) = kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn task_from_row(row: SqliteRow) -> Result<SyncTask, RepositoryError> {
    let kind_raw: String = row.try_get("kind")?;
    let kind = TaskKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task kind `{kind_raw}`")))?;
    let outcome = row
        .try_get::<Option<String>, _>("outcome")?
        .map(|raw| {
            TaskOutcome::parse(&raw)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown task outcome `{raw}`")))
        })
        .transpose()?;

    Ok(SyncTask {
        id: SyncTaskId(row.try_get("id")?),
        kind,
        input_id: row.try_get("input_id")?,
        state: parse_state(row.try_get("state")?)?,
        attempt_count: parse_u32("attempt_count", row.try_get("attempt_count")?)?,
        max_retries: parse_u32("max_retries", row.try_get("max_retries")?)?,
        available_at: parse_timestamp("available_at", row.try_get("available_at")?)?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: parse_optional_timestamp("claimed_at", row.try_get("claimed_at")?)?,
        last_error: row.try_get("last_error")?,
        error_class: row.try_get("error_class")?,
        outcome,
        result_fingerprint: row.try_get("result_fingerprint")?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        correlation_id: row.try_get("correlation_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_state(value: String) -> Result<SyncTaskState, RepositoryError> {
    SyncTaskState::parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task state `{value}`")))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use vinoteka_core::domain::sync::{SyncTaskState, TaskKind, TaskOutcome};
    use vinoteka_core::sync_engine::SyncEngine;

    use super::SqlSyncQueueRepository;
    use crate::repositories::SyncQueueRepository;
    use crate::test_support::parse_ts;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn task_round_trips_through_every_column() {
        let pool = setup_pool().await;
        let repo = SqlSyncQueueRepository::new(pool.clone());
        let engine = SyncEngine::new();
        let now = parse_ts("2026-01-01T08:00:00Z");

        let task = engine.create_task(TaskKind::ProjectVariant, "V-1", "req-1", now);
        let claimed = engine.claim_task(task, "worker-a", now).expect("claim");
        let completed = engine
            .complete_task(claimed, TaskOutcome::Projected, Some("abc".to_string()), now)
            .expect("complete");
        repo.save_task(completed.clone()).await.expect("save");

        let stored = repo.find_task(&completed.id).await.expect("find");
        assert_eq!(stored, Some(completed));

        pool.close().await;
    }

    #[tokio::test]
    async fn second_swap_from_same_snapshot_loses() {
        let pool = setup_pool().await;
        let repo = SqlSyncQueueRepository::new(pool.clone());
        let engine = SyncEngine::new();
        let now = parse_ts("2026-01-01T08:00:00Z");

        let task = engine.create_task(TaskKind::ComputeRelated, "V-1", "req-1", now);
        repo.save_task(task.clone()).await.expect("save");

        let candidate =
            repo.next_claimable(now, now - Duration::seconds(300)).await.expect("next").expect("one");
        let by_a = engine.claim_task(candidate.clone(), "worker-a", now).expect("claim a");
        let by_b = engine.claim_task(candidate.clone(), "worker-b", now).expect("claim b");

        assert!(repo.swap_task(&candidate, by_a).await.expect("swap a"));
        assert!(!repo.swap_task(&candidate, by_b).await.expect("swap b"));

        let stored = repo.find_task(&task.id).await.expect("find").expect("task");
        assert_eq!(stored.claimed_by.as_deref(), Some("worker-a"));
        assert_eq!(repo.next_claimable(now, now - Duration::seconds(300)).await.expect("next"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn next_claimable_respects_backoff_and_stale_claims() {
        let pool = setup_pool().await;
        let repo = SqlSyncQueueRepository::new(pool.clone());
        let engine = SyncEngine::new();
        let start = parse_ts("2026-01-01T08:00:00Z");

        let task = engine.create_task(TaskKind::ProjectVariant, "V-1", "req-1", start);
        let claimed = engine.claim_task(task, "worker-a", start).expect("claim");
        let failed = engine
            .fail_task(claimed, "store down", "store", vinoteka_core::RetryPolicy::Retry, start)
            .expect("fail");
        repo.save_task(failed.clone()).await.expect("save");

        let stale_before = start - Duration::seconds(300);
        assert_eq!(repo.next_claimable(start, stale_before).await.expect("next"), None);

        let later = failed.available_at;
        let due = repo
            .next_claimable(later, later - Duration::seconds(300))
            .await
            .expect("next")
            .expect("due after backoff");
        let reclaimed = engine.claim_task(due.clone(), "worker-b", later).expect("claim");
        assert!(repo.swap_task(&due, reclaimed).await.expect("swap"));

        let much_later = later + Duration::seconds(301);
        let stale = repo
            .next_claimable(much_later, much_later - Duration::seconds(300))
            .await
            .expect("next")
            .expect("stale claim is claimable");
        assert_eq!(stale.state, SyncTaskState::Running);

        pool.close().await;
    }

    #[tokio::test]
    async fn counts_list_and_purge_by_state() {
        let pool = setup_pool().await;
        let repo = SqlSyncQueueRepository::new(pool.clone());
        let engine = SyncEngine::new();
        let now = parse_ts("2026-01-01T08:00:00Z");

        for input in ["V-1", "V-2"] {
            repo.save_task(engine.create_task(TaskKind::ProjectVariant, input, "req", now))
                .await
                .expect("save queued");
        }
        let task = engine.create_task(TaskKind::ComputeRelated, "V-1", "req", now);
        let claimed = engine.claim_task(task, "worker", now).expect("claim");
        let done = engine.complete_task(claimed, TaskOutcome::Ranked, None, now).expect("done");
        repo.save_task(done).await.expect("save completed");

        let counts = repo.count_by_state().await.expect("counts");
        assert_eq!(counts.len(), SyncTaskState::ALL.len());
        assert!(counts.contains(&(SyncTaskState::Queued, 2)));
        assert!(counts.contains(&(SyncTaskState::Completed, 1)));
        assert!(counts.contains(&(SyncTaskState::FailedTerminal, 0)));

        let queued = repo
            .list_tasks(Some(TaskKind::ProjectVariant), Some(SyncTaskState::Queued), 10)
            .await
            .expect("list");
        assert_eq!(queued.len(), 2);
        assert_eq!(repo.list_tasks(None, None, 1).await.expect("list").len(), 1);

        let purged = repo
            .purge(None, &[SyncTaskState::Completed, SyncTaskState::FailedTerminal])
            .await
            .expect("purge");
        assert_eq!(purged, 1);
        assert_eq!(repo.purge(Some(TaskKind::ComputeRelated), &[]).await.expect("purge"), 0);
        assert_eq!(repo.list_tasks(None, None, 10).await.expect("list").len(), 2);

        pool.close().await;
    }
}
