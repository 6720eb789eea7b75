use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use vinoteka_core::domain::sync::{SyncTask, SyncTaskState, TaskOutcome};
use vinoteka_core::sync_engine::{RetryPolicy, SyncEngine, SyncError};
use vinoteka_db::repositories::{RepositoryError, SyncQueueRepository};

use crate::dispatcher::{DispatchError, WorkDispatcher};
use crate::jobs::{FollowUp, JobResult, PipelineJobs};

/// Lost claim races tolerated per tick before giving up until the next poll.
const MAX_CLAIM_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue store failure: {0}")]
    Store(#[from] RepositoryError),
    #[error("invalid task transition: {0}")]
    Transition(#[from] SyncError),
}

/// What one processed task ended as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRun {
    pub task: SyncTask,
    pub follow_ups_enqueued: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub completed: usize,
    pub retry_scheduled: usize,
    pub failed_terminal: usize,
    pub follow_ups_enqueued: usize,
}

impl RunSummary {
    fn record(&mut self, run: &TaskRun) {
        self.processed += 1;
        self.follow_ups_enqueued += run.follow_ups_enqueued;
        match run.task.state {
            SyncTaskState::Completed => self.completed += 1,
            SyncTaskState::RetryableFailed => self.retry_scheduled += 1,
            SyncTaskState::FailedTerminal => self.failed_terminal += 1,
            SyncTaskState::Queued | SyncTaskState::Running => {}
        }
    }
}

/// Claims tasks from the queue, runs them and records the result.
pub struct SyncWorker {
    worker_id: String,
    queue: Arc<dyn SyncQueueRepository>,
    dispatcher: Arc<dyn WorkDispatcher>,
    jobs: Arc<PipelineJobs>,
    engine: SyncEngine,
    poll_interval: Duration,
}

impl SyncWorker {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<dyn SyncQueueRepository>,
        dispatcher: Arc<dyn WorkDispatcher>,
        jobs: Arc<PipelineJobs>,
        engine: SyncEngine,
        poll_interval: Duration,
    ) -> Self {
        Self { worker_id: worker_id.into(), queue, dispatcher, jobs, engine, poll_interval }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claims and runs at most one task as of `now`. `None` when nothing is
    /// claimable.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Option<TaskRun>, WorkerError> {
        let Some(claimed) = self.claim_next(now).await? else {
            return Ok(None);
        };
        self.process(claimed, now).await.map(Some)
    }

    /// Drains the queue as of the wall clock, stopping after `max_tasks`.
    pub async fn run_once(&self, max_tasks: usize) -> Result<RunSummary, WorkerError> {
        let mut summary = RunSummary::default();
        while summary.processed < max_tasks {
            match self.tick(Utc::now()).await? {
                Some(run) => summary.record(&run),
                None => break,
            }
        }
        Ok(summary)
    }

    /// Polls until `shutdown` flips to `true`. Errors are logged and the loop
    /// keeps going; the queue keeps the task for a later attempt.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            event_name = "sync.worker.started",
            worker_id = %self.worker_id,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "sync worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.tick(Utc::now()).await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(error) => {
                    warn!(
                        event_name = "sync.worker.tick_failed",
                        worker_id = %self.worker_id,
                        error = %error,
                        "sync worker tick failed"
                    );
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(event_name = "sync.worker.stopped", worker_id = %self.worker_id, "sync worker stopped");
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<SyncTask>, WorkerError> {
        let stale_before = self.engine.stale_before(now);

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let Some(candidate) = self.queue.next_claimable(now, stale_before).await? else {
                return Ok(None);
            };
            let claimed =
                match self.engine.claim_task(candidate.clone(), self.worker_id.as_str(), now) {
                    Ok(claimed) => claimed,
                    Err(SyncError::ClaimBudgetExhausted(_)) => {
                        self.expire(&candidate, now).await?;
                        continue;
                    }
                    Err(error) => return Err(error.into()),
                };
            if self.queue.swap_task(&candidate, claimed.clone()).await? {
                debug!(
                    event_name = "sync.task.claimed",
                    correlation_id = %claimed.correlation_id,
                    task_id = %claimed.id.0,
                    task_kind = claimed.kind.as_str(),
                    worker_id = %self.worker_id,
                    attempt = claimed.attempt_count,
                    "sync task claimed"
                );
                return Ok(Some(claimed));
            }
        }

        Ok(None)
    }

    async fn expire(&self, candidate: &SyncTask, now: DateTime<Utc>) -> Result<(), WorkerError> {
        let expired = self.engine.expire_claim(candidate.clone(), now)?;
        if self.queue.swap_task(candidate, expired.clone()).await? {
            error!(
                event_name = "sync.task.claim_expired",
                correlation_id = %expired.correlation_id,
                task_id = %expired.id.0,
                task_kind = expired.kind.as_str(),
                input_id = %expired.input_id,
                attempt = expired.attempt_count,
                error = expired.last_error.as_deref().unwrap_or(""),
                "sync task claim expired with no retries left"
            );
        }
        Ok(())
    }

    async fn process(&self, claimed: SyncTask, now: DateTime<Utc>) -> Result<TaskRun, WorkerError> {
        let result = self.jobs.run(&claimed, now).await;

        let (next, follow_ups_enqueued) = match result {
            JobResult::Succeeded { outcome, fingerprint, follow_ups } => {
                let (enqueued, failures) = self.enqueue_follow_ups(&claimed, &follow_ups).await;
                let next = match failures.first() {
                    None => self.engine.complete_task(claimed.clone(), outcome, fingerprint, now)?,
                    Some(first) => self.engine.fail_task(
                        claimed.clone(),
                        format!(
                            "{} of {} follow-ups not enqueued: {first}",
                            failures.len(),
                            follow_ups.len()
                        ),
                        "dispatch",
                        RetryPolicy::Retry,
                        now,
                    )?,
                };
                (next, enqueued)
            }
            JobResult::Failed { policy, message, error_class } => {
                let next = self.engine.fail_task(
                    claimed.clone(),
                    message,
                    error_class,
                    policy,
                    now,
                )?;
                (next, 0)
            }
        };

        if !self.queue.swap_task(&claimed, next.clone()).await? {
            warn!(
                event_name = "sync.task.claim_lost",
                correlation_id = %claimed.correlation_id,
                task_id = %claimed.id.0,
                worker_id = %self.worker_id,
                "task was reclaimed before its result was recorded"
            );
            return Ok(TaskRun { task: claimed, follow_ups_enqueued: 0 });
        }

        log_result(&next);

        Ok(TaskRun { task: next, follow_ups_enqueued })
    }

    /// Enqueues every follow-up before the task is marked done, carrying on
    /// past individual failures. Any failure sends the task back for a retry;
    /// the duplicates a rerun enqueues overwrite the same rows.
    async fn enqueue_follow_ups(
        &self,
        claimed: &SyncTask,
        follow_ups: &[FollowUp],
    ) -> (usize, Vec<DispatchError>) {
        let mut enqueued = 0;
        let mut failures = Vec::new();

        for follow_up in follow_ups {
            match self
                .dispatcher
                .enqueue(follow_up.kind, &follow_up.input_id, &claimed.correlation_id)
                .await
            {
                Ok(_) => enqueued += 1,
                Err(error) => {
                    warn!(
                        event_name = "sync.task.follow_up_failed",
                        correlation_id = %claimed.correlation_id,
                        task_id = %claimed.id.0,
                        follow_up_kind = follow_up.kind.as_str(),
                        input_id = %follow_up.input_id,
                        error = %error,
                        "follow-up could not be enqueued"
                    );
                    failures.push(error);
                }
            }
        }

        (enqueued, failures)
    }
}

fn log_result(task: &SyncTask) {
    match task.state {
        SyncTaskState::Completed => info!(
            event_name = "sync.task.completed",
            correlation_id = %task.correlation_id,
            task_id = %task.id.0,
            task_kind = task.kind.as_str(),
            input_id = %task.input_id,
            outcome = task.outcome.map(|outcome: TaskOutcome| outcome.as_str()).unwrap_or("none"),
            "sync task completed"
        ),
        SyncTaskState::RetryableFailed => warn!(
            event_name = "sync.task.retry_scheduled",
            correlation_id = %task.correlation_id,
            task_id = %task.id.0,
            task_kind = task.kind.as_str(),
            input_id = %task.input_id,
            attempt = task.attempt_count,
            max_retries = task.max_retries,
            available_at = %task.available_at,
            error_class = task.error_class.as_deref().unwrap_or("unknown"),
            error = task.last_error.as_deref().unwrap_or(""),
            "sync task failed; retry scheduled"
        ),
        SyncTaskState::FailedTerminal if is_missing_input(task) => warn!(
            event_name = "sync.task.failed_terminal",
            correlation_id = %task.correlation_id,
            task_id = %task.id.0,
            task_kind = task.kind.as_str(),
            input_id = %task.input_id,
            error_class = task.error_class.as_deref().unwrap_or("unknown"),
            "sync task input does not exist"
        ),
        SyncTaskState::FailedTerminal => error!(
            event_name = "sync.task.failed_terminal",
            correlation_id = %task.correlation_id,
            task_id = %task.id.0,
            task_kind = task.kind.as_str(),
            input_id = %task.input_id,
            attempt = task.attempt_count,
            error_class = task.error_class.as_deref().unwrap_or("unknown"),
            error = task.last_error.as_deref().unwrap_or(""),
            "sync task failed permanently"
        ),
        SyncTaskState::Queued | SyncTaskState::Running => {}
    }
}

fn is_missing_input(task: &SyncTask) -> bool {
    matches!(task.error_class.as_deref(), Some("not_found" | "subject_not_found"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use vinoteka_core::domain::catalog::{ProductId, VariantId};
    use vinoteka_core::domain::sync::{SyncTaskId, SyncTaskState, TaskKind, TaskOutcome};
    use vinoteka_core::media::{CdnMediaResolver, ImageSize};
    use vinoteka_core::ranking::RankingSettings;
    use vinoteka_core::sync_engine::{SyncEngine, CLAIM_EXPIRED_CLASS};
    use vinoteka_db::repositories::{
        FlatVariantRepository, InMemoryFlatVariantRepository, InMemoryRelatedVariantRepository,
        InMemorySourceCatalogRepository, InMemorySyncQueueRepository, RelatedVariantRepository,
        RepositoryError, SyncQueueRepository,
    };

    use super::SyncWorker;
    use crate::dispatcher::{DispatchError, QueueDispatcher, WorkDispatcher};
    use crate::jobs::PipelineJobs;
    use crate::projector::FlatProjector;
    use crate::ranker::RelatedRanker;
    use crate::test_support::aggregate;

    struct Harness {
        source: Arc<InMemorySourceCatalogRepository>,
        flat: Arc<InMemoryFlatVariantRepository>,
        related: Arc<InMemoryRelatedVariantRepository>,
        queue: Arc<InMemorySyncQueueRepository>,
        dispatcher: Arc<QueueDispatcher>,
        worker: SyncWorker,
    }

    /// Refuses the first enqueue for one input id, then behaves like the queue.
    struct FlakyDispatcher {
        inner: Arc<QueueDispatcher>,
        refused_input: String,
        refusals_left: AtomicU32,
    }

    #[async_trait]
    impl WorkDispatcher for FlakyDispatcher {
        async fn enqueue(
            &self,
            kind: TaskKind,
            input_id: &str,
            correlation_id: &str,
        ) -> Result<SyncTaskId, DispatchError> {
            if input_id == self.refused_input
                && self
                    .refusals_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                    .is_ok()
            {
                return Err(DispatchError::Store(RepositoryError::Unavailable(
                    "queue is read-only".to_string(),
                )));
            }
            self.inner.enqueue(kind, input_id, correlation_id).await
        }
    }

    fn harness() -> Harness {
        harness_with(|dispatcher| dispatcher as Arc<dyn WorkDispatcher>)
    }

    fn harness_with(
        wrap: impl FnOnce(Arc<QueueDispatcher>) -> Arc<dyn WorkDispatcher>,
    ) -> Harness {
        let source = Arc::new(InMemorySourceCatalogRepository::default());
        let flat = Arc::new(InMemoryFlatVariantRepository::default());
        let related = Arc::new(InMemoryRelatedVariantRepository::default());
        let queue = Arc::new(InMemorySyncQueueRepository::default());
        let engine = SyncEngine::new();
        let dispatcher = Arc::new(QueueDispatcher::new(queue.clone(), engine.clone()));
        let projector = Arc::new(FlatProjector::new(
            source.clone(),
            flat.clone(),
            Arc::new(CdnMediaResolver::new("https://cdn.test", ImageSize::Card)),
        ));
        let ranker = Arc::new(RelatedRanker::new(
            source.clone(),
            flat.clone(),
            related.clone(),
            RankingSettings::default(),
            20,
        ));
        let jobs = Arc::new(PipelineJobs::new(source.clone(), projector, ranker));
        let worker = SyncWorker::new(
            "worker-test",
            queue.clone(),
            wrap(dispatcher.clone()),
            jobs,
            engine,
            Duration::from_millis(10),
        );
        Harness { source, flat, related, queue, dispatcher, worker }
    }

    #[tokio::test]
    async fn projection_task_completes_and_enqueues_ranking() {
        let harness = harness();
        harness.source.insert(aggregate("X", "Movia Rebula", "movia", "brda", "25", &[])).await;
        let task_id = harness
            .dispatcher
            .enqueue(TaskKind::ProjectVariant, "X", "req-1")
            .await
            .expect("enqueue");

        let summary = harness.worker.run_once(10).await.expect("run");
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.follow_ups_enqueued, 1);

        let task = harness.queue.find_task(&task_id).await.expect("find").expect("task");
        assert_eq!(task.state, SyncTaskState::Completed);
        assert_eq!(task.outcome, Some(TaskOutcome::Projected));
        assert!(task.result_fingerprint.is_some());

        let id = VariantId("X".to_string());
        assert!(harness.flat.find_by_source_id(&id).await.expect("flat").is_some());
        assert!(harness.related.find(&id).await.expect("related").is_some());

        let ranking = harness
            .queue
            .list_tasks(Some(TaskKind::ComputeRelated), None, 10)
            .await
            .expect("list");
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].correlation_id, "req-1");
    }

    #[tokio::test]
    async fn transient_failures_retry_with_backoff_then_succeed() {
        let harness = harness();
        harness.source.insert(aggregate("X", "Movia Rebula", "movia", "brda", "25", &[])).await;
        harness.source.fail_next_loads(1);
        let task_id = harness
            .dispatcher
            .enqueue(TaskKind::ProjectVariant, "X", "req")
            .await
            .expect("enqueue");
        let t0 = chrono::Utc::now() + ChronoDuration::hours(1);

        let first = harness.worker.tick(t0).await.expect("tick").expect("ran");
        assert_eq!(first.task.state, SyncTaskState::RetryableFailed);
        assert_eq!(first.task.attempt_count, 1);
        assert_eq!(first.task.available_at, t0 + ChronoDuration::seconds(5));

        assert!(harness.worker.tick(t0).await.expect("tick").is_none());

        let second = harness
            .worker
            .tick(t0 + ChronoDuration::seconds(5))
            .await
            .expect("tick")
            .expect("ran");
        assert_eq!(second.task.id, task_id);
        assert_eq!(second.task.state, SyncTaskState::Completed);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_is_terminal() {
        let harness = harness();
        harness.source.insert(aggregate("X", "Movia Rebula", "movia", "brda", "25", &[])).await;
        harness.source.fail_next_loads(10);
        harness.dispatcher.enqueue(TaskKind::ProjectVariant, "X", "req").await.expect("enqueue");
        let mut now = chrono::Utc::now() + ChronoDuration::hours(1);

        let mut states = Vec::new();
        for _ in 0..3 {
            let run = harness.worker.tick(now).await.expect("tick").expect("ran");
            states.push(run.task.state);
            now = now + ChronoDuration::minutes(10);
        }

        assert_eq!(
            states,
            vec![
                SyncTaskState::RetryableFailed,
                SyncTaskState::RetryableFailed,
                SyncTaskState::FailedTerminal,
            ]
        );
        assert!(harness.worker.tick(now).await.expect("tick").is_none());
    }

    #[tokio::test]
    async fn refused_follow_up_keeps_the_rest_of_the_fan_out_and_retries() {
        let harness = harness_with(|inner| {
            Arc::new(FlakyDispatcher {
                inner,
                refused_input: "B".to_string(),
                refusals_left: AtomicU32::new(1),
            }) as Arc<dyn WorkDispatcher>
        });
        for (id, title) in [("A", "Movia Rebula"), ("B", "Movia Pinot"), ("C", "Movia Lunar")] {
            let mut wine = aggregate(id, title, "movia", "brda", "25", &[]);
            wine.variant.product_id = ProductId("P-MOVIA".to_string());
            harness.source.insert(wine).await;
        }
        let task_id = harness
            .dispatcher
            .enqueue(TaskKind::ProjectCollection, "P-MOVIA", "req-fan")
            .await
            .expect("enqueue");
        let now = chrono::Utc::now() + ChronoDuration::hours(1);

        let first = harness.worker.tick(now).await.expect("tick").expect("ran");
        assert_eq!(first.task.id, task_id);
        assert_eq!(first.task.state, SyncTaskState::RetryableFailed);
        assert_eq!(first.task.error_class.as_deref(), Some("dispatch"));
        assert_eq!(first.follow_ups_enqueued, 2);

        let queued = harness
            .queue
            .list_tasks(Some(TaskKind::ProjectVariant), None, 10)
            .await
            .expect("list");
        let mut inputs: Vec<&str> = queued.iter().map(|task| task.input_id.as_str()).collect();
        inputs.sort();
        assert_eq!(inputs, vec!["A", "C"]);

        let retry_at = first.task.available_at;
        let mut collection = None;
        while let Some(run) = harness.worker.tick(retry_at).await.expect("tick") {
            if run.task.id == task_id {
                collection = Some(run);
            }
        }
        let collection = collection.expect("collection task retried");
        assert_eq!(collection.task.state, SyncTaskState::Completed);
        assert_eq!(collection.follow_ups_enqueued, 3);
        assert!(harness
            .flat
            .find_by_source_id(&VariantId("B".to_string()))
            .await
            .expect("flat")
            .is_some());
    }

    #[tokio::test]
    async fn stale_claim_without_retries_left_is_expired() {
        let harness = harness();
        let task_id = harness
            .dispatcher
            .enqueue(TaskKind::ProjectVariant, "X", "req-stale")
            .await
            .expect("enqueue");
        let engine = SyncEngine::new();
        let queued = harness.queue.find_task(&task_id).await.expect("find").expect("task");
        let claimed_at = chrono::Utc::now() + ChronoDuration::hours(1);
        let mut abandoned =
            engine.claim_task(queued.clone(), "worker-gone", claimed_at).expect("claim");
        abandoned.attempt_count = abandoned.max_retries;
        assert!(harness.queue.swap_task(&queued, abandoned).await.expect("swap"));

        let later = claimed_at + ChronoDuration::minutes(10);
        assert!(harness.worker.tick(later).await.expect("tick").is_none());

        let expired = harness.queue.find_task(&task_id).await.expect("find").expect("task");
        assert_eq!(expired.state, SyncTaskState::FailedTerminal);
        assert_eq!(expired.error_class.as_deref(), Some(CLAIM_EXPIRED_CLASS));
        assert!(expired.claimed_by.is_none());
    }

    #[tokio::test]
    async fn missing_variant_fails_without_retry() {
        let harness = harness();
        harness.dispatcher.enqueue(TaskKind::ProjectVariant, "ghost", "req").await.expect("enqueue");

        let summary = harness.worker.run_once(5).await.expect("run");
        assert_eq!(summary.failed_terminal, 1);
        assert_eq!(summary.retry_scheduled, 0);
    }
}
