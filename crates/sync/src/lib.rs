//! Async pipeline services: projection, ranking, dispatch and the queue worker.

pub mod dispatcher;
pub mod jobs;
pub mod ops;
pub mod projector;
pub mod ranker;
pub mod services;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::{enqueue_all, DispatchError, EnqueueSummary, QueueDispatcher, WorkDispatcher};
pub use jobs::{FollowUp, JobResult, PipelineJobs};
pub use ops::{drift_report, purge_tasks, DriftReport, DEFAULT_PURGE_STATES};
pub use projector::{FlatProjector, ProjectionWritten};
pub use ranker::{RankingReport, RelatedRanker};
pub use services::SyncServices;
pub use worker::{RunSummary, SyncWorker, TaskRun, WorkerError};
