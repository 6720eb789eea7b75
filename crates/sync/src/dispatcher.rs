//! Work dispatch: the only way pipeline code asks for more work.
//!
//! Handlers never call each other directly. They name the follow-up task and
//! a [`WorkDispatcher`] turns it into a durable queue entry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::info;

use vinoteka_core::domain::sync::{SyncTaskId, TaskKind};
use vinoteka_core::sync_engine::SyncEngine;
use vinoteka_core::domain::catalog::VariantId;
use vinoteka_db::repositories::{
    FlatVariantRepository, RepositoryError, SourceCatalogRepository, SyncQueueRepository,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("input id must not be blank")]
    BlankInput,
    #[error("queue store failure: {0}")]
    Store(#[from] RepositoryError),
}

#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    /// Fire-and-forget: returns once the task is durable, not once it ran.
    async fn enqueue(
        &self,
        kind: TaskKind,
        input_id: &str,
        correlation_id: &str,
    ) -> Result<SyncTaskId, DispatchError>;
}

/// Dispatcher backed by the sync task table.
pub struct QueueDispatcher {
    queue: Arc<dyn SyncQueueRepository>,
    engine: SyncEngine,
}

impl QueueDispatcher {
    pub fn new(queue: Arc<dyn SyncQueueRepository>, engine: SyncEngine) -> Self {
        Self { queue, engine }
    }
}

#[async_trait]
impl WorkDispatcher for QueueDispatcher {
    async fn enqueue(
        &self,
        kind: TaskKind,
        input_id: &str,
        correlation_id: &str,
    ) -> Result<SyncTaskId, DispatchError> {
        let input_id = input_id.trim();
        if input_id.is_empty() {
            return Err(DispatchError::BlankInput);
        }

        let task = self.engine.create_task(kind, input_id, correlation_id, Utc::now());
        let task_id = task.id.clone();
        self.queue.save_task(task).await?;

        info!(
            event_name = "sync.enqueue.accepted",
            correlation_id = %correlation_id,
            task_id = %task_id.0,
            task_kind = kind.as_str(),
            input_id = %input_id,
            "sync task enqueued"
        );

        Ok(task_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnqueueSummary {
    pub enqueued: usize,
    pub task_ids: Vec<SyncTaskId>,
}

/// Enqueues one `kind` task per eligible variant. Nothing is projected here;
/// the queue absorbs the burst.
///
/// Projection sweeps also cover every flat record still served as published,
/// so a variant unpublished at the source gets retired even when the edit
/// that should have triggered it was missed.
pub async fn enqueue_all(
    source: &dyn SourceCatalogRepository,
    flat: &dyn FlatVariantRepository,
    dispatcher: &dyn WorkDispatcher,
    kind: TaskKind,
    correlation_id: &str,
) -> Result<EnqueueSummary, DispatchError> {
    let variant_ids = sweep_ids(source, flat, kind).await?;

    let mut task_ids = Vec::with_capacity(variant_ids.len());
    for variant_id in &variant_ids {
        task_ids.push(dispatcher.enqueue(kind, &variant_id.0, correlation_id).await?);
    }

    info!(
        event_name = "sync.enqueue_all.completed",
        correlation_id = %correlation_id,
        task_kind = kind.as_str(),
        enqueued = task_ids.len(),
        "bulk enqueue finished"
    );

    Ok(EnqueueSummary { enqueued: task_ids.len(), task_ids })
}

async fn sweep_ids(
    source: &dyn SourceCatalogRepository,
    flat: &dyn FlatVariantRepository,
    kind: TaskKind,
) -> Result<Vec<VariantId>, RepositoryError> {
    let mut ids = source.list_published_variant_ids().await?;
    if kind == TaskKind::ProjectVariant {
        ids.extend(flat.list_published_source_ids().await?);
        ids.sort();
        ids.dedup();
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vinoteka_core::domain::catalog::{Publication, VariantId};
    use vinoteka_core::domain::sync::{SyncTaskState, TaskKind};
    use vinoteka_core::media::{CdnMediaResolver, ImageSize};
    use vinoteka_core::sync_engine::SyncEngine;
    use vinoteka_db::repositories::{
        InMemoryFlatVariantRepository, InMemorySourceCatalogRepository,
        InMemorySyncQueueRepository, SyncQueueRepository,
    };

    use super::{enqueue_all, DispatchError, QueueDispatcher, WorkDispatcher};
    use crate::projector::FlatProjector;
    use crate::test_support::{aggregate, parse_ts};

    #[tokio::test]
    async fn enqueue_persists_a_queued_task() {
        let queue = Arc::new(InMemorySyncQueueRepository::default());
        let dispatcher = QueueDispatcher::new(queue.clone(), SyncEngine::new());

        let task_id = dispatcher
            .enqueue(TaskKind::ComputeRelated, " V-1 ", "req-7")
            .await
            .expect("enqueue");

        let task = queue.find_task(&task_id).await.expect("find").expect("stored");
        assert_eq!(task.state, SyncTaskState::Queued);
        assert_eq!(task.input_id, "V-1");
        assert_eq!(task.correlation_id, "req-7");
        assert_eq!(task.max_retries, 2);
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let queue = Arc::new(InMemorySyncQueueRepository::default());
        let dispatcher = QueueDispatcher::new(queue.clone(), SyncEngine::new());

        let result = dispatcher.enqueue(TaskKind::ProjectVariant, "  ", "req").await;
        assert!(matches!(result, Err(DispatchError::BlankInput)));
        assert!(queue.list_tasks(None, None, 10).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn projection_sweep_reaches_flat_records_whose_variant_went_draft() {
        let source = Arc::new(InMemorySourceCatalogRepository::default());
        let flat = Arc::new(InMemoryFlatVariantRepository::default());
        let queue = Arc::new(InMemorySyncQueueRepository::default());
        let dispatcher = QueueDispatcher::new(queue.clone(), SyncEngine::new());
        source.insert(aggregate("A", "Movia Rebula", "movia", "brda", "25", &[])).await;
        source.insert(aggregate("B", "Movia Pinot", "movia", "brda", "60", &[])).await;

        let projector = FlatProjector::new(
            source.clone(),
            flat.clone(),
            Arc::new(CdnMediaResolver::new("https://cdn.test", ImageSize::Card)),
        );
        let now = parse_ts("2026-01-01T00:00:00Z");
        for id in ["A", "B"] {
            projector.project_variant(&VariantId(id.to_string()), "req", now).await.expect("project");
        }

        let mut draft = aggregate("B", "Movia Pinot", "movia", "brda", "60", &[]);
        draft.variant.publication = Publication::draft();
        source.insert(draft).await;

        let projections =
            enqueue_all(source.as_ref(), flat.as_ref(), &dispatcher, TaskKind::ProjectVariant, "sweep")
                .await
                .expect("sweep");
        assert_eq!(projections.enqueued, 2);
        let inputs: Vec<String> = queue
            .list_tasks(None, None, 10)
            .await
            .expect("list")
            .into_iter()
            .map(|task| task.input_id)
            .collect();
        assert!(inputs.contains(&"B".to_string()));

        let rankings =
            enqueue_all(source.as_ref(), flat.as_ref(), &dispatcher, TaskKind::ComputeRelated, "sweep")
                .await
                .expect("ranking sweep");
        assert_eq!(rankings.enqueued, 1);
    }
}
