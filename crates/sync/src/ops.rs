//! Operator primitives: drift between source and projections, and queue purges.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use vinoteka_core::domain::catalog::VariantId;
use vinoteka_core::domain::sync::{SyncTaskState, TaskKind};
use vinoteka_db::repositories::{
    FlatVariantRepository, RelatedVariantRepository, RepositoryError, SourceCatalogRepository,
    SyncQueueRepository,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub source_published_variants: u64,
    pub flat_records: u64,
    pub flat_published: u64,
    /// Published source variants that have no flat record at all.
    pub missing_projection: Vec<VariantId>,
    /// Flat records still served as published although their source variant
    /// is no longer published.
    pub stale_published: Vec<VariantId>,
    pub related_records: u64,
    /// Related records computed under another computation version.
    pub outdated_related: u64,
    pub tasks_by_state: Vec<(SyncTaskState, u64)>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_projection.is_empty()
            && self.stale_published.is_empty()
            && self.outdated_related == 0
    }
}

pub async fn drift_report(
    source: &dyn SourceCatalogRepository,
    flat: &dyn FlatVariantRepository,
    related: &dyn RelatedVariantRepository,
    queue: &dyn SyncQueueRepository,
    computation_version: u32,
) -> Result<DriftReport, RepositoryError> {
    let published = source.list_published_variant_ids().await?;
    let projected: HashSet<VariantId> = flat.list_source_ids().await?.into_iter().collect();
    let missing_projection: Vec<VariantId> =
        published.iter().filter(|id| !projected.contains(*id)).cloned().collect();

    let source_published: HashSet<&VariantId> = published.iter().collect();
    let stale_published: Vec<VariantId> = flat
        .list_published_source_ids()
        .await?
        .into_iter()
        .filter(|id| !source_published.contains(id))
        .collect();
    let counts = flat.counts().await?;

    let report = DriftReport {
        source_published_variants: published.len() as u64,
        flat_records: counts.total,
        flat_published: counts.published,
        missing_projection,
        stale_published,
        related_records: related.count().await?,
        outdated_related: related.count_outdated(computation_version).await?,
        tasks_by_state: queue.count_by_state().await?,
    };

    info!(
        event_name = "sync.drift.reported",
        source_published = report.source_published_variants,
        flat_published = report.flat_published,
        missing_projection = report.missing_projection.len(),
        stale_published = report.stale_published.len(),
        outdated_related = report.outdated_related,
        "drift report computed"
    );
    Ok(report)
}

/// States a purge removes when the operator names none.
pub const DEFAULT_PURGE_STATES: [SyncTaskState; 2] =
    [SyncTaskState::FailedTerminal, SyncTaskState::RetryableFailed];

pub async fn purge_tasks(
    queue: &dyn SyncQueueRepository,
    kind: Option<TaskKind>,
    states: &[SyncTaskState],
) -> Result<u64, RepositoryError> {
    let states = if states.is_empty() { &DEFAULT_PURGE_STATES[..] } else { states };
    let removed = queue.purge(kind, states).await?;
    info!(
        event_name = "sync.queue.purged",
        task_kind = kind.as_ref().map(TaskKind::as_str).unwrap_or("all"),
        states = ?states.iter().map(|state| state.as_str()).collect::<Vec<_>>(),
        removed,
        "sync tasks purged"
    );
    Ok(removed)
}
