use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use vinoteka_core::domain::catalog::{ProductId, SourceAggregate, VariantId};
use vinoteka_core::domain::flat::FlatVariant;
use vinoteka_core::domain::related::RelatedVariant;
use vinoteka_core::domain::sync::{SyncTask, SyncTaskId, SyncTaskState, TaskKind};
use vinoteka_core::ranking::{Candidate, CuratedLink, FacetRequest};

pub mod flat_variant;
pub mod memory;
pub mod related_variant;
pub mod source_catalog;
pub mod sync_queue;

pub use flat_variant::SqlFlatVariantRepository;
pub use memory::{
    InMemoryFlatVariantRepository, InMemoryRelatedVariantRepository,
    InMemorySourceCatalogRepository, InMemorySyncQueueRepository,
};
pub use related_variant::SqlRelatedVariantRepository;
pub use source_catalog::SqlSourceCatalogRepository;
pub use sync_queue::SqlSyncQueueRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the normalized catalog. The pipeline never writes here.
#[async_trait]
pub trait SourceCatalogRepository: Send + Sync {
    /// The variant with its ancestors and many-valued links, both locales.
    /// `None` when the variant id itself is unknown.
    async fn load_aggregate(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<SourceAggregate>, RepositoryError>;

    /// Every variant whose own status is published, ordered by id.
    async fn list_published_variant_ids(&self) -> Result<Vec<VariantId>, RepositoryError>;

    async fn list_variant_ids_for_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<VariantId>, RepositoryError>;

    /// Editorial links for a subject in curation order.
    async fn list_curated_links(
        &self,
        subject: &VariantId,
    ) -> Result<Vec<CuratedLink>, RepositoryError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlatVariantCounts {
    pub total: u64,
    pub published: u64,
}

#[async_trait]
pub trait FlatVariantRepository: Send + Sync {
    async fn find_by_source_id(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<FlatVariant>, RepositoryError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<FlatVariant>, RepositoryError>;

    /// Replaces the whole record for its source variant.
    async fn save(&self, record: FlatVariant) -> Result<(), RepositoryError>;

    /// Hides an existing record without deleting it. Returns `false` when no
    /// record exists for the variant.
    async fn retire(
        &self,
        variant_id: &VariantId,
        synced_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Published records matching one facet, newest source first, at most
    /// `request.limit` of them.
    async fn find_candidates(
        &self,
        request: &FacetRequest,
    ) -> Result<Vec<Candidate>, RepositoryError>;

    /// Published records among `ids`; unknown or hidden ids are left out.
    async fn find_published_candidates(
        &self,
        ids: &[VariantId],
    ) -> Result<Vec<Candidate>, RepositoryError>;

    async fn counts(&self) -> Result<FlatVariantCounts, RepositoryError>;

    async fn list_source_ids(&self) -> Result<Vec<VariantId>, RepositoryError>;

    /// Source ids of records the read API currently serves.
    async fn list_published_source_ids(&self) -> Result<Vec<VariantId>, RepositoryError>;
}

#[async_trait]
pub trait RelatedVariantRepository: Send + Sync {
    async fn find(&self, variant_id: &VariantId)
        -> Result<Option<RelatedVariant>, RepositoryError>;

    /// Replaces the whole recommendation set for its subject.
    async fn save(&self, record: RelatedVariant) -> Result<(), RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;

    /// Records computed under a different computation version.
    async fn count_outdated(&self, computation_version: u32) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    async fn save_task(&self, task: SyncTask) -> Result<(), RepositoryError>;

    async fn find_task(&self, id: &SyncTaskId) -> Result<Option<SyncTask>, RepositoryError>;

    /// Oldest task a worker may claim: queued or retryable and due at `now`,
    /// or running with a claim older than `stale_before`.
    async fn next_claimable(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<SyncTask>, RepositoryError>;

    /// Writes `next` only if the stored task still matches `previous`.
    /// Returns `false` when another worker changed it first.
    async fn swap_task(&self, previous: &SyncTask, next: SyncTask)
        -> Result<bool, RepositoryError>;

    async fn list_tasks(
        &self,
        kind: Option<TaskKind>,
        state: Option<SyncTaskState>,
        limit: usize,
    ) -> Result<Vec<SyncTask>, RepositoryError>;

    /// One entry per state, zero counts included.
    async fn count_by_state(&self) -> Result<Vec<(SyncTaskState, u64)>, RepositoryError>;

    async fn purge(
        &self,
        kind: Option<TaskKind>,
        states: &[SyncTaskState],
    ) -> Result<u64, RepositoryError>;
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_count(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid count in `{column}`: {value}"))
    })
}
