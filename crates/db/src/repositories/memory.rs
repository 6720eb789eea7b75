use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use vinoteka_core::domain::catalog::{ProductId, SourceAggregate, VariantId};
use vinoteka_core::domain::flat::FlatVariant;
use vinoteka_core::domain::related::{Facet, RelatedVariant};
use vinoteka_core::domain::sync::{SyncTask, SyncTaskId, SyncTaskState, TaskKind};
use vinoteka_core::ranking::{Candidate, CuratedLink, FacetQuery, FacetRequest};

use super::{
    FlatVariantCounts, FlatVariantRepository, RelatedVariantRepository, RepositoryError,
    SourceCatalogRepository, SyncQueueRepository,
};

/// Takes one unit from a failure budget. `true` means the call should fail.
fn take_failure(budget: &AtomicU32) -> bool {
    budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1)).is_ok()
}

#[derive(Default)]
pub struct InMemorySourceCatalogRepository {
    aggregates: RwLock<HashMap<String, SourceAggregate>>,
    curated: RwLock<HashMap<String, Vec<CuratedLink>>>,
    load_failures: AtomicU32,
}

impl InMemorySourceCatalogRepository {
    pub async fn insert(&self, aggregate: SourceAggregate) {
        let mut aggregates = self.aggregates.write().await;
        aggregates.insert(aggregate.variant.id.0.clone(), aggregate);
    }

    pub async fn remove(&self, variant_id: &VariantId) {
        self.aggregates.write().await.remove(&variant_id.0);
    }

    pub async fn set_curated(&self, subject: &VariantId, links: Vec<CuratedLink>) {
        self.curated.write().await.insert(subject.0.clone(), links);
    }

    /// The next `count` aggregate loads fail as if the store were down.
    pub fn fail_next_loads(&self, count: u32) {
        self.load_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SourceCatalogRepository for InMemorySourceCatalogRepository {
    async fn load_aggregate(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<SourceAggregate>, RepositoryError> {
        if take_failure(&self.load_failures) {
            return Err(RepositoryError::Unavailable("source catalog offline".to_string()));
        }
        let aggregates = self.aggregates.read().await;
        Ok(aggregates.get(&variant_id.0).cloned())
    }

    async fn list_published_variant_ids(&self) -> Result<Vec<VariantId>, RepositoryError> {
        let aggregates = self.aggregates.read().await;
        let mut ids: Vec<VariantId> = aggregates
            .values()
            .filter(|aggregate| aggregate.variant.publication.is_published())
            .map(|aggregate| aggregate.variant.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_variant_ids_for_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<VariantId>, RepositoryError> {
        let aggregates = self.aggregates.read().await;
        let mut ids: Vec<VariantId> = aggregates
            .values()
            .filter(|aggregate| &aggregate.variant.product_id == product_id)
            .map(|aggregate| aggregate.variant.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_curated_links(
        &self,
        subject: &VariantId,
    ) -> Result<Vec<CuratedLink>, RepositoryError> {
        let curated = self.curated.read().await;
        let mut links = curated.get(&subject.0).cloned().unwrap_or_default();
        links.sort_by_key(|link| link.position);
        Ok(links)
    }
}

#[derive(Default)]
pub struct InMemoryFlatVariantRepository {
    records: RwLock<HashMap<String, FlatVariant>>,
    failing_facets: RwLock<HashSet<Facet>>,
    save_failures: AtomicU32,
}

impl InMemoryFlatVariantRepository {
    /// Every later lookup for `facet` fails until the repository is dropped.
    pub async fn fail_facet(&self, facet: Facet) {
        self.failing_facets.write().await.insert(facet);
    }

    pub fn fail_next_saves(&self, count: u32) {
        self.save_failures.store(count, Ordering::SeqCst);
    }

    fn matches(record: &FlatVariant, query: &FacetQuery) -> bool {
        match query {
            FacetQuery::SameProducer(producer_id) => &record.producer_id == producer_id,
            FacetQuery::SameRegion(region_id) => &record.region_id == region_id,
            FacetQuery::SharedGrapes(grapes) => {
                record.grapes.iter().any(|grape| grapes.contains(&grape.title))
            }
            FacetQuery::PriceBand(band) => band.contains(record.price),
        }
    }
}

fn candidate(record: &FlatVariant) -> Candidate {
    Candidate {
        variant_id: record.source_variant_id.clone(),
        title: record.title.clone(),
        source_created_at: record.source_created_at,
    }
}

#[async_trait::async_trait]
impl FlatVariantRepository for InMemoryFlatVariantRepository {
    async fn find_by_source_id(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<FlatVariant>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&variant_id.0).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<FlatVariant>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.slug == slug)
            .max_by_key(|record| (record.is_published, record.synced_at))
            .cloned())
    }

    async fn save(&self, record: FlatVariant) -> Result<(), RepositoryError> {
        if take_failure(&self.save_failures) {
            return Err(RepositoryError::Unavailable("flat store offline".to_string()));
        }
        let mut records = self.records.write().await;
        records.insert(record.source_variant_id.0.clone(), record);
        Ok(())
    }

    async fn retire(
        &self,
        variant_id: &VariantId,
        synced_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&variant_id.0) {
            Some(record) => {
                record.is_published = false;
                record.synced_at = synced_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_candidates(
        &self,
        request: &FacetRequest,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        if self.failing_facets.read().await.contains(&request.facet) {
            return Err(RepositoryError::Unavailable(format!(
                "{} lookup timed out",
                request.facet.as_str()
            )));
        }

        let records = self.records.read().await;
        let mut hits: Vec<&FlatVariant> = records
            .values()
            .filter(|record| record.is_published)
            .filter(|record| record.source_variant_id != request.exclude_variant)
            .filter(|record| record.title != request.exclude_title)
            .filter(|record| Self::matches(record, &request.query))
            .collect();
        hits.sort_by(|a, b| {
            b.source_created_at
                .cmp(&a.source_created_at)
                .then_with(|| a.source_variant_id.cmp(&b.source_variant_id))
        });

        Ok(hits.into_iter().take(request.limit).map(candidate).collect())
    }

    async fn find_published_candidates(
        &self,
        ids: &[VariantId],
    ) -> Result<Vec<Candidate>, RepositoryError> {
        let records = self.records.read().await;
        let mut found: Vec<Candidate> = ids
            .iter()
            .filter_map(|id| records.get(&id.0))
            .filter(|record| record.is_published)
            .map(candidate)
            .collect();
        found.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));
        found.dedup_by(|a, b| a.variant_id == b.variant_id);
        Ok(found)
    }

    async fn counts(&self) -> Result<FlatVariantCounts, RepositoryError> {
        let records = self.records.read().await;
        Ok(FlatVariantCounts {
            total: records.len() as u64,
            published: records.values().filter(|record| record.is_published).count() as u64,
        })
    }

    async fn list_source_ids(&self) -> Result<Vec<VariantId>, RepositoryError> {
        let records = self.records.read().await;
        let mut ids: Vec<VariantId> =
            records.values().map(|record| record.source_variant_id.clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_published_source_ids(&self) -> Result<Vec<VariantId>, RepositoryError> {
        let records = self.records.read().await;
        let mut ids: Vec<VariantId> = records
            .values()
            .filter(|record| record.is_published)
            .map(|record| record.source_variant_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default)]
pub struct InMemoryRelatedVariantRepository {
    records: RwLock<HashMap<String, RelatedVariant>>,
}

#[async_trait::async_trait]
impl RelatedVariantRepository for InMemoryRelatedVariantRepository {
    async fn find(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<RelatedVariant>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&variant_id.0).cloned())
    }

    async fn save(&self, record: RelatedVariant) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(record.variant_id.0.clone(), record);
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn count_outdated(&self, computation_version: u32) -> Result<u64, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| record.computation_version != computation_version)
            .count() as u64)
    }
}

#[derive(Default)]
pub struct InMemorySyncQueueRepository {
    tasks: RwLock<HashMap<String, SyncTask>>,
}

#[async_trait::async_trait]
impl SyncQueueRepository for InMemorySyncQueueRepository {
    async fn save_task(&self, task: SyncTask) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.0.clone(), task);
        Ok(())
    }

    async fn find_task(&self, id: &SyncTaskId) -> Result<Option<SyncTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id.0).cloned())
    }

    async fn next_claimable(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<SyncTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|task| match task.state {
                SyncTaskState::Queued | SyncTaskState::RetryableFailed => task.available_at <= now,
                SyncTaskState::Running => {
                    task.claimed_at.is_some_and(|claimed_at| claimed_at < stale_before)
                }
                SyncTaskState::Completed | SyncTaskState::FailedTerminal => false,
            })
            .min_by(|a, b| {
                a.available_at
                    .cmp(&b.available_at)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.0.cmp(&b.id.0))
            })
            .cloned())
    }

    async fn swap_task(
        &self,
        previous: &SyncTask,
        next: SyncTask,
    ) -> Result<bool, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&previous.id.0) {
            Some(stored)
                if stored.state == previous.state
                    && stored.updated_at == previous.updated_at
                    && stored.claimed_by == previous.claimed_by =>
            {
                *stored = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_tasks(
        &self,
        kind: Option<TaskKind>,
        state: Option<SyncTaskState>,
        limit: usize,
    ) -> Result<Vec<SyncTask>, RepositoryError> {
        let tasks = self.tasks.read().await;
        let mut listed: Vec<SyncTask> = tasks
            .values()
            .filter(|task| kind.is_none_or(|kind| task.kind == kind))
            .filter(|task| state.is_none_or(|state| task.state == state))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        listed.truncate(limit);
        Ok(listed)
    }

    async fn count_by_state(&self) -> Result<Vec<(SyncTaskState, u64)>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(SyncTaskState::ALL
            .iter()
            .map(|state| {
                (*state, tasks.values().filter(|task| task.state == *state).count() as u64)
            })
            .collect())
    }

    async fn purge(
        &self,
        kind: Option<TaskKind>,
        states: &[SyncTaskState],
    ) -> Result<u64, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| {
            !(states.contains(&task.state) && kind.is_none_or(|kind| task.kind == kind))
        });
        Ok((before - tasks.len()) as u64)
    }
}
