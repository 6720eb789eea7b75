//! Job handlers: the boundary where pipeline results become queue signals.
//!
//! Nothing a handler does escapes as an error. Every projection or ranking
//! outcome is classified into a [`JobResult`] the worker can apply to the
//! task.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use vinoteka_core::domain::catalog::{ProductId, VariantId};
use vinoteka_core::domain::sync::{SyncTask, TaskKind, TaskOutcome};
use vinoteka_core::sync_engine::{JobDisposition, RetryPolicy};
use vinoteka_db::repositories::SourceCatalogRepository;

use crate::projector::FlatProjector;
use crate::ranker::RelatedRanker;

/// Work a finished job asks for next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowUp {
    pub kind: TaskKind,
    pub input_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobResult {
    Succeeded {
        outcome: TaskOutcome,
        fingerprint: Option<String>,
        follow_ups: Vec<FollowUp>,
    },
    Failed {
        policy: RetryPolicy,
        message: String,
        error_class: String,
    },
}

impl JobResult {
    fn failed(disposition: JobDisposition, message: String, error_class: &str) -> Self {
        let policy = match disposition {
            JobDisposition::Retry => RetryPolicy::Retry,
            JobDisposition::FailTerminal | JobDisposition::Succeed => RetryPolicy::FailTerminal,
        };
        Self::Failed { policy, message, error_class: error_class.to_string() }
    }
}

pub struct PipelineJobs {
    source: Arc<dyn SourceCatalogRepository>,
    projector: Arc<FlatProjector>,
    ranker: Arc<RelatedRanker>,
}

impl PipelineJobs {
    pub fn new(
        source: Arc<dyn SourceCatalogRepository>,
        projector: Arc<FlatProjector>,
        ranker: Arc<RelatedRanker>,
    ) -> Self {
        Self { source, projector, ranker }
    }

    pub async fn run(&self, task: &SyncTask, now: DateTime<Utc>) -> JobResult {
        match task.kind {
            TaskKind::ProjectVariant => self.project_variant(task, now).await,
            TaskKind::ProjectCollection => self.project_collection(task).await,
            TaskKind::ComputeRelated => self.compute_related(task, now).await,
        }
    }

    async fn project_variant(&self, task: &SyncTask, now: DateTime<Utc>) -> JobResult {
        let variant_id = VariantId(task.input_id.clone());
        match self.projector.project_variant(&variant_id, &task.correlation_id, now).await {
            Ok(written) => JobResult::Succeeded {
                outcome: TaskOutcome::Projected,
                fingerprint: Some(written.fingerprint),
                follow_ups: vec![FollowUp {
                    kind: TaskKind::ComputeRelated,
                    input_id: variant_id.0,
                }],
            },
            Err(error) => match error.disposition() {
                JobDisposition::Succeed => JobResult::Succeeded {
                    outcome: TaskOutcome::Retired,
                    fingerprint: None,
                    follow_ups: Vec::new(),
                },
                disposition => {
                    JobResult::failed(disposition, error.to_string(), error.error_class())
                }
            },
        }
    }

    async fn project_collection(&self, task: &SyncTask) -> JobResult {
        let product_id = ProductId(task.input_id.clone());
        match self.source.list_variant_ids_for_product(&product_id).await {
            Ok(variant_ids) if variant_ids.is_empty() => JobResult::failed(
                JobDisposition::FailTerminal,
                format!("product {:?} has no variants", product_id.0),
                "not_found",
            ),
            Ok(variant_ids) => JobResult::Succeeded {
                outcome: TaskOutcome::FannedOut,
                fingerprint: None,
                follow_ups: variant_ids
                    .into_iter()
                    .map(|variant_id| FollowUp {
                        kind: TaskKind::ProjectVariant,
                        input_id: variant_id.0,
                    })
                    .collect(),
            },
            Err(error) => JobResult::failed(JobDisposition::Retry, error.to_string(), "store"),
        }
    }

    async fn compute_related(&self, task: &SyncTask, now: DateTime<Utc>) -> JobResult {
        let subject_id = VariantId(task.input_id.clone());
        match self.ranker.compute_related(&subject_id, None, &task.correlation_id, now).await {
            Ok(_) => JobResult::Succeeded {
                outcome: TaskOutcome::Ranked,
                fingerprint: None,
                follow_ups: Vec::new(),
            },
            Err(error) => JobResult::failed(error.disposition(), error.to_string(), error.error_class()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vinoteka_core::domain::catalog::{ProductId, Publication};
    use vinoteka_core::domain::sync::{TaskKind, TaskOutcome};
    use vinoteka_core::media::{CdnMediaResolver, ImageSize};
    use vinoteka_core::ranking::RankingSettings;
    use vinoteka_core::sync_engine::{RetryPolicy, SyncEngine};
    use vinoteka_db::repositories::{
        InMemoryFlatVariantRepository, InMemoryRelatedVariantRepository,
        InMemorySourceCatalogRepository,
    };

    use super::{FollowUp, JobResult, PipelineJobs};
    use crate::projector::FlatProjector;
    use crate::ranker::RelatedRanker;
    use crate::test_support::{aggregate, parse_ts};

    fn jobs(source: Arc<InMemorySourceCatalogRepository>) -> PipelineJobs {
        let flat = Arc::new(InMemoryFlatVariantRepository::default());
        let related = Arc::new(InMemoryRelatedVariantRepository::default());
        let projector = Arc::new(FlatProjector::new(
            source.clone(),
            flat.clone(),
            Arc::new(CdnMediaResolver::new("https://cdn.test", ImageSize::Card)),
        ));
        let ranker = Arc::new(RelatedRanker::new(
            source.clone(),
            flat,
            related,
            RankingSettings::default(),
            20,
        ));
        PipelineJobs::new(source, projector, ranker)
    }

    #[tokio::test]
    async fn projection_chains_into_ranking() {
        let source = Arc::new(InMemorySourceCatalogRepository::default());
        source.insert(aggregate("X", "Movia Rebula", "movia", "brda", "25", &[])).await;
        let jobs = jobs(source);
        let now = parse_ts("2026-01-01T00:00:00Z");
        let task = SyncEngine::new().create_task(TaskKind::ProjectVariant, "X", "req", now);

        let result = jobs.run(&task, now).await;
        let JobResult::Succeeded { outcome, fingerprint, follow_ups } = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(outcome, TaskOutcome::Projected);
        assert!(fingerprint.is_some());
        assert_eq!(
            follow_ups,
            vec![FollowUp { kind: TaskKind::ComputeRelated, input_id: "X".to_string() }]
        );
    }

    #[tokio::test]
    async fn unpublished_source_is_a_successful_retirement() {
        let source = Arc::new(InMemorySourceCatalogRepository::default());
        let mut draft = aggregate("Z", "Burja Noir", "burja", "vipava", "29", &[]);
        draft.variant.publication = Publication::draft();
        source.insert(draft).await;
        let jobs = jobs(source);
        let now = parse_ts("2026-01-01T00:00:00Z");
        let task = SyncEngine::new().create_task(TaskKind::ProjectVariant, "Z", "req", now);

        assert_eq!(
            jobs.run(&task, now).await,
            JobResult::Succeeded {
                outcome: TaskOutcome::Retired,
                fingerprint: None,
                follow_ups: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn missing_subjects_fail_terminally_and_outages_retry() {
        let source = Arc::new(InMemorySourceCatalogRepository::default());
        let jobs = jobs(source.clone());
        let now = parse_ts("2026-01-01T00:00:00Z");
        let engine = SyncEngine::new();

        let missing = engine.create_task(TaskKind::ComputeRelated, "ghost", "req", now);
        assert!(matches!(
            jobs.run(&missing, now).await,
            JobResult::Failed { policy: RetryPolicy::FailTerminal, .. }
        ));

        source.fail_next_loads(1);
        let outage = engine.create_task(TaskKind::ProjectVariant, "X", "req", now);
        let JobResult::Failed { policy, error_class, .. } = jobs.run(&outage, now).await else {
            panic!("expected failure");
        };
        assert_eq!(policy, RetryPolicy::Retry);
        assert_eq!(error_class, "store");
    }

    #[tokio::test]
    async fn collection_fans_out_one_projection_per_variant() {
        let source = Arc::new(InMemorySourceCatalogRepository::default());
        let mut first = aggregate("V-1", "Movia Rebula", "movia", "brda", "25", &[]);
        let mut second = aggregate("V-2", "Movia Rebula", "movia", "brda", "55", &[]);
        first.variant.product_id = ProductId("P-MOVIA".to_string());
        second.variant.product_id = ProductId("P-MOVIA".to_string());
        source.insert(first).await;
        source.insert(second).await;
        let jobs = jobs(source);
        let now = parse_ts("2026-01-01T00:00:00Z");
        let engine = SyncEngine::new();

        let task = engine.create_task(TaskKind::ProjectCollection, "P-MOVIA", "req", now);
        let JobResult::Succeeded { outcome, follow_ups, .. } = jobs.run(&task, now).await else {
            panic!("expected fan-out");
        };
        assert_eq!(outcome, TaskOutcome::FannedOut);
        let inputs: Vec<&str> = follow_ups.iter().map(|f| f.input_id.as_str()).collect();
        assert_eq!(inputs, vec!["V-1", "V-2"]);

        let empty = engine.create_task(TaskKind::ProjectCollection, "P-NONE", "req", now);
        assert!(matches!(
            jobs.run(&empty, now).await,
            JobResult::Failed { policy: RetryPolicy::FailTerminal, .. }
        ));
    }
}
