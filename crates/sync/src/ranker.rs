use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use vinoteka_core::domain::catalog::VariantId;
use vinoteka_core::domain::flat::FlatVariant;
use vinoteka_core::domain::related::{Facet, RelatedVariant};
use vinoteka_core::ranking::{
    facet_requests, needs_fallback, rank, CuratedLink, FacetHits, RankingError, RankingSettings,
};
use vinoteka_db::repositories::{
    FlatVariantRepository, RelatedVariantRepository, RepositoryError, SourceCatalogRepository,
};

#[derive(Clone, Debug, PartialEq)]
pub struct RankingReport {
    pub record: RelatedVariant,
    /// Facets whose lookup failed and contributed nothing.
    pub degraded_facets: Vec<Facet>,
    pub curated_degraded: bool,
}

/// Computes and persists the related set for one subject variant.
pub struct RelatedRanker {
    source: Arc<dyn SourceCatalogRepository>,
    flat: Arc<dyn FlatVariantRepository>,
    related: Arc<dyn RelatedVariantRepository>,
    settings: RankingSettings,
    default_limit: usize,
}

impl RelatedRanker {
    pub fn new(
        source: Arc<dyn SourceCatalogRepository>,
        flat: Arc<dyn FlatVariantRepository>,
        related: Arc<dyn RelatedVariantRepository>,
        settings: RankingSettings,
        default_limit: usize,
    ) -> Self {
        Self { source, flat, related, settings, default_limit }
    }

    pub fn settings(&self) -> &RankingSettings {
        &self.settings
    }

    pub async fn compute_related(
        &self,
        subject_id: &VariantId,
        limit: Option<usize>,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RankingReport, RankingError> {
        let limit = limit.unwrap_or(self.default_limit);
        let subject = self
            .flat
            .find_by_source_id(subject_id)
            .await
            .map_err(store_error)?
            .filter(|record| record.is_published);
        let Some(subject) = subject else {
            warn!(
                event_name = "sync.ranking.subject_missing",
                correlation_id = %correlation_id,
                variant_id = %subject_id.0,
                "subject has no published flat record"
            );
            return Err(RankingError::SubjectNotFound(subject_id.clone()));
        };

        let (curated, curated_degraded) = self.curated_links(&subject, correlation_id).await;

        let mut facets = Vec::new();
        let mut degraded_facets = Vec::new();
        if needs_fallback(curated.len(), limit) {
            for request in facet_requests(&subject, &self.settings, limit) {
                match self.flat.find_candidates(&request).await {
                    Ok(candidates) => facets.push(FacetHits { facet: request.facet, candidates }),
                    Err(error) => {
                        warn!(
                            event_name = "sync.ranking.facet_degraded",
                            correlation_id = %correlation_id,
                            variant_id = %subject_id.0,
                            facet = request.facet.as_str(),
                            error = %error,
                            "facet lookup failed; contributing no items"
                        );
                        degraded_facets.push(request.facet);
                        facets.push(FacetHits { facet: request.facet, candidates: Vec::new() });
                    }
                }
            }
        }

        let record = rank(&subject, &curated, &facets, &self.settings, limit, now);
        self.related.save(record.clone()).await.map_err(store_error)?;

        info!(
            event_name = "sync.ranking.computed",
            correlation_id = %correlation_id,
            variant_id = %subject_id.0,
            related_count = record.related_count,
            curated = curated.len(),
            degraded_facets = degraded_facets.len(),
            computation_version = record.computation_version,
            "related variants computed"
        );

        Ok(RankingReport { record, degraded_facets, curated_degraded })
    }

    /// Curated links whose target is a published flat record. A failing
    /// lookup degrades to no curated links, like any other facet.
    async fn curated_links(
        &self,
        subject: &FlatVariant,
        correlation_id: &str,
    ) -> (Vec<CuratedLink>, bool) {
        let loaded = async {
            let links = self.source.list_curated_links(&subject.source_variant_id).await?;
            let ids: Vec<VariantId> =
                links.iter().map(|link| link.related_variant_id.clone()).collect();
            let published = self.flat.find_published_candidates(&ids).await?;
            Ok::<_, RepositoryError>((links, published))
        }
        .await;

        match loaded {
            Ok((links, published)) => {
                let live: HashSet<&VariantId> =
                    published.iter().map(|candidate| &candidate.variant_id).collect();
                let kept = links
                    .iter()
                    .filter(|link| live.contains(&link.related_variant_id))
                    .cloned()
                    .collect();
                (kept, false)
            }
            Err(error) => {
                warn!(
                    event_name = "sync.ranking.curated_degraded",
                    correlation_id = %correlation_id,
                    variant_id = %subject.source_variant_id.0,
                    error = %error,
                    "curated lookup failed; continuing with computed facets"
                );
                (Vec::new(), true)
            }
        }
    }
}

fn store_error(error: RepositoryError) -> RankingError {
    RankingError::Store(error.to_string())
}
