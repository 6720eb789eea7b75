//! Facet weights, the price band and per-facet quotas

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{FacetQuery, FacetRequest};
use crate::domain::flat::FlatVariant;
use crate::domain::related::Facet;

/// Static score per facet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    /// Same winery (default: 0.8)
    pub producer: f64,
    /// Shared grape variety (default: 0.7)
    pub grape_variety: f64,
    /// Same region (default: 0.6)
    pub region: f64,
    /// Overlapping price band (default: 0.5)
    pub price_band: f64,
    /// Editorially curated link (default: 1.0)
    pub curated: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        super::DEFAULT_WEIGHTS
    }
}

impl RankingWeights {
    pub fn for_facet(&self, facet: Facet) -> f64 {
        match facet {
            Facet::Producer => self.producer,
            Facet::GrapeVariety => self.grape_variety,
            Facet::Region => self.region,
            Facet::PriceBand => self.price_band,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSettings {
    pub weights: RankingWeights,
    pub price_band_pct: u32,
    pub bucket_cap: usize,
    pub computation_version: u32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            price_band_pct: super::DEFAULT_PRICE_BAND_PCT,
            bucket_cap: super::DEFAULT_BUCKET_CAP,
            computation_version: super::DEFAULT_COMPUTATION_VERSION,
        }
    }
}

/// Inclusive price range `[price·(1-p), price·(1+p)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBand {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceBand {
    pub fn around(price: Decimal, pct: u32) -> Self {
        let pct = Decimal::new(i64::from(pct), 2);
        Self { min: price * (Decimal::ONE - pct), max: price * (Decimal::ONE + pct) }
    }

    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Per-facet share of the limit, rounded up.
pub fn facet_quota(limit: usize) -> usize {
    limit.div_ceil(Facet::ALL.len())
}

/// Fallback facet lookups for a subject. The grape facet is skipped when the
/// subject has no composition.
pub fn facet_requests(
    subject: &FlatVariant,
    settings: &RankingSettings,
    limit: usize,
) -> Vec<FacetRequest> {
    let quota = facet_quota(limit);
    let grapes = subject.grape_titles();

    let mut queries = vec![(Facet::Producer, FacetQuery::SameProducer(subject.producer_id.clone()))];
    if !grapes.is_empty() {
        queries.push((Facet::GrapeVariety, FacetQuery::SharedGrapes(grapes)));
    }
    queries.push((Facet::Region, FacetQuery::SameRegion(subject.region_id.clone())));
    queries.push((
        Facet::PriceBand,
        FacetQuery::PriceBand(PriceBand::around(subject.price, settings.price_band_pct)),
    ));

    queries
        .into_iter()
        .map(|(facet, query)| FacetRequest {
            facet,
            query,
            exclude_variant: subject.source_variant_id.clone(),
            exclude_title: subject.title.clone(),
            limit: quota,
        })
        .collect()
}
