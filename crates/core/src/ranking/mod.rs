//! Related-Item Ranking
//!
//! Scores, merges and groups "related" variants for a subject variant across
//! independent facets (same producer, same grape variety, same region,
//! similar price) plus editorially curated links.

mod merge;
mod scoring;
mod types;

pub use merge::{group_for_presentation, needs_fallback, rank};
pub use scoring::{facet_quota, facet_requests, PriceBand, RankingSettings, RankingWeights};
pub use types::*;

/// Default facet weights. Business tuning values; change them through
/// configuration and bump the computation version.
pub const DEFAULT_WEIGHTS: RankingWeights = RankingWeights {
    producer: 0.8,
    grape_variety: 0.7,
    region: 0.6,
    price_band: 0.5,
    curated: 1.0,
};

/// Items persisted per subject when the caller does not ask for a limit.
pub const DEFAULT_RELATED_LIMIT: usize = 20;

/// Entries per presentation bucket.
pub const DEFAULT_BUCKET_CAP: usize = 5;

/// Half-width of the price band, in percent of the subject price.
pub const DEFAULT_PRICE_BAND_PCT: u32 = 30;

pub const DEFAULT_COMPUTATION_VERSION: u32 = 1;

pub const CURATED_REASON: &str = "Curated selection";
