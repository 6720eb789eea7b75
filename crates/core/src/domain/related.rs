use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::catalog::VariantId;

/// One independent relatedness criterion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Producer,
    GrapeVariety,
    Region,
    PriceBand,
}

impl Facet {
    pub const ALL: [Facet; 4] = [Facet::Producer, Facet::GrapeVariety, Facet::Region, Facet::PriceBand];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::GrapeVariety => "grape_variety",
            Self::Region => "region",
            Self::PriceBand => "price_band",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "producer" => Some(Self::Producer),
            "grape_variety" | "grape" => Some(Self::GrapeVariety),
            "region" => Some(Self::Region),
            "price_band" | "price" => Some(Self::PriceBand),
            _ => None,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Producer => "Same winery",
            Self::GrapeVariety => "Same grape variety",
            Self::Region => "Same region",
            Self::PriceBand => "Similar price range",
        }
    }

    /// Storefront bucket name.
    pub fn bucket_name(&self) -> &'static str {
        match self {
            Self::Producer => "Brothers & Sisters",
            Self::Region => "Neighbours",
            Self::GrapeVariety => "Cousins",
            Self::PriceBand => "Budget Buds",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationOrigin {
    Curated,
    Computed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub facet: Facet,
    pub origin: RelationOrigin,
    pub score: f64,
    pub reason: String,
    pub related_variant_id: VariantId,
}

/// Materialized recommendation set for one subject variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedVariant {
    pub variant_id: VariantId,
    pub related_count: u32,
    pub last_computed: DateTime<Utc>,
    pub computation_version: u32,
    /// Sorted by score, already truncated.
    pub related_items: Vec<RelatedItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedBucket {
    pub name: String,
    pub facet: Facet,
    pub items: Vec<RelatedItem>,
}
