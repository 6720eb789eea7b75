//! Typed read model of the normalized catalog as the editing surface stores it.
//!
//! The pipeline never mutates these records; they are loaded per variant and
//! handed to the projector as a [`SourceAggregate`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::locale::Localized;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StyleId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Draft,
    Published,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

/// Lifecycle status plus the marker saying whether the alternate-locale copy
/// has been released. Unreleased alternate copy is ignored at projection time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub status: PublishStatus,
    pub alternate_published: bool,
}

impl Publication {
    pub fn published() -> Self {
        Self { status: PublishStatus::Published, alternate_published: true }
    }

    pub fn draft() -> Self {
        Self { status: PublishStatus::Draft, alternate_published: false }
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }

    pub(crate) fn gate(&self, value: &Localized<String>) -> Localized<String> {
        if self.alternate_published {
            value.clone()
        } else {
            value.default_only()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackorderPolicy {
    Deny,
    Allow,
}

impl BackorderPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::Allow => "allow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deny" => Some(Self::Deny),
            "allow" => Some(Self::Allow),
            _ => None,
        }
    }
}

/// Serving temperature range in degrees Celsius.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingTemperature {
    pub min_celsius: u8,
    pub max_celsius: u8,
}

/// Shared shape of the simple taxonomy entities (aromas, tags, moods, dishes,
/// climates, grape varieties).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTerm {
    pub id: TermId,
    pub title: Localized<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Aroma,
    Tag,
    Mood,
    Dish,
    Climate,
    GrapeVariety,
}

impl TermKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aroma => "aroma",
            Self::Tag => "tag",
            Self::Mood => "mood",
            Self::Dish => "dish",
            Self::Climate => "climate",
            Self::GrapeVariety => "grape_variety",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aroma" => Some(Self::Aroma),
            "tag" => Some(Self::Tag),
            "mood" => Some(Self::Mood),
            "dish" => Some(Self::Dish),
            "climate" => Some(Self::Climate),
            "grape_variety" => Some(Self::GrapeVariety),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrapeShare {
    pub grape: CatalogTerm,
    pub percentage: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: CountryId,
    pub code: String,
    pub title: Localized<String>,
    pub publication: Publication,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub country_id: CountryId,
    pub title: Localized<String>,
    pub climates: Vec<CatalogTerm>,
    pub neighbouring_region_ids: Vec<RegionId>,
    pub publication: Publication,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub id: ProducerId,
    pub slug: String,
    pub title: Localized<String>,
    pub related_producer_ids: Vec<ProducerId>,
    pub publication: Publication,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub id: StyleId,
    pub title: Localized<String>,
    pub publication: Publication,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub title: Localized<String>,
    pub description: Option<Localized<String>>,
    pub producer_id: ProducerId,
    pub region_id: RegionId,
    pub style_id: Option<StyleId>,
    pub publication: Publication,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub size_ml: u32,
    pub vintage: Option<u16>,
    pub price: Decimal,
    pub stock_on_hand: i64,
    pub backorder: BackorderPolicy,
    pub serving_temperature: Option<ServingTemperature>,
    pub decant: bool,
    pub tasting_notes: Option<Localized<String>>,
    /// Ordered as curated by the editor.
    pub grapes: Vec<GrapeShare>,
    pub aromas: Vec<CatalogTerm>,
    pub tags: Vec<CatalogTerm>,
    pub moods: Vec<CatalogTerm>,
    pub dishes: Vec<CatalogTerm>,
    pub primary_image_id: Option<String>,
    pub publication: Publication,
    pub created_at: DateTime<Utc>,
}

/// Everything the reader found for one variant. Ancestors are optional so a
/// dangling reference is reported instead of failing the load; `unresolved`
/// lists many-valued links whose target could not be read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAggregate {
    pub variant: Variant,
    pub product: Option<Product>,
    pub producer: Option<Producer>,
    pub region: Option<Region>,
    pub country: Option<Country>,
    pub style: Option<Style>,
    pub unresolved: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::{BackorderPolicy, PublishStatus, TermKind};

    #[test]
    fn storage_encodings_parse_back() {
        for status in [PublishStatus::Draft, PublishStatus::Published] {
            assert_eq!(PublishStatus::parse(status.as_str()), Some(status));
        }
        for policy in [BackorderPolicy::Deny, BackorderPolicy::Allow] {
            assert_eq!(BackorderPolicy::parse(policy.as_str()), Some(policy));
        }
        for kind in [
            TermKind::Aroma,
            TermKind::Tag,
            TermKind::Mood,
            TermKind::Dish,
            TermKind::Climate,
            TermKind::GrapeVariety,
        ] {
            assert_eq!(TermKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(PublishStatus::parse("archived"), None);
    }
}
