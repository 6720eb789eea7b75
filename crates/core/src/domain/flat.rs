//! The denormalized, storefront-facing copy of one sellable variant.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::catalog::{
    BackorderPolicy, CountryId, ProducerId, ProductId, RegionId, ServingTemperature, VariantId,
};
use crate::domain::locale::Locale;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlatVariantId(pub String);

impl FlatVariantId {
    /// Flat ids are derived from the source id so re-projection never mints a
    /// second row for the same variant.
    pub fn for_source(source: &VariantId) -> Self {
        Self(format!("flat-{}", source.0))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatTerm {
    pub title: String,
    pub title_alt: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatGrape {
    pub title: String,
    pub title_alt: String,
    pub percentage: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatVariant {
    pub id: FlatVariantId,
    pub source_variant_id: VariantId,
    pub product_id: ProductId,
    pub slug: String,
    pub sku: String,

    pub title: String,
    pub title_alt: String,
    pub description: Option<String>,
    pub description_alt: Option<String>,
    pub tasting_notes: Option<String>,
    pub tasting_notes_alt: Option<String>,

    pub producer_id: ProducerId,
    pub producer_slug: String,
    pub producer_title: String,
    pub producer_title_alt: String,
    pub region_id: RegionId,
    pub region_title: String,
    pub region_title_alt: String,
    pub country_id: CountryId,
    pub country_code: String,
    pub country_title: String,
    pub country_title_alt: String,
    pub style_title: Option<String>,
    pub style_title_alt: Option<String>,

    pub size_ml: u32,
    pub vintage: Option<u16>,
    pub price: Decimal,
    pub stock_on_hand: i64,
    pub backorder: BackorderPolicy,
    pub serving_temperature: Option<ServingTemperature>,
    pub decant: bool,

    pub grapes: Vec<FlatGrape>,
    pub aromas: Vec<FlatTerm>,
    pub tags: Vec<FlatTerm>,
    pub moods: Vec<FlatTerm>,
    pub dishes: Vec<FlatTerm>,
    pub climates: Vec<FlatTerm>,
    pub related_producer_ids: Vec<ProducerId>,
    pub related_region_ids: Vec<RegionId>,

    pub primary_image_url: Option<String>,
    pub source_created_at: DateTime<Utc>,
    pub is_published: bool,
    pub synced_at: DateTime<Utc>,
}

impl FlatVariant {
    /// Default-locale grape titles, in composition order.
    pub fn grape_titles(&self) -> Vec<String> {
        self.grapes.iter().map(|grape| grape.title.clone()).collect()
    }

    /// Content hash over everything except `synced_at`. Two projections of an
    /// unchanged source produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut stable = self.clone();
        stable.synced_at = Utc.timestamp_opt(0, 0).single().unwrap_or(self.synced_at);
        let encoded = serde_json::to_vec(&stable).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        format!("{:x}", hasher.finalize())
    }

    pub fn view(&self, locale: Locale) -> VariantView {
        VariantView {
            id: self.source_variant_id.0.clone(),
            slug: self.slug.clone(),
            sku: self.sku.clone(),
            title: pick(&self.title, &self.title_alt, locale),
            description: pick_optional(&self.description, &self.description_alt, locale),
            tasting_notes: pick_optional(&self.tasting_notes, &self.tasting_notes_alt, locale),
            producer: pick(&self.producer_title, &self.producer_title_alt, locale),
            producer_slug: self.producer_slug.clone(),
            region: pick(&self.region_title, &self.region_title_alt, locale),
            country: pick(&self.country_title, &self.country_title_alt, locale),
            country_code: self.country_code.clone(),
            style: pick_optional(&self.style_title, &self.style_title_alt, locale),
            size_ml: self.size_ml,
            vintage: self.vintage,
            price: self.price,
            stock_on_hand: self.stock_on_hand,
            backorder: self.backorder,
            serving_temperature: self.serving_temperature,
            decant: self.decant,
            grapes: self
                .grapes
                .iter()
                .map(|grape| GrapeView {
                    title: pick(&grape.title, &grape.title_alt, locale),
                    percentage: grape.percentage,
                })
                .collect(),
            aromas: pick_terms(&self.aromas, locale),
            tags: pick_terms(&self.tags, locale),
            moods: pick_terms(&self.moods, locale),
            dishes: pick_terms(&self.dishes, locale),
            climates: pick_terms(&self.climates, locale),
            primary_image_url: self.primary_image_url.clone(),
            synced_at: self.synced_at,
        }
    }
}

/// A flat record resolved into a single locale for the storefront.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantView {
    pub id: String,
    pub slug: String,
    pub sku: String,
    pub title: String,
    pub description: Option<String>,
    pub tasting_notes: Option<String>,
    pub producer: String,
    pub producer_slug: String,
    pub region: String,
    pub country: String,
    pub country_code: String,
    pub style: Option<String>,
    pub size_ml: u32,
    pub vintage: Option<u16>,
    pub price: Decimal,
    pub stock_on_hand: i64,
    pub backorder: BackorderPolicy,
    pub serving_temperature: Option<ServingTemperature>,
    pub decant: bool,
    pub grapes: Vec<GrapeView>,
    pub aromas: Vec<String>,
    pub tags: Vec<String>,
    pub moods: Vec<String>,
    pub dishes: Vec<String>,
    pub climates: Vec<String>,
    pub primary_image_url: Option<String>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrapeView {
    pub title: String,
    pub percentage: u8,
}

// The projector already backfills alternate fields; this covers rows written
// before that rule existed.
fn pick(default: &str, alternate: &str, locale: Locale) -> String {
    match locale {
        Locale::Alternate if !alternate.trim().is_empty() => alternate.to_string(),
        _ => default.to_string(),
    }
}

fn pick_optional(
    default: &Option<String>,
    alternate: &Option<String>,
    locale: Locale,
) -> Option<String> {
    match (locale, alternate) {
        (Locale::Alternate, Some(value)) if !value.trim().is_empty() => Some(value.clone()),
        _ => default.clone(),
    }
}

fn pick_terms(terms: &[FlatTerm], locale: Locale) -> Vec<String> {
    terms.iter().map(|term| pick(&term.title, &term.title_alt, locale)).collect()
}
