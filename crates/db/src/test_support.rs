use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use vinoteka_core::domain::catalog::{
    BackorderPolicy, CountryId, ProducerId, ProductId, RegionId, VariantId,
};
use vinoteka_core::domain::flat::{FlatGrape, FlatVariant, FlatVariantId};

pub(crate) fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid timestamp").with_timezone(&Utc)
}

/// A published flat record with just enough content for store tests.
pub(crate) fn sample_flat(
    id: &str,
    title: &str,
    producer: &str,
    region: &str,
    price: &str,
    grapes: &[&str],
) -> FlatVariant {
    let source = VariantId(id.to_string());
    FlatVariant {
        id: FlatVariantId::for_source(&source),
        source_variant_id: source,
        product_id: ProductId(format!("P-{id}")),
        slug: title.to_ascii_lowercase().replace(' ', "-"),
        sku: format!("SKU-{id}"),
        title: title.to_string(),
        title_alt: title.to_string(),
        description: None,
        description_alt: None,
        tasting_notes: None,
        tasting_notes_alt: None,
        producer_id: ProducerId(producer.to_string()),
        producer_slug: producer.to_string(),
        producer_title: producer.to_string(),
        producer_title_alt: producer.to_string(),
        region_id: RegionId(region.to_string()),
        region_title: region.to_string(),
        region_title_alt: region.to_string(),
        country_id: CountryId("si".to_string()),
        country_code: "SI".to_string(),
        country_title: "Slovenija".to_string(),
        country_title_alt: "Slovenia".to_string(),
        style_title: None,
        style_title_alt: None,
        size_ml: 750,
        vintage: Some(2021),
        price: Decimal::from_str(price).expect("valid price"),
        stock_on_hand: 12,
        backorder: BackorderPolicy::Deny,
        serving_temperature: None,
        decant: false,
        grapes: grapes
            .iter()
            .map(|grape| FlatGrape {
                title: grape.to_string(),
                title_alt: grape.to_string(),
                percentage: 100,
            })
            .collect(),
        aromas: Vec::new(),
        tags: Vec::new(),
        moods: Vec::new(),
        dishes: Vec::new(),
        climates: Vec::new(),
        related_producer_ids: Vec::new(),
        related_region_ids: Vec::new(),
        primary_image_url: None,
        source_created_at: parse_ts("2024-03-01T10:00:00Z"),
        is_published: true,
        synced_at: parse_ts("2026-01-01T00:00:00Z"),
    }
}
