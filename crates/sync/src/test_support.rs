use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use vinoteka_core::domain::catalog::{
    BackorderPolicy, CatalogTerm, Country, CountryId, GrapeShare, Producer, ProducerId, Product,
    ProductId, Publication, Region, RegionId, SourceAggregate, TermId, Variant, VariantId,
};
use vinoteka_core::domain::locale::Localized;

pub(crate) fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid timestamp").with_timezone(&Utc)
}

/// A fully published aggregate: one product per variant, no style.
pub(crate) fn aggregate(
    variant_id: &str,
    title: &str,
    producer: &str,
    region: &str,
    price: &str,
    grapes: &[&str],
) -> SourceAggregate {
    let product_id = ProductId(format!("P-{variant_id}"));
    SourceAggregate {
        variant: Variant {
            id: VariantId(variant_id.to_string()),
            product_id: product_id.clone(),
            sku: format!("SKU-{variant_id}"),
            size_ml: 750,
            vintage: Some(2021),
            price: Decimal::from_str(price).expect("valid price"),
            stock_on_hand: 6,
            backorder: BackorderPolicy::Deny,
            serving_temperature: None,
            decant: false,
            tasting_notes: None,
            grapes: grapes
                .iter()
                .map(|grape| GrapeShare {
                    grape: CatalogTerm {
                        id: TermId(format!("grape-{grape}")),
                        title: Localized::text(*grape, None),
                    },
                    percentage: 100,
                })
                .collect(),
            aromas: Vec::new(),
            tags: Vec::new(),
            moods: Vec::new(),
            dishes: Vec::new(),
            primary_image_id: None,
            publication: Publication::published(),
            created_at: parse_ts("2024-03-01T10:00:00Z"),
        },
        product: Some(Product {
            id: product_id,
            slug: title.to_ascii_lowercase().replace(' ', "-"),
            title: Localized::text(title, None),
            description: None,
            producer_id: ProducerId(producer.to_string()),
            region_id: RegionId(region.to_string()),
            style_id: None,
            publication: Publication::published(),
            created_at: parse_ts("2024-03-01T09:00:00Z"),
        }),
        producer: Some(Producer {
            id: ProducerId(producer.to_string()),
            slug: producer.to_string(),
            title: Localized::text(producer, None),
            related_producer_ids: Vec::new(),
            publication: Publication::published(),
        }),
        region: Some(Region {
            id: RegionId(region.to_string()),
            country_id: CountryId("si".to_string()),
            title: Localized::text(region, None),
            climates: Vec::new(),
            neighbouring_region_ids: Vec::new(),
            publication: Publication::published(),
        }),
        country: Some(Country {
            id: CountryId("si".to_string()),
            code: "SI".to_string(),
            title: Localized::text("Slovenija", Some("Slovenia")),
            publication: Publication::published(),
        }),
        style: None,
        unresolved: Vec::new(),
    }
}
