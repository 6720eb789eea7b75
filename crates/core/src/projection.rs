//! Flattening of a source aggregate into its [`FlatVariant`].
//!
//! [`flatten`] is pure: the same aggregate, resolver and timestamp always
//! produce the same record. Readiness checks run before anything is
//! assembled, so a failed check never yields a partial record.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::catalog::{
    CatalogTerm, Country, Producer, Product, Publication, Region, SourceAggregate, Style,
    VariantId,
};
use crate::domain::flat::{FlatGrape, FlatTerm, FlatVariant, FlatVariantId};
use crate::domain::locale::Localized;
use crate::media::MediaResolver;
use crate::sync_engine::JobDisposition;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("variant {0:?} does not exist")]
    NotFound(VariantId),
    #[error("variant {variant_id:?} is not publishable: {reason}")]
    SourceUnpublished { variant_id: VariantId, reason: String },
    #[error("variant {variant_id:?} has unresolved links: {}", missing.join(", "))]
    PartialAggregate { variant_id: VariantId, missing: Vec<String> },
    #[error("store failure: {0}")]
    Store(String),
}

impl ProjectionError {
    /// Unpublished sources are a successful no-op, a missing source is
    /// terminal, and everything else may heal on retry.
    pub fn disposition(&self) -> JobDisposition {
        match self {
            Self::SourceUnpublished { .. } => JobDisposition::Succeed,
            Self::NotFound(_) => JobDisposition::FailTerminal,
            Self::PartialAggregate { .. } | Self::Store(_) => JobDisposition::Retry,
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::SourceUnpublished { .. } => "source_unpublished",
            Self::PartialAggregate { .. } => "partial_aggregate",
            Self::Store(_) => "store",
        }
    }
}

/// The required ancestors of a variant, present and published.
#[derive(Clone, Copy, Debug)]
pub struct ReadyAggregate<'a> {
    pub source: &'a SourceAggregate,
    pub product: &'a Product,
    pub producer: &'a Producer,
    pub region: &'a Region,
    pub country: &'a Country,
    pub style: Option<&'a Style>,
}

pub fn check_ready(aggregate: &SourceAggregate) -> Result<ReadyAggregate<'_>, ProjectionError> {
    let variant_id = &aggregate.variant.id;
    let unpublished = |reason: &str| ProjectionError::SourceUnpublished {
        variant_id: variant_id.clone(),
        reason: reason.to_string(),
    };

    if !aggregate.variant.publication.is_published() {
        return Err(unpublished("variant is draft"));
    }
    let product = aggregate.product.as_ref().ok_or_else(|| unpublished("product missing"))?;
    if !product.publication.is_published() {
        return Err(unpublished("product is draft"));
    }
    let producer = aggregate.producer.as_ref().ok_or_else(|| unpublished("producer missing"))?;
    if !producer.publication.is_published() {
        return Err(unpublished("producer is draft"));
    }
    let region = aggregate.region.as_ref().ok_or_else(|| unpublished("region missing"))?;
    if !region.publication.is_published() {
        return Err(unpublished("region is draft"));
    }
    let country = aggregate.country.as_ref().ok_or_else(|| unpublished("country missing"))?;
    if !country.publication.is_published() {
        return Err(unpublished("country is draft"));
    }

    if !aggregate.unresolved.is_empty() {
        return Err(ProjectionError::PartialAggregate {
            variant_id: variant_id.clone(),
            missing: aggregate.unresolved.clone(),
        });
    }

    // Style is optional; a draft style is simply left out.
    let style = aggregate.style.as_ref().filter(|style| style.publication.is_published());

    Ok(ReadyAggregate { source: aggregate, product, producer, region, country, style })
}

pub fn flatten(
    aggregate: &SourceAggregate,
    media: &dyn MediaResolver,
    synced_at: DateTime<Utc>,
) -> Result<FlatVariant, ProjectionError> {
    let ready = check_ready(aggregate)?;
    let variant = &aggregate.variant;
    let product = ready.product;
    let own = variant.publication;

    let (title, title_alt) = both(product.publication, &product.title);
    let (description, description_alt) = both_optional(product.publication, &product.description);
    let (tasting_notes, tasting_notes_alt) = both_optional(own, &variant.tasting_notes);
    let (producer_title, producer_title_alt) =
        both(ready.producer.publication, &ready.producer.title);
    let (region_title, region_title_alt) = both(ready.region.publication, &ready.region.title);
    let (country_title, country_title_alt) = both(ready.country.publication, &ready.country.title);
    let (style_title, style_title_alt) = match ready.style {
        Some(style) => {
            let (default, alternate) = both(style.publication, &style.title);
            (Some(default), Some(alternate))
        }
        None => (None, None),
    };

    let grapes = variant
        .grapes
        .iter()
        .map(|share| {
            let (title, title_alt) = both(own, &share.grape.title);
            FlatGrape { title, title_alt, percentage: share.percentage }
        })
        .collect();

    Ok(FlatVariant {
        id: FlatVariantId::for_source(&variant.id),
        source_variant_id: variant.id.clone(),
        product_id: product.id.clone(),
        slug: format!("{}-{}", product.slug, variant.sku.trim().to_ascii_lowercase()),
        sku: variant.sku.clone(),
        title,
        title_alt,
        description,
        description_alt,
        tasting_notes,
        tasting_notes_alt,
        producer_id: ready.producer.id.clone(),
        producer_slug: ready.producer.slug.clone(),
        producer_title,
        producer_title_alt,
        region_id: ready.region.id.clone(),
        region_title,
        region_title_alt,
        country_id: ready.country.id.clone(),
        country_code: ready.country.code.clone(),
        country_title,
        country_title_alt,
        style_title,
        style_title_alt,
        size_ml: variant.size_ml,
        vintage: variant.vintage,
        price: variant.price,
        stock_on_hand: variant.stock_on_hand,
        backorder: variant.backorder,
        serving_temperature: variant.serving_temperature,
        decant: variant.decant,
        grapes,
        aromas: terms(own, &variant.aromas),
        tags: terms(own, &variant.tags),
        moods: terms(own, &variant.moods),
        dishes: terms(own, &variant.dishes),
        climates: terms(ready.region.publication, &ready.region.climates),
        related_producer_ids: ready.producer.related_producer_ids.clone(),
        related_region_ids: ready.region.neighbouring_region_ids.clone(),
        primary_image_url: variant.primary_image_id.as_deref().and_then(|id| media.primary_url(id)),
        source_created_at: variant.created_at,
        is_published: true,
        synced_at,
    })
}

fn both(publication: Publication, value: &Localized<String>) -> (String, String) {
    publication.gate(value).backfilled()
}

fn both_optional(
    publication: Publication,
    value: &Option<Localized<String>>,
) -> (Option<String>, Option<String>) {
    match value {
        Some(value) => {
            let (default, alternate) = both(publication, value);
            (Some(default), Some(alternate))
        }
        None => (None, None),
    }
}

fn terms(publication: Publication, values: &[CatalogTerm]) -> Vec<FlatTerm> {
    values
        .iter()
        .map(|term| {
            let (title, title_alt) = both(publication, &term.title);
            FlatTerm { title, title_alt }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{check_ready, flatten, ProjectionError};
    use crate::domain::catalog::{
        BackorderPolicy, CatalogTerm, Country, CountryId, GrapeShare, Producer, ProducerId,
        Product, ProductId, Publication, Region, RegionId, SourceAggregate, Style, StyleId,
        TermId, Variant, VariantId,
    };
    use crate::domain::locale::{Locale, Localized};
    use crate::media::{CdnMediaResolver, ImageSize};
    use crate::sync_engine::JobDisposition;

    fn term(id: &str, default: &str, alternate: Option<&str>) -> CatalogTerm {
        CatalogTerm { id: TermId(id.to_string()), title: Localized::text(default, alternate) }
    }

    fn aggregate() -> SourceAggregate {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("valid date");
        SourceAggregate {
            variant: Variant {
                id: VariantId("V-1".to_string()),
                product_id: ProductId("P-1".to_string()),
                sku: "MOV-REB-075".to_string(),
                size_ml: 750,
                vintage: Some(2021),
                price: Decimal::new(2500, 2),
                stock_on_hand: 12,
                backorder: BackorderPolicy::Deny,
                serving_temperature: None,
                decant: false,
                tasting_notes: Some(Localized::text("Sveže", None)),
                grapes: vec![GrapeShare {
                    grape: term("G-1", "Rebula", Some("Ribolla Gialla")),
                    percentage: 100,
                }],
                aromas: vec![term("A-1", "Breskev", Some("Peach"))],
                tags: vec![],
                moods: vec![term("M-1", "Poletje", None)],
                dishes: vec![],
                primary_image_id: Some("img-1".to_string()),
                publication: Publication::published(),
                created_at: created,
            },
            product: Some(Product {
                id: ProductId("P-1".to_string()),
                slug: "movia-rebula".to_string(),
                title: Localized::text("Movia Rebula", Some("Movia Ribolla")),
                description: None,
                producer_id: ProducerId("PR-1".to_string()),
                region_id: RegionId("R-1".to_string()),
                style_id: Some(StyleId("S-1".to_string())),
                publication: Publication::published(),
                created_at: created - Duration::days(3),
            }),
            producer: Some(Producer {
                id: ProducerId("PR-1".to_string()),
                slug: "movia".to_string(),
                title: Localized::text("Movia", None),
                related_producer_ids: vec![ProducerId("PR-2".to_string())],
                publication: Publication::published(),
            }),
            region: Some(Region {
                id: RegionId("R-1".to_string()),
                country_id: CountryId("C-1".to_string()),
                title: Localized::text("Goriška Brda", Some("Brda Hills")),
                climates: vec![term("CL-1", "Submediteransko", Some("Sub-Mediterranean"))],
                neighbouring_region_ids: vec![RegionId("R-2".to_string())],
                publication: Publication::published(),
            }),
            country: Some(Country {
                id: CountryId("C-1".to_string()),
                code: "SI".to_string(),
                title: Localized::text("Slovenija", Some("Slovenia")),
                publication: Publication::published(),
            }),
            style: Some(Style {
                id: StyleId("S-1".to_string()),
                title: Localized::text("Belo", Some("White")),
                publication: Publication::published(),
            }),
            unresolved: vec![],
        }
    }

    fn resolver() -> CdnMediaResolver {
        CdnMediaResolver::new("https://cdn.test", ImageSize::Card)
    }

    #[test]
    fn flatten_copies_both_locales_and_backfills_missing_alternates() {
        let synced_at = Utc::now();
        let flat = flatten(&aggregate(), &resolver(), synced_at).expect("published aggregate");

        assert_eq!(flat.title, "Movia Rebula");
        assert_eq!(flat.title_alt, "Movia Ribolla");
        assert_eq!(flat.producer_title_alt, "Movia");
        assert_eq!(flat.country_title_alt, "Slovenia");
        assert_eq!(flat.tasting_notes_alt.as_deref(), Some("Sveže"));
        assert_eq!(flat.moods[0].title_alt, "Poletje");
        assert_eq!(flat.grapes[0].title_alt, "Ribolla Gialla");
        assert_eq!(flat.climates[0].title_alt, "Sub-Mediterranean");
        assert_eq!(flat.description, None);
        assert_eq!(flat.description_alt, None);
        assert_eq!(flat.slug, "movia-rebula-mov-reb-075");
        assert_eq!(flat.primary_image_url.as_deref(), Some("https://cdn.test/img-1/card"));
        assert_eq!(flat.related_region_ids, vec![RegionId("R-2".to_string())]);
        assert!(flat.is_published);
        assert_eq!(flat.synced_at, synced_at);
    }

    #[test]
    fn unreleased_alternate_copy_is_replaced_by_default() {
        let mut source = aggregate();
        if let Some(product) = source.product.as_mut() {
            product.publication.alternate_published = false;
        }

        let flat = flatten(&source, &resolver(), Utc::now()).expect("published aggregate");
        assert_eq!(flat.title_alt, "Movia Rebula");
        assert_eq!(flat.view(Locale::Alternate).title, "Movia Rebula");
    }

    #[test]
    fn projection_is_stable_apart_from_sync_timestamp() {
        let source = aggregate();
        let first = flatten(&source, &resolver(), Utc::now()).expect("first");
        let second =
            flatten(&source, &resolver(), Utc::now() + Duration::minutes(5)).expect("second");

        assert_ne!(first.synced_at, second.synced_at);
        assert_eq!(first.fingerprint(), second.fingerprint());

        let mut normalized = second.clone();
        normalized.synced_at = first.synced_at;
        assert_eq!(first, normalized);
    }

    #[test]
    fn draft_or_missing_ancestors_are_reported_as_unpublished() {
        let mut draft_product = aggregate();
        if let Some(product) = draft_product.product.as_mut() {
            product.publication = Publication::draft();
        }
        let mut missing_country = aggregate();
        missing_country.country = None;

        for source in [draft_product, missing_country] {
            let error = flatten(&source, &resolver(), Utc::now()).expect_err("not ready");
            assert!(matches!(error, ProjectionError::SourceUnpublished { .. }));
            assert_eq!(error.disposition(), JobDisposition::Succeed);
        }
    }

    #[test]
    fn draft_style_is_omitted_rather_than_blocking() {
        let mut source = aggregate();
        if let Some(style) = source.style.as_mut() {
            style.publication = Publication::draft();
        }

        let ready = check_ready(&source).expect("style is optional");
        assert!(ready.style.is_none());
        let flat = flatten(&source, &resolver(), Utc::now()).expect("flat");
        assert_eq!(flat.style_title, None);
    }

    #[test]
    fn unresolved_links_are_retryable_partial_aggregates() {
        let mut source = aggregate();
        source.unresolved = vec!["aroma:A-404".to_string()];

        let error = flatten(&source, &resolver(), Utc::now()).expect_err("partial");
        assert!(matches!(error, ProjectionError::PartialAggregate { .. }));
        assert_eq!(error.disposition(), JobDisposition::Retry);
        assert_eq!(error.error_class(), "partial_aggregate");
    }

    #[test]
    fn every_default_locale_field_is_filled_for_complete_sources() {
        let flat = flatten(&aggregate(), &resolver(), Utc::now()).expect("flat");
        for value in [
            &flat.title,
            &flat.producer_title,
            &flat.region_title,
            &flat.country_title,
            &flat.slug,
            &flat.sku,
        ] {
            assert!(!value.is_empty());
        }
        assert!(flat.style_title.is_some());
        assert!(flat.tasting_notes.is_some());
    }
}
