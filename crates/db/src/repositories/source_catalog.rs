use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use vinoteka_core::domain::catalog::{
    BackorderPolicy, CatalogTerm, Country, CountryId, GrapeShare, Producer, ProducerId, Product,
    ProductId, Publication, PublishStatus, Region, RegionId, ServingTemperature, SourceAggregate,
    Style, StyleId, TermId, TermKind, Variant, VariantId,
};
use vinoteka_core::domain::locale::Localized;
use vinoteka_core::domain::related::Facet;
use vinoteka_core::ranking::CuratedLink;

use super::{parse_timestamp, parse_u32, RepositoryError, SourceCatalogRepository};
use crate::DbPool;

pub struct SqlSourceCatalogRepository {
    pool: DbPool,
}

impl SqlSourceCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_variant_terms(
        &self,
        variant_id: &VariantId,
        unresolved: &mut Vec<String>,
    ) -> Result<VariantTerms, RepositoryError> {
        let grape_rows = sqlx::query(
            "SELECT vg.term_id, vg.percentage, ct.title, ct.title_alt
             FROM variant_grape vg
             LEFT JOIN catalog_term ct ON ct.id = vg.term_id
             WHERE vg.variant_id = ?
             ORDER BY vg.position ASC, vg.term_id ASC",
        )
        .bind(&variant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut terms = VariantTerms::default();
        for row in grape_rows {
            let term_id: String = row.try_get("term_id")?;
            match term_from_joined_row(&row, &term_id)? {
                Some(grape) => {
                    let percentage = row.try_get::<i64, _>("percentage")?;
                    let percentage = u8::try_from(percentage).map_err(|_| {
                        RepositoryError::Decode(format!(
                            "invalid grape percentage for `{term_id}`: {percentage}"
                        ))
                    })?;
                    terms.grapes.push(GrapeShare { grape, percentage });
                }
                None => unresolved.push(format!("grape_variety:{term_id}")),
            }
        }

        let term_rows = sqlx::query(
            "SELECT vt.term_id, vt.kind, ct.title, ct.title_alt
             FROM variant_term vt
             LEFT JOIN catalog_term ct ON ct.id = vt.term_id
             WHERE vt.variant_id = ?
             ORDER BY vt.kind ASC, vt.position ASC, vt.term_id ASC",
        )
        .bind(&variant_id.0)
        .fetch_all(&self.pool)
        .await?;

        for row in term_rows {
            let term_id: String = row.try_get("term_id")?;
            let kind_raw: String = row.try_get("kind")?;
            let kind = TermKind::parse(&kind_raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown term kind `{kind_raw}`"))
            })?;
            let Some(term) = term_from_joined_row(&row, &term_id)? else {
                unresolved.push(format!("{}:{term_id}", kind.as_str()));
                continue;
            };
            match kind {
                TermKind::Aroma => terms.aromas.push(term),
                TermKind::Tag => terms.tags.push(term),
                TermKind::Mood => terms.moods.push(term),
                TermKind::Dish => terms.dishes.push(term),
                TermKind::Climate | TermKind::GrapeVariety => {
                    return Err(RepositoryError::Decode(format!(
                        "term kind `{kind_raw}` is not linked to variants directly"
                    )))
                }
            }
        }

        Ok(terms)
    }

    async fn load_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, slug, title, title_alt, description, description_alt,
                    producer_id, region_id, style_id, status, alternate_published, created_at
             FROM product
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(product_from_row).transpose()
    }

    async fn load_producer(&self, id: &ProducerId) -> Result<Option<Producer>, RepositoryError> {
        let Some(row) = sqlx::query(
            "SELECT id, slug, title, title_alt, status, alternate_published
             FROM producer
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let related_producer_ids = sqlx::query(
            "SELECT related_producer_id
             FROM producer_relation
             WHERE producer_id = ?
             ORDER BY position ASC, related_producer_id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.try_get::<String, _>("related_producer_id").map(ProducerId))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Producer {
            id: ProducerId(row.try_get("id")?),
            slug: row.try_get("slug")?,
            title: localized_from_row(&row, "title", "title_alt")?,
            related_producer_ids,
            publication: publication_from_row(&row)?,
        }))
    }

    async fn load_region(
        &self,
        id: &RegionId,
        unresolved: &mut Vec<String>,
    ) -> Result<Option<Region>, RepositoryError> {
        let Some(row) = sqlx::query(
            "SELECT id, country_id, title, title_alt, status, alternate_published
             FROM region
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let climate_rows = sqlx::query(
            "SELECT rc.term_id, ct.title, ct.title_alt
             FROM region_climate rc
             LEFT JOIN catalog_term ct ON ct.id = rc.term_id
             WHERE rc.region_id = ?
             ORDER BY rc.position ASC, rc.term_id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut climates = Vec::with_capacity(climate_rows.len());
        for climate_row in climate_rows {
            let term_id: String = climate_row.try_get("term_id")?;
            match term_from_joined_row(&climate_row, &term_id)? {
                Some(term) => climates.push(term),
                None => unresolved.push(format!("climate:{term_id}")),
            }
        }

        let neighbouring_region_ids = sqlx::query(
            "SELECT neighbour_region_id
             FROM region_neighbour
             WHERE region_id = ?
             ORDER BY position ASC, neighbour_region_id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.try_get::<String, _>("neighbour_region_id").map(RegionId))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Region {
            id: RegionId(row.try_get("id")?),
            country_id: CountryId(row.try_get("country_id")?),
            title: localized_from_row(&row, "title", "title_alt")?,
            climates,
            neighbouring_region_ids,
            publication: publication_from_row(&row)?,
        }))
    }

    async fn load_country(&self, id: &CountryId) -> Result<Option<Country>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, code, title, title_alt, status, alternate_published
             FROM country
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Country {
                id: CountryId(row.try_get("id")?),
                code: row.try_get("code")?,
                title: localized_from_row(&row, "title", "title_alt")?,
                publication: publication_from_row(&row)?,
            })
        })
        .transpose()
    }

    async fn load_style(&self, id: &StyleId) -> Result<Option<Style>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, title_alt, status, alternate_published
             FROM style
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Style {
                id: StyleId(row.try_get("id")?),
                title: localized_from_row(&row, "title", "title_alt")?,
                publication: publication_from_row(&row)?,
            })
        })
        .transpose()
    }
}

#[async_trait::async_trait]
impl SourceCatalogRepository for SqlSourceCatalogRepository {
    async fn load_aggregate(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<SourceAggregate>, RepositoryError> {
        let Some(row) = sqlx::query(
            "SELECT id, product_id, sku, size_ml, vintage, price, stock_on_hand, backorder,
                    serving_temp_min, serving_temp_max, decant, tasting_notes, tasting_notes_alt,
                    primary_image_id, status, alternate_published, created_at
             FROM variant
             WHERE id = ?",
        )
        .bind(&variant_id.0)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let mut unresolved = Vec::new();
        let terms = self.load_variant_terms(variant_id, &mut unresolved).await?;
        let variant = variant_from_row(&row, terms)?;

        let product = self.load_product(&variant.product_id).await?;
        let (producer, region, style) = match &product {
            Some(product) => {
                let producer = self.load_producer(&product.producer_id).await?;
                let region = self.load_region(&product.region_id, &mut unresolved).await?;
                let style = match &product.style_id {
                    Some(style_id) => self.load_style(style_id).await?,
                    None => None,
                };
                (producer, region, style)
            }
            None => (None, None, None),
        };
        let country = match &region {
            Some(region) => self.load_country(&region.country_id).await?,
            None => None,
        };

        Ok(Some(SourceAggregate { variant, product, producer, region, country, style, unresolved }))
    }

    async fn list_published_variant_ids(&self) -> Result<Vec<VariantId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM variant WHERE status = ? ORDER BY id ASC")
            .bind(PublishStatus::Published.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("id").map(VariantId).map_err(Into::into))
            .collect()
    }

    async fn list_variant_ids_for_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Vec<VariantId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM variant WHERE product_id = ? ORDER BY id ASC")
            .bind(&product_id.0)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("id").map(VariantId).map_err(Into::into))
            .collect()
    }

    async fn list_curated_links(
        &self,
        subject: &VariantId,
    ) -> Result<Vec<CuratedLink>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT related_variant_id, facet, position
             FROM curated_relation
             WHERE subject_variant_id = ?
             ORDER BY position ASC, related_variant_id ASC",
        )
        .bind(&subject.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let facet_raw: String = row.try_get("facet")?;
                let facet = Facet::parse(&facet_raw).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown curated facet `{facet_raw}`"))
                })?;
                Ok(CuratedLink {
                    related_variant_id: VariantId(row.try_get("related_variant_id")?),
                    facet,
                    position: parse_u32("position", row.try_get("position")?)?,
                })
            })
            .collect()
    }
}

#[derive(Default)]
struct VariantTerms {
    grapes: Vec<GrapeShare>,
    aromas: Vec<CatalogTerm>,
    tags: Vec<CatalogTerm>,
    moods: Vec<CatalogTerm>,
    dishes: Vec<CatalogTerm>,
}

fn variant_from_row(row: &SqliteRow, terms: VariantTerms) -> Result<Variant, RepositoryError> {
    let price_raw: String = row.try_get("price")?;
    let price = Decimal::from_str(&price_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid price `{price_raw}`: {error}")))?;

    let backorder_raw: String = row.try_get("backorder")?;
    let backorder = BackorderPolicy::parse(&backorder_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown backorder policy `{backorder_raw}`"))
    })?;

    let vintage = row
        .try_get::<Option<i64>, _>("vintage")?
        .map(|value| {
            u16::try_from(value)
                .map_err(|_| RepositoryError::Decode(format!("invalid vintage: {value}")))
        })
        .transpose()?;

    let serving_temperature = match (
        row.try_get::<Option<i64>, _>("serving_temp_min")?,
        row.try_get::<Option<i64>, _>("serving_temp_max")?,
    ) {
        (Some(min), Some(max)) => Some(ServingTemperature {
            min_celsius: celsius("serving_temp_min", min)?,
            max_celsius: celsius("serving_temp_max", max)?,
        }),
        _ => None,
    };

    let tasting_notes = row
        .try_get::<Option<String>, _>("tasting_notes")?
        .filter(|value| !value.trim().is_empty())
        .map(|default| {
            let alternate = row.try_get::<Option<String>, _>("tasting_notes_alt")?;
            Ok::<_, RepositoryError>(Localized::text(default, alternate.as_deref()))
        })
        .transpose()?;

    Ok(Variant {
        id: VariantId(row.try_get("id")?),
        product_id: ProductId(row.try_get("product_id")?),
        sku: row.try_get("sku")?,
        size_ml: parse_u32("size_ml", row.try_get("size_ml")?)?,
        vintage,
        price,
        stock_on_hand: row.try_get("stock_on_hand")?,
        backorder,
        serving_temperature,
        decant: row.try_get::<i64, _>("decant")? != 0,
        tasting_notes,
        grapes: terms.grapes,
        aromas: terms.aromas,
        tags: terms.tags,
        moods: terms.moods,
        dishes: terms.dishes,
        primary_image_id: row.try_get("primary_image_id")?,
        publication: publication_from_row(row)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    let description = row
        .try_get::<Option<String>, _>("description")?
        .filter(|value| !value.trim().is_empty())
        .map(|default| {
            let alternate = row.try_get::<Option<String>, _>("description_alt")?;
            Ok::<_, RepositoryError>(Localized::text(default, alternate.as_deref()))
        })
        .transpose()?;

    Ok(Product {
        id: ProductId(row.try_get("id")?),
        slug: row.try_get("slug")?,
        title: localized_from_row(&row, "title", "title_alt")?,
        description,
        producer_id: ProducerId(row.try_get("producer_id")?),
        region_id: RegionId(row.try_get("region_id")?),
        style_id: row.try_get::<Option<String>, _>("style_id")?.map(StyleId),
        publication: publication_from_row(&row)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn publication_from_row(row: &SqliteRow) -> Result<Publication, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = PublishStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown publish status `{status_raw}`")))?;

    Ok(Publication {
        status,
        alternate_published: row.try_get::<i64, _>("alternate_published")? != 0,
    })
}

fn localized_from_row(
    row: &SqliteRow,
    default_column: &str,
    alternate_column: &str,
) -> Result<Localized<String>, RepositoryError> {
    let default: String = row.try_get(default_column)?;
    let alternate: Option<String> = row.try_get(alternate_column)?;
    Ok(Localized::text(default, alternate.as_deref()))
}

/// `None` when the LEFT JOIN found no catalog term for the link.
fn term_from_joined_row(
    row: &SqliteRow,
    term_id: &str,
) -> Result<Option<CatalogTerm>, RepositoryError> {
    let Some(title) = row.try_get::<Option<String>, _>("title")? else {
        return Ok(None);
    };
    let alternate: Option<String> = row.try_get("title_alt")?;

    Ok(Some(CatalogTerm {
        id: TermId(term_id.to_string()),
        title: Localized::text(title, alternate.as_deref()),
    }))
}

fn celsius(column: &str, value: i64) -> Result<u8, RepositoryError> {
    u8::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid temperature in `{column}`: {value}"))
    })
}
