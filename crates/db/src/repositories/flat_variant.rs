use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use vinoteka_core::domain::catalog::VariantId;
use vinoteka_core::domain::flat::FlatVariant;
use vinoteka_core::ranking::{Candidate, FacetQuery, FacetRequest, PriceBand};

use super::{
    format_timestamp, parse_count, parse_timestamp, FlatVariantCounts, FlatVariantRepository,
    RepositoryError,
};
use crate::DbPool;

// Widens the REAL pre-filter so float rounding never drops a boundary price;
// the exact check runs on Decimal afterwards.
const PRICE_FILTER_SLACK: f64 = 0.01;

pub struct SqlFlatVariantRepository {
    pool: DbPool,
}

impl SqlFlatVariantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn same_column_candidates(
        &self,
        column: &str,
        value: &str,
        request: &FacetRequest,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT source_variant_id, title, source_created_at FROM flat_variant WHERE is_published = 1 AND ",
        );
        query.push(column).push(" = ").push_bind(value.to_string());
        push_exclusions(&mut query, request, "");
        query.push(" ORDER BY source_created_at DESC, source_variant_id ASC LIMIT ");
        query.push_bind(limit_value(request.limit));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(candidate_from_row).collect()
    }

    async fn shared_grape_candidates(
        &self,
        grapes: &[String],
        request: &FacetRequest,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        if grapes.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT fv.source_variant_id, fv.title, fv.source_created_at
             FROM flat_variant fv
             JOIN flat_variant_grape g ON g.source_variant_id = fv.source_variant_id
             WHERE fv.is_published = 1 AND g.grape_title IN (",
        );
        let mut separated = query.separated(", ");
        for grape in grapes {
            separated.push_bind(grape.clone());
        }
        separated.push_unseparated(")");
        push_exclusions(&mut query, request, "fv.");
        query.push(" ORDER BY fv.source_created_at DESC, fv.source_variant_id ASC LIMIT ");
        query.push_bind(limit_value(request.limit));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(candidate_from_row).collect()
    }

    async fn price_band_candidates(
        &self,
        band: &PriceBand,
        request: &FacetRequest,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        let min = band.min.to_f64().unwrap_or(f64::MIN) - PRICE_FILTER_SLACK;
        let max = band.max.to_f64().unwrap_or(f64::MAX) + PRICE_FILTER_SLACK;

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT source_variant_id, title, source_created_at, price FROM flat_variant WHERE is_published = 1 AND price_value BETWEEN ",
        );
        query.push_bind(min).push(" AND ").push_bind(max);
        push_exclusions(&mut query, request, "");
        query.push(" ORDER BY source_created_at DESC, source_variant_id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut candidates = Vec::new();
        for row in rows {
            let price_raw: String = row.try_get("price")?;
            if band.contains(parse_price(&price_raw)?) {
                candidates.push(candidate_from_row(row)?);
            }
            if candidates.len() >= request.limit {
                break;
            }
        }

        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl FlatVariantRepository for SqlFlatVariantRepository {
    async fn find_by_source_id(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<FlatVariant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT document_json
             FROM flat_variant
             WHERE source_variant_id = ?",
        )
        .bind(&variant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(flat_variant_from_row).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<FlatVariant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT document_json
             FROM flat_variant
             WHERE slug = ?
             ORDER BY is_published DESC, synced_at DESC
             LIMIT 1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(flat_variant_from_row).transpose()
    }

    async fn save(&self, record: FlatVariant) -> Result<(), RepositoryError> {
        let document_json = encode_document(&record)?;
        let price_value = record.price.to_f64().ok_or_else(|| {
            RepositoryError::Decode(format!("price `{}` does not fit a REAL column", record.price))
        })?;
        let grape_titles = record.grape_titles();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO flat_variant (
                id,
                source_variant_id,
                product_id,
                slug,
                title,
                producer_id,
                region_id,
                price,
                price_value,
                is_published,
                source_created_at,
                synced_at,
                fingerprint,
                document_json
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(source_variant_id) DO UPDATE SET
                id = excluded.id,
                product_id = excluded.product_id,
                slug = excluded.slug,
                title = excluded.title,
                producer_id = excluded.producer_id,
                region_id = excluded.region_id,
                price = excluded.price,
                price_value = excluded.price_value,
                is_published = excluded.is_published,
                source_created_at = excluded.source_created_at,
                synced_at = excluded.synced_at,
                fingerprint = excluded.fingerprint,
                document_json = excluded.document_json",
        )
        .bind(&record.id.0)
        .bind(&record.source_variant_id.0)
        .bind(&record.product_id.0)
        .bind(&record.slug)
        .bind(&record.title)
        .bind(&record.producer_id.0)
        .bind(&record.region_id.0)
        .bind(record.price.to_string())
        .bind(price_value)
        .bind(record.is_published)
        .bind(format_timestamp(record.source_created_at))
        .bind(format_timestamp(record.synced_at))
        .bind(record.fingerprint())
        .bind(document_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM flat_variant_grape WHERE source_variant_id = ?")
            .bind(&record.source_variant_id.0)
            .execute(&mut *tx)
            .await?;

        for grape_title in grape_titles {
            sqlx::query(
                "INSERT OR IGNORE INTO flat_variant_grape (source_variant_id, grape_title)
                 VALUES (?, ?)",
            )
            .bind(&record.source_variant_id.0)
            .bind(grape_title)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn retire(
        &self,
        variant_id: &VariantId,
        synced_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT document_json FROM flat_variant WHERE source_variant_id = ?")
            .bind(&variant_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };

        let mut record = flat_variant_from_row(row)?;
        record.is_published = false;
        record.synced_at = synced_at;

        sqlx::query(
            "UPDATE flat_variant
             SET is_published = 0, synced_at = ?, fingerprint = ?, document_json = ?
             WHERE source_variant_id = ?",
        )
        .bind(format_timestamp(synced_at))
        .bind(record.fingerprint())
        .bind(encode_document(&record)?)
        .bind(&variant_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_published_source_ids(&self) -> Result<Vec<VariantId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT source_variant_id FROM flat_variant
             WHERE is_published = 1
             ORDER BY source_variant_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("source_variant_id").map(VariantId).map_err(Into::into)
            })
            .collect()
    }

    async fn find_candidates(
        &self,
        request: &FacetRequest,
    ) -> Result<Vec<Candidate>, RepositoryError> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        match &request.query {
            FacetQuery::SameProducer(producer_id) => {
                self.same_column_candidates("producer_id", &producer_id.0, request).await
            }
            FacetQuery::SameRegion(region_id) => {
                self.same_column_candidates("region_id", &region_id.0, request).await
            }
            FacetQuery::SharedGrapes(grapes) => self.shared_grape_candidates(grapes, request).await,
            FacetQuery::PriceBand(band) => self.price_band_candidates(band, request).await,
        }
    }

    async fn find_published_candidates(
        &self,
        ids: &[VariantId],
    ) -> Result<Vec<Candidate>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT source_variant_id, title, source_created_at FROM flat_variant WHERE is_published = 1 AND source_variant_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.0.clone());
        }
        separated.push_unseparated(") ORDER BY source_variant_id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(candidate_from_row).collect()
    }

    async fn counts(&self) -> Result<FlatVariantCounts, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(is_published), 0) AS published
             FROM flat_variant",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(FlatVariantCounts {
            total: parse_count("total", row.try_get("total")?)?,
            published: parse_count("published", row.try_get("published")?)?,
        })
    }

    async fn list_source_ids(&self) -> Result<Vec<VariantId>, RepositoryError> {
        let rows =
            sqlx::query("SELECT source_variant_id FROM flat_variant ORDER BY source_variant_id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("source_variant_id").map(VariantId).map_err(Into::into)
            })
            .collect()
    }
}

fn push_exclusions(query: &mut QueryBuilder<'_, Sqlite>, request: &FacetRequest, prefix: &str) {
    query.push(format!(" AND {prefix}source_variant_id <> "));
    query.push_bind(request.exclude_variant.0.clone());
    query.push(format!(" AND {prefix}title <> "));
    query.push_bind(request.exclude_title.clone());
}

fn limit_value(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn flat_variant_from_row(row: SqliteRow) -> Result<FlatVariant, RepositoryError> {
    let document_json: String = row.try_get("document_json")?;
    serde_json::from_str(&document_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid flat variant document: {error}"))
    })
}

fn encode_document(record: &FlatVariant) -> Result<String, RepositoryError> {
    serde_json::to_string(record).map_err(|error| {
        RepositoryError::Decode(format!("could not encode flat variant: {error}"))
    })
}

fn candidate_from_row(row: SqliteRow) -> Result<Candidate, RepositoryError> {
    Ok(Candidate {
        variant_id: VariantId(row.try_get("source_variant_id")?),
        title: row.try_get("title")?,
        source_created_at: parse_timestamp("source_created_at", row.try_get("source_created_at")?)?,
    })
}

fn parse_price(value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid price `{value}`: {error}")))
}
