use sqlx::{sqlite::SqliteRow, Row};

use vinoteka_core::domain::catalog::VariantId;
use vinoteka_core::domain::related::{RelatedItem, RelatedVariant};

use super::{
    format_timestamp, parse_count, parse_timestamp, parse_u32, RelatedVariantRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlRelatedVariantRepository {
    pool: DbPool,
}

impl SqlRelatedVariantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RelatedVariantRepository for SqlRelatedVariantRepository {
    async fn find(
        &self,
        variant_id: &VariantId,
    ) -> Result<Option<RelatedVariant>, RepositoryError> {
        let row = sqlx::query(
            "SELECT variant_id, related_count, last_computed, computation_version, related_items_json
             FROM related_variant
             WHERE variant_id = ?",
        )
        .bind(&variant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(related_variant_from_row).transpose()
    }

    async fn save(&self, record: RelatedVariant) -> Result<(), RepositoryError> {
        let items_json = serde_json::to_string(&record.related_items).map_err(|error| {
            RepositoryError::Decode(format!("could not encode related items: {error}"))
        })?;

        sqlx::query(
            "INSERT INTO related_variant (
                variant_id,
                related_count,
                last_computed,
                computation_version,
                related_items_json
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(variant_id) DO UPDATE SET
                related_count = excluded.related_count,
                last_computed = excluded.last_computed,
                computation_version = excluded.computation_version,
                related_items_json = excluded.related_items_json",
        )
        .bind(&record.variant_id.0)
        .bind(i64::from(record.related_count))
        .bind(format_timestamp(record.last_computed))
        .bind(i64::from(record.computation_version))
        .bind(items_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM related_variant").fetch_one(&self.pool).await?;
        parse_count("related_variant", count)
    }

    async fn count_outdated(&self, computation_version: u32) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM related_variant WHERE computation_version <> ?",
        )
        .bind(i64::from(computation_version))
        .fetch_one(&self.pool)
        .await?;
        parse_count("computation_version", count)
    }
}

fn related_variant_from_row(row: SqliteRow) -> Result<RelatedVariant, RepositoryError> {
    let items_json: String = row.try_get("related_items_json")?;
    let related_items: Vec<RelatedItem> = serde_json::from_str(&items_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid related_items_json: {error}"))
    })?;

    Ok(RelatedVariant {
        variant_id: VariantId(row.try_get("variant_id")?),
        related_count: parse_u32("related_count", row.try_get("related_count")?)?,
        last_computed: parse_timestamp("last_computed", row.try_get("last_computed")?)?,
        computation_version: parse_u32(
            "computation_version",
            row.try_get("computation_version")?,
        )?,
        related_items,
    })
}

#[cfg(test)]
mod tests {
    use vinoteka_core::domain::catalog::VariantId;
    use vinoteka_core::domain::related::{Facet, RelatedItem, RelatedVariant, RelationOrigin};

    use super::SqlRelatedVariantRepository;
    use crate::repositories::RelatedVariantRepository;
    use crate::test_support::parse_ts;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn item(id: &str, facet: Facet, score: f64) -> RelatedItem {
        RelatedItem {
            facet,
            origin: RelationOrigin::Computed,
            score,
            reason: facet.reason().to_string(),
            related_variant_id: VariantId(id.to_string()),
        }
    }

    fn record(items: Vec<RelatedItem>, version: u32) -> RelatedVariant {
        RelatedVariant {
            variant_id: VariantId("X".to_string()),
            related_count: items.len() as u32,
            last_computed: parse_ts("2026-01-01T12:00:00Z"),
            computation_version: version,
            related_items: items,
        }
    }

    #[tokio::test]
    async fn save_replaces_the_whole_set() {
        let pool = setup_pool().await;
        let repo = SqlRelatedVariantRepository::new(pool.clone());

        repo.save(record(
            vec![item("Y", Facet::Producer, 0.8), item("W", Facet::Region, 0.6)],
            1,
        ))
        .await
        .expect("first save");

        let second = record(vec![item("Z", Facet::GrapeVariety, 0.7)], 2);
        repo.save(second.clone()).await.expect("second save");

        let stored = repo.find(&VariantId("X".to_string())).await.expect("find");
        assert_eq!(stored, Some(second));
        assert_eq!(repo.count().await.expect("count"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_subject_is_none_and_outdated_counts_versions() {
        let pool = setup_pool().await;
        let repo = SqlRelatedVariantRepository::new(pool.clone());

        assert_eq!(repo.find(&VariantId("nope".to_string())).await.expect("find"), None);

        repo.save(record(Vec::new(), 1)).await.expect("save");
        assert_eq!(repo.count_outdated(1).await.expect("outdated"), 0);
        assert_eq!(repo.count_outdated(2).await.expect("outdated"), 1);

        pool.close().await;
    }
}
