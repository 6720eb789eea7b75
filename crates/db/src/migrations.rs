use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const SOURCE_TABLES: &[&str] = &[
        "country",
        "region",
        "catalog_term",
        "region_climate",
        "region_neighbour",
        "producer",
        "producer_relation",
        "style",
        "product",
        "variant",
        "variant_grape",
        "variant_term",
        "curated_relation",
    ];

    const PIPELINE_TABLES: &[&str] =
        &["flat_variant", "flat_variant_grape", "related_variant", "sync_task"];

    const MANAGED_INDEXES: &[&str] = &[
        "idx_region_country_id",
        "idx_product_producer_id",
        "idx_variant_product_id",
        "idx_variant_status",
        "idx_variant_term_variant_id",
        "idx_curated_relation_subject",
        "idx_flat_variant_slug",
        "idx_flat_variant_producer",
        "idx_flat_variant_region",
        "idx_flat_variant_price_value",
        "idx_flat_variant_grape_title",
        "idx_related_variant_version",
        "idx_sync_task_state_available_at",
        "idx_sync_task_kind_state",
        "idx_sync_task_input_id",
    ];

    fn managed_schema_objects() -> Vec<&'static str> {
        SOURCE_TABLES.iter().chain(PIPELINE_TABLES).chain(MANAGED_INDEXES).copied().collect()
    }

    async fn table_exists(pool: &sqlx::SqlitePool, name: &str) -> bool {
        sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .expect("check table")
            .get::<i64, _>("count")
            == 1
    }

    #[tokio::test]
    async fn migrations_create_source_and_pipeline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in SOURCE_TABLES.iter().chain(PIPELINE_TABLES) {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert!(!table_exists(&pool, "flat_variant").await);
        assert!(!table_exists(&pool, "sync_task").await);
        assert!(!table_exists(&pool, "variant").await);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            managed_schema_objects().len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let managed = managed_schema_objects();
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if managed.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
