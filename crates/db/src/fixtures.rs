use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic contract for the demo catalog: what `load` seeds and what
/// `verify` checks for.
const DEMO_VARIANTS: &[DemoVariant] = &[
    DemoVariant {
        id: "V-MOVIA-REBULA-2021",
        product_id: "P-MOVIA-REBULA",
        price: "25.00",
        description: "Movia Rebula 2021, the curated subject",
    },
    DemoVariant {
        id: "V-MOVIA-REBULA-2019-MAG",
        product_id: "P-MOVIA-REBULA",
        price: "55.00",
        description: "Magnum sharing the Movia Rebula product title",
    },
    DemoVariant {
        id: "V-MOVIA-PINOT-2018",
        product_id: "P-MOVIA-PINOT",
        price: "60.00",
        description: "Same producer, different region",
    },
    DemoVariant {
        id: "V-SIMCIC-REBULA-2020",
        product_id: "P-SIMCIC-REBULA",
        price: "32.50",
        description: "Alternate-locale copy not yet released",
    },
    DemoVariant {
        id: "V-BURJA-ZELEN-2022",
        product_id: "P-BURJA-ZELEN",
        price: "19.90",
        description: "Vipava white inside the Movia price band",
    },
    DemoVariant {
        id: "V-PTUJ-SIPON-2022",
        product_id: "P-PTUJ-SIPON",
        price: "12.00",
        description: "Unrelated on every facet to the Movia Rebula",
    },
    DemoVariant {
        id: "V-GRAVNER-RIBOLLA-2015",
        product_id: "P-GRAVNER-RIBOLLA",
        price: "85.00",
        description: "Curated grape-variety pick for the Movia Rebula",
    },
    DemoVariant {
        id: "V-BURJA-NOIR-2021",
        product_id: "P-BURJA-NOIR",
        price: "29.00",
        description: "Published variant under a draft product",
    },
];

const DEMO_PRODUCT_IDS: &[&str] = &[
    "P-MOVIA-REBULA",
    "P-MOVIA-PINOT",
    "P-SIMCIC-REBULA",
    "P-BURJA-ZELEN",
    "P-PTUJ-SIPON",
    "P-GRAVNER-RIBOLLA",
    "P-BURJA-NOIR",
];

const DEMO_DRAFT_PRODUCT_IDS: &[&str] = &["P-BURJA-NOIR"];

const DEMO_PRODUCER_IDS: &[&str] = &["movia", "edi-simcic", "burja", "ptujska-klet", "gravner"];

const DEMO_REGION_IDS: &[&str] = &["brda", "vipava", "stajerska", "collio"];

const DEMO_COUNTRY_IDS: &[&str] = &["si", "it"];

const DEMO_STYLE_IDS: &[&str] = &["white", "orange", "red"];

const DEMO_CURATED_LINKS: &[(&str, &str)] =
    &[("V-MOVIA-REBULA-2021", "V-GRAVNER-RIBOLLA-2015")];

/// Small two-country wine catalog for local development and tests.
pub struct DemoCatalog;

impl DemoCatalog {
    /// SQL fixture content for the demo catalog.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    /// Loads the demo catalog. Rows are replaced, so loading twice is safe.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let variants_seeded = DEMO_VARIANTS
            .iter()
            .map(|variant| VariantSeedInfo {
                variant_id: variant.id,
                product_id: variant.product_id,
                description: variant.description,
            })
            .collect();

        Ok(SeedResult { variants_seeded, products_seeded: DEMO_PRODUCT_IDS.len() })
    }

    /// Checks that every demo row exists with the values the contract names.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for variant in DEMO_VARIANTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM variant WHERE id = ?1 AND product_id = ?2 AND price = ?3 AND status = 'published')",
            )
            .bind(variant.id)
            .bind(variant.product_id)
            .bind(variant.price)
            .fetch_one(pool)
            .await?;
            checks.push((variant.id, present == 1));
        }

        let products = count_in(pool, "product", DEMO_PRODUCT_IDS).await?;
        checks.push(("products", products == DEMO_PRODUCT_IDS.len() as i64));

        for product_id in DEMO_DRAFT_PRODUCT_IDS {
            let draft: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM product WHERE id = ?1 AND status = 'draft')",
            )
            .bind(product_id)
            .fetch_one(pool)
            .await?;
            checks.push((product_id, draft == 1));
        }

        let producers = count_in(pool, "producer", DEMO_PRODUCER_IDS).await?;
        checks.push(("producers", producers == DEMO_PRODUCER_IDS.len() as i64));

        let regions = count_in(pool, "region", DEMO_REGION_IDS).await?;
        checks.push(("regions", regions == DEMO_REGION_IDS.len() as i64));

        for (subject, related) in DEMO_CURATED_LINKS {
            let linked: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM curated_relation WHERE subject_variant_id = ?1 AND related_variant_id = ?2)",
            )
            .bind(subject)
            .bind(related)
            .fetch_one(pool)
            .await?;
            checks.push(("curated-links", linked == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes every demo row, leaving other catalog data alone.
    pub async fn clean(pool: &DbPool) -> Result<u64, RepositoryError> {
        let variant_ids = sql_array_from_ids(
            &DEMO_VARIANTS.iter().map(|variant| variant.id).collect::<Vec<_>>(),
        );
        let product_ids = sql_array_from_ids(DEMO_PRODUCT_IDS);
        let producer_ids = sql_array_from_ids(DEMO_PRODUCER_IDS);
        let region_ids = sql_array_from_ids(DEMO_REGION_IDS);
        let country_ids = sql_array_from_ids(DEMO_COUNTRY_IDS);
        let style_ids = sql_array_from_ids(DEMO_STYLE_IDS);

        let statements = [
            format!("DELETE FROM curated_relation WHERE subject_variant_id IN {variant_ids}"),
            format!("DELETE FROM variant_term WHERE variant_id IN {variant_ids}"),
            format!("DELETE FROM variant_grape WHERE variant_id IN {variant_ids}"),
            format!("DELETE FROM variant WHERE id IN {variant_ids}"),
            format!("DELETE FROM product WHERE id IN {product_ids}"),
            format!("DELETE FROM producer_relation WHERE producer_id IN {producer_ids}"),
            format!("DELETE FROM producer WHERE id IN {producer_ids}"),
            format!("DELETE FROM region_neighbour WHERE region_id IN {region_ids}"),
            format!("DELETE FROM region_climate WHERE region_id IN {region_ids}"),
            format!("DELETE FROM region WHERE id IN {region_ids}"),
            format!("DELETE FROM country WHERE id IN {country_ids}"),
            format!("DELETE FROM style WHERE id IN {style_ids}"),
            "DELETE FROM catalog_term WHERE id LIKE 'grape-%' OR id LIKE 'aroma-%' OR id LIKE 'tag-%' OR id LIKE 'mood-%' OR id LIKE 'dish-%' OR id LIKE 'climate-%'".to_string(),
        ];

        let mut tx = pool.begin().await?;
        let mut removed = 0;
        for statement in &statements {
            removed += tx.execute(sqlx::query(statement)).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }
}

struct DemoVariant {
    id: &'static str,
    product_id: &'static str,
    price: &'static str,
    description: &'static str,
}

async fn count_in(pool: &DbPool, table: &str, ids: &[&str]) -> Result<i64, RepositoryError> {
    let quoted = sql_array_from_ids(ids);
    let count = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table} WHERE id IN {quoted}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub variants_seeded: Vec<VariantSeedInfo>,
    pub products_seeded: usize,
}

#[derive(Debug)]
pub struct VariantSeedInfo {
    pub variant_id: &'static str,
    pub product_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoCatalog::SQL.is_empty());
        for variant in DEMO_VARIANTS {
            assert!(DemoCatalog::SQL.contains(variant.id), "fixture is missing {}", variant.id);
        }
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoCatalog::load(&pool).await.expect("load demo catalog");
        let first_verification = DemoCatalog::verify(&pool).await.expect("verify demo catalog");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.variants_seeded.len(), 8);
        assert_eq!(first.products_seeded, 7);

        DemoCatalog::load(&pool).await.expect("reload demo catalog");
        let second_verification = DemoCatalog::verify(&pool).await.expect("re-verify");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);

        let variant_rows: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM variant")
            .fetch_one(&pool)
            .await
            .expect("count variants");
        assert_eq!(variant_rows, 8);
    }

    #[tokio::test]
    async fn clean_removes_demo_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        DemoCatalog::load(&pool).await.expect("load demo catalog");
        let removed = DemoCatalog::clean(&pool).await.expect("clean demo catalog");
        assert!(removed > 0);

        let verification = DemoCatalog::verify(&pool).await.expect("verify after clean");
        assert!(!verification.all_present);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM variant")
            .fetch_one(&pool)
            .await
            .expect("count variants");
        assert_eq!(remaining, 0);
    }
}
