use overburden_core::chrono::{DateTime, TimeZone, Utc};
use overburden_core::domain::reference::{Block, BlockId, Pit, PitId, Site, SiteId};
use overburden_core::domain::threshold::{Threshold, ThresholdId};
use overburden_core::rust_decimal::Decimal;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::DbError;

const SEED_SITES: &[(&str, &str, &str)] =
    &[("site-ktb", "Kutai Barat", "KTB"), ("site-brn", "Berau North", "BRN")];

const SEED_PITS: &[(&str, &str, &str, &str)] = &[
    ("pit-ktb-1", "site-ktb", "Pit Alpha", "PA"),
    ("pit-ktb-2", "site-ktb", "Pit Bravo", "PB"),
    ("pit-brn-1", "site-brn", "Pit Central", "PC"),
];

const SEED_BLOCKS: &[(&str, &str, &str, &str)] = &[
    ("blk-pa-01", "pit-ktb-1", "Alpha 01", "PA-01"),
    ("blk-pa-02", "pit-ktb-1", "Alpha 02", "PA-02"),
    ("blk-pa-03", "pit-ktb-1", "Alpha 03", "PA-03"),
    ("blk-pb-01", "pit-ktb-2", "Bravo 01", "PB-01"),
    ("blk-pb-02", "pit-ktb-2", "Bravo 02", "PB-02"),
    ("blk-pc-01", "pit-brn-1", "Central 01", "PC-01"),
];

const DEFAULT_THRESHOLD_ID: &str = "thr-default";

/// Deterministic reference data: two sites, three pits, six blocks and a 5%
/// default threshold.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Applies the seed. Safe to run repeatedly; an already active threshold is left alone.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, DbError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            sites: SEED_SITES.len(),
            pits: SEED_PITS.len(),
            blocks: SEED_BLOCKS.len(),
            threshold_id: DEFAULT_THRESHOLD_ID,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, DbError> {
        let mut checks = Vec::new();

        for (id, _, code) in SEED_SITES {
            let present: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM site WHERE id = ?1 AND code = ?2)")
                    .bind(*id)
                    .bind(*code)
                    .fetch_one(pool)
                    .await?;
            checks.push((*id, present == 1));
        }

        for (id, site_id, _, _) in SEED_PITS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM pit WHERE id = ?1 AND site_id = ?2)",
            )
            .bind(*id)
            .bind(*site_id)
            .fetch_one(pool)
            .await?;
            checks.push((*id, present == 1));
        }

        for (id, pit_id, _, _) in SEED_BLOCKS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM block WHERE id = ?1 AND pit_id = ?2)",
            )
            .bind(*id)
            .bind(*pit_id)
            .fetch_one(pool)
            .await?;
            checks.push((*id, present == 1));
        }

        let threshold_present: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM threshold WHERE id = ?1)")
                .bind(DEFAULT_THRESHOLD_ID)
                .fetch_one(pool)
                .await?;
        checks.push((DEFAULT_THRESHOLD_ID, threshold_present == 1));

        let active_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM threshold WHERE active = 1")
                .fetch_one(pool)
                .await?;
        checks.push(("single-active-threshold", active_count <= 1));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }

    pub fn sites() -> Vec<Site> {
        SEED_SITES
            .iter()
            .map(|(id, name, code)| Site {
                id: SiteId((*id).to_owned()),
                name: (*name).to_owned(),
                code: (*code).to_owned(),
            })
            .collect()
    }

    pub fn pits() -> Vec<Pit> {
        SEED_PITS
            .iter()
            .map(|(id, site_id, name, code)| Pit {
                id: PitId((*id).to_owned()),
                site_id: SiteId((*site_id).to_owned()),
                name: (*name).to_owned(),
                code: (*code).to_owned(),
            })
            .collect()
    }

    pub fn blocks() -> Vec<Block> {
        SEED_BLOCKS
            .iter()
            .map(|(id, pit_id, name, code)| Block {
                id: BlockId((*id).to_owned()),
                pit_id: PitId((*pit_id).to_owned()),
                name: (*name).to_owned(),
                code: (*code).to_owned(),
            })
            .collect()
    }

    /// The seeded threshold as the SQL file writes it on an empty registry.
    pub fn default_threshold() -> Threshold {
        let seeded_at: DateTime<Utc> =
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
        Threshold {
            id: ThresholdId(DEFAULT_THRESHOLD_ID.to_owned()),
            name: "Standard variance".to_owned(),
            limit_value: Decimal::new(5, 0),
            description: Some(
                "Default monthly tolerance between contractor and surveyor volumes".to_owned(),
            ),
            active: true,
            created_at: seeded_at,
            updated_at: seeded_at,
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub sites: usize,
    pub pits: usize,
    pub blocks: usize,
    pub threshold_id: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use overburden_core::domain::threshold::ThresholdId;
    use overburden_core::repository::{ReferenceDirectory, ThresholdRepository};

    use super::DemoDataset;
    use crate::repositories::{SqlReferenceDirectory, SqlThresholdRepository};
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoDataset::SQL.is_empty());
        for block in DemoDataset::blocks() {
            assert!(DemoDataset::SQL.contains(&block.id.0), "{} missing from SQL", block.id);
        }
    }

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoDataset::load(&pool).await.expect("load seed");
        let first_verification = DemoDataset::verify(&pool).await.expect("verify seed");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.blocks, 6);

        DemoDataset::load(&pool).await.expect("reload seed");
        let second_verification = DemoDataset::verify(&pool).await.expect("re-verify seed");
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn seeded_rows_match_rust_constants() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoDataset::load(&pool).await.expect("load seed");

        let directory = SqlReferenceDirectory::new(pool.clone());
        for site in DemoDataset::sites() {
            assert_eq!(directory.find_site(&site.id).await.expect("find site"), Some(site));
        }
        for block in DemoDataset::blocks() {
            assert_eq!(directory.find_block(&block.id).await.expect("find block"), Some(block));
        }

        let thresholds = SqlThresholdRepository::new(pool.clone());
        let seeded = thresholds
            .find(&ThresholdId("thr-default".to_owned()))
            .await
            .expect("find threshold")
            .expect("seeded threshold");
        assert_eq!(seeded, DemoDataset::default_threshold());
    }
}
