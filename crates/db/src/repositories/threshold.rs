use overburden_core::chrono::{DateTime, Utc};
use overburden_core::domain::threshold::{Threshold, ThresholdId};
use overburden_core::repository::{RepositoryError, ThresholdRepository};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{parse_decimal, parse_timestamp, DbError};
use crate::DbPool;

const THRESHOLD_COLUMNS: &str = "SELECT
        id,
        name,
        limit_value,
        description,
        active,
        created_at,
        updated_at
     FROM threshold";

pub struct SqlThresholdRepository {
    pool: DbPool,
}

impl SqlThresholdRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn list_inner(&self) -> Result<Vec<Threshold>, DbError> {
        let rows = sqlx::query(&format!("{THRESHOLD_COLUMNS} ORDER BY created_at ASC, rowid ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(threshold_from_row).collect()
    }

    async fn find_inner(&self, id: &ThresholdId) -> Result<Option<Threshold>, DbError> {
        let row = sqlx::query(&format!("{THRESHOLD_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(threshold_from_row).transpose()
    }

    async fn insert_inner(&self, threshold: Threshold) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        if threshold.active {
            deactivate_others(&mut tx, &threshold.id, threshold.updated_at).await?;
        }

        sqlx::query(
            "INSERT INTO threshold (
                id, name, limit_value, description, active, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&threshold.id.0)
        .bind(&threshold.name)
        .bind(threshold.limit_value.to_string())
        .bind(threshold.description.as_deref())
        .bind(threshold.active)
        .bind(threshold.created_at.to_rfc3339())
        .bind(threshold.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_inner(
        &self,
        threshold: Threshold,
        activation: Option<bool>,
    ) -> Result<Threshold, DbError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE threshold SET name = ?, limit_value = ?, description = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&threshold.name)
        .bind(threshold.limit_value.to_string())
        .bind(threshold.description.as_deref())
        .bind(threshold.updated_at.to_rfc3339())
        .bind(&threshold.id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("threshold", threshold.id.0).into());
        }

        if let Some(active) = activation {
            if active {
                deactivate_others(&mut tx, &threshold.id, threshold.updated_at).await?;
            }
            sqlx::query("UPDATE threshold SET active = ? WHERE id = ?")
                .bind(active)
                .bind(&threshold.id.0)
                .execute(&mut *tx)
                .await?;
        }

        let row = sqlx::query(&format!("{THRESHOLD_COLUMNS} WHERE id = ?"))
            .bind(&threshold.id.0)
            .fetch_one(&mut *tx)
            .await?;
        let stored = threshold_from_row(&row)?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn set_active_inner(
        &self,
        id: &ThresholdId,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Threshold, DbError> {
        let mut tx = self.pool.begin().await?;
        if active {
            deactivate_others(&mut tx, id, updated_at).await?;
        }

        let result = sqlx::query("UPDATE threshold SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(updated_at.to_rfc3339())
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("threshold", id.0.clone()).into());
        }

        let row = sqlx::query(&format!("{THRESHOLD_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_one(&mut *tx)
            .await?;
        let threshold = threshold_from_row(&row)?;

        tx.commit().await?;
        Ok(threshold)
    }
}

#[async_trait::async_trait]
impl ThresholdRepository for SqlThresholdRepository {
    async fn list(&self) -> Result<Vec<Threshold>, RepositoryError> {
        Ok(self.list_inner().await?)
    }

    async fn find(&self, id: &ThresholdId) -> Result<Option<Threshold>, RepositoryError> {
        Ok(self.find_inner(id).await?)
    }

    async fn insert(&self, threshold: Threshold) -> Result<(), RepositoryError> {
        Ok(self.insert_inner(threshold).await?)
    }

    async fn update(
        &self,
        threshold: Threshold,
        activation: Option<bool>,
    ) -> Result<Threshold, RepositoryError> {
        Ok(self.update_inner(threshold, activation).await?)
    }

    async fn set_active(
        &self,
        id: &ThresholdId,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<Threshold, RepositoryError> {
        Ok(self.set_active_inner(id, active, updated_at).await?)
    }

    async fn get_active(&self) -> Result<Option<Threshold>, RepositoryError> {
        let row = sqlx::query(&format!("{THRESHOLD_COLUMNS} WHERE active = 1"))
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.as_ref().map(threshold_from_row).transpose()?)
    }

    async fn delete(&self, id: &ThresholdId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM threshold WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("threshold", id.0.clone()));
        }
        Ok(())
    }
}

async fn deactivate_others(
    conn: &mut SqliteConnection,
    keep: &ThresholdId,
    updated_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE threshold SET active = 0, updated_at = ? WHERE active = 1 AND id <> ?")
        .bind(updated_at.to_rfc3339())
        .bind(&keep.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn threshold_from_row(row: &SqliteRow) -> Result<Threshold, DbError> {
    Ok(Threshold {
        id: ThresholdId(row.try_get("id")?),
        name: row.try_get("name")?,
        limit_value: parse_decimal("limit_value", row.try_get("limit_value")?)?,
        description: row.try_get("description")?,
        active: row.try_get::<i64, _>("active")? == 1,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use overburden_core::chrono::Utc;
    use overburden_core::domain::threshold::{Threshold, ThresholdId, ThresholdInput};
    use overburden_core::repository::{RepositoryError, ThresholdRepository};
    use overburden_core::rust_decimal::Decimal;

    use super::SqlThresholdRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn threshold(name: &str, limit: i64, active: bool) -> Threshold {
        Threshold::create(
            ThresholdInput {
                name: name.to_owned(),
                limit_value: Decimal::new(limit, 1),
                description: None,
                active,
            },
            Utc::now(),
        )
        .expect("valid threshold")
    }

    #[tokio::test]
    async fn inserting_an_active_threshold_deactivates_the_previous_one() {
        let pool = setup_pool().await;
        let repo = SqlThresholdRepository::new(pool.clone());
        let standard = threshold("Standard", 50, true);
        let strict = threshold("Strict", 25, true);

        repo.insert(standard.clone()).await.expect("insert standard");
        repo.insert(strict.clone()).await.expect("insert strict");

        let active = repo.get_active().await.expect("active").expect("one active");
        assert_eq!(active.id, strict.id);
        assert_eq!(active.limit_value, Decimal::new(25, 1));

        let standard_now = repo.find(&standard.id).await.expect("find").expect("present");
        assert!(!standard_now.active);

        pool.close().await;
    }

    #[tokio::test]
    async fn set_active_swaps_and_deactivation_leaves_none() {
        let pool = setup_pool().await;
        let repo = SqlThresholdRepository::new(pool.clone());
        let standard = threshold("Standard", 50, true);
        let loose = threshold("Loose", 100, false);
        repo.insert(standard.clone()).await.expect("insert");
        repo.insert(loose.clone()).await.expect("insert");

        let activated = repo.set_active(&loose.id, true, Utc::now()).await.expect("activate");
        assert!(activated.active);
        assert_eq!(repo.list().await.expect("list").iter().filter(|t| t.active).count(), 1);

        repo.set_active(&loose.id, false, Utc::now()).await.expect("deactivate");
        assert_eq!(repo.get_active().await.expect("active"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn field_update_keeps_the_stored_activation() {
        let pool = setup_pool().await;
        let repo = SqlThresholdRepository::new(pool.clone());
        let standard = threshold("Standard", 50, true);
        let strict = threshold("Strict", 25, false);
        repo.insert(standard.clone()).await.expect("insert");
        repo.insert(strict.clone()).await.expect("insert");

        // `standard` was read while active; strict is activated before the rename lands.
        repo.set_active(&strict.id, true, Utc::now()).await.expect("activate strict");
        let mut renamed = standard.clone();
        renamed.name = "Standard (renamed)".to_owned();
        let stored = repo.update(renamed, None).await.expect("rename");

        assert_eq!(stored.name, "Standard (renamed)");
        assert!(!stored.active);
        let active = repo.get_active().await.expect("active").expect("one active");
        assert_eq!(active.id, strict.id);

        let reactivated = repo.update(stored, Some(true)).await.expect("reactivate");
        assert!(reactivated.active);
        assert!(!repo.find(&strict.id).await.expect("find").expect("present").active);

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_threshold_is_not_found() {
        let pool = setup_pool().await;
        let repo = SqlThresholdRepository::new(pool.clone());
        let missing = ThresholdId("thr-missing".to_owned());

        let error = repo.set_active(&missing, true, Utc::now()).await.expect_err("missing");
        assert!(matches!(error, RepositoryError::NotFound { .. }));
        assert!(matches!(
            repo.update(threshold("Ghost", 10, false), None).await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(matches!(repo.delete(&missing).await, Err(RepositoryError::NotFound { .. })));

        pool.close().await;
    }
}
