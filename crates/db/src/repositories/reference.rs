use overburden_core::domain::reference::{Block, BlockId, Pit, PitId, Site, SiteId};
use overburden_core::repository::{ReferenceDirectory, RepositoryError};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::DbError;
use crate::DbPool;

/// Site, pit and block lookups over the reference tables. Rows are maintained
/// by the seed tooling; the workflow never writes them.
pub struct SqlReferenceDirectory {
    pool: DbPool,
}

impl SqlReferenceDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReferenceDirectory for SqlReferenceDirectory {
    async fn find_site(&self, id: &SiteId) -> Result<Option<Site>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, code FROM site WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.as_ref().map(site_from_row).transpose()?)
    }

    async fn find_pit(&self, id: &PitId) -> Result<Option<Pit>, RepositoryError> {
        let row = sqlx::query("SELECT id, site_id, name, code FROM pit WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.as_ref().map(pit_from_row).transpose()?)
    }

    async fn find_block(&self, id: &BlockId) -> Result<Option<Block>, RepositoryError> {
        let row = sqlx::query("SELECT id, pit_id, name, code FROM block WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.as_ref().map(block_from_row).transpose()?)
    }

    async fn list_pits(&self, site_id: &SiteId) -> Result<Vec<Pit>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, site_id, name, code FROM pit WHERE site_id = ? ORDER BY code")
                .bind(&site_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(rows.iter().map(pit_from_row).collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn list_blocks(&self, pit_id: &PitId) -> Result<Vec<Block>, RepositoryError> {
        let rows =
            sqlx::query("SELECT id, pit_id, name, code FROM block WHERE pit_id = ? ORDER BY code")
                .bind(&pit_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(rows.iter().map(block_from_row).collect::<Result<Vec<_>, DbError>>()?)
    }
}

fn site_from_row(row: &SqliteRow) -> Result<Site, DbError> {
    Ok(Site { id: SiteId(row.try_get("id")?), name: row.try_get("name")?, code: row.try_get("code")? })
}

fn pit_from_row(row: &SqliteRow) -> Result<Pit, DbError> {
    Ok(Pit {
        id: PitId(row.try_get("id")?),
        site_id: SiteId(row.try_get("site_id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
    })
}

fn block_from_row(row: &SqliteRow) -> Result<Block, DbError> {
    Ok(Block {
        id: BlockId(row.try_get("id")?),
        pit_id: PitId(row.try_get("pit_id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
    })
}
