use std::str::FromStr;
use std::sync::Arc;

use overburden_core::chrono::{DateTime, NaiveDate, Utc};
use overburden_core::rust_decimal::Decimal;
use overburden_core::{RepositoryError, WorkflowRepositories};
use thiserror::Error;

pub mod claim;
pub mod memory;
pub mod reference;
pub mod signature;
pub mod threshold;

pub use claim::SqlClaimRepository;
pub use memory::{
    InMemoryClaimRepository, InMemoryReferenceDirectory, InMemorySignatureRepository,
    InMemoryThresholdRepository,
};
pub use reference::SqlReferenceDirectory;
pub use signature::SqlSignatureRepository;
pub use threshold::SqlThresholdRepository;

use crate::fixtures::DemoDataset;
use crate::DbPool;

/// Every port backed by the same SQLite pool.
pub fn sql_repositories(pool: DbPool) -> WorkflowRepositories {
    WorkflowRepositories {
        claims: Arc::new(SqlClaimRepository::new(pool.clone())),
        thresholds: Arc::new(SqlThresholdRepository::new(pool.clone())),
        signatures: Arc::new(SqlSignatureRepository::new(pool.clone())),
        references: Arc::new(SqlReferenceDirectory::new(pool)),
    }
}

/// Empty claim, threshold and signature stores over the demo reference data.
pub fn in_memory_repositories() -> WorkflowRepositories {
    WorkflowRepositories {
        claims: Arc::new(InMemoryClaimRepository::default()),
        thresholds: Arc::new(InMemoryThresholdRepository::default()),
        signatures: Arc::new(InMemorySignatureRepository::default()),
        references: Arc::new(InMemoryReferenceDirectory::new(
            DemoDataset::sites(),
            DemoDataset::pits(),
            DemoDataset::blocks(),
        )),
    }
}

/// Errors raised inside the SQL adapters before they cross into the core ports.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<DbError> for RepositoryError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                unique_violation(db.message())
            }
            DbError::Database(error) => RepositoryError::Backend(error.to_string()),
            DbError::Decode(message) => RepositoryError::Decode(message),
            DbError::Repository(error) => error,
        }
    }
}

/// SQLite reports `UNIQUE constraint failed: claim.claim_number`.
fn unique_violation(message: &str) -> RepositoryError {
    let columns = message.rsplit_once(": ").map(|(_, columns)| columns).unwrap_or(message);
    let entity = columns.split_once('.').map(|(table, _)| table).unwrap_or("record");
    RepositoryError::conflict(entity, columns, "unique constraint violated")
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| {
        DbError::Decode(format!("invalid value for `{column}` (expected non-negative u32): {value}"))
    })
}

pub(crate) fn parse_i32(column: &str, value: i64) -> Result<i32, DbError> {
    i32::try_from(value)
        .map_err(|_| DbError::Decode(format!("invalid value for `{column}` (expected i32): {value}")))
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| DbError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})")),
    )
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, DbError> {
    Decimal::from_str(&value)
        .map_err(|error| DbError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})")))
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT)
        .map_err(|error| DbError::Decode(format!("invalid date in `{column}`: `{value}` ({error})")))
}

/// Parses a stored enum label through its `FromStr` impl.
pub(crate) fn parse_label<T>(column: &str, value: String) -> Result<T, DbError>
where
    T: FromStr,
{
    T::from_str(&value)
        .map_err(|_| DbError::Decode(format!("unknown value in `{column}`: `{value}`")))
}
