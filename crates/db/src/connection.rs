use std::time::Duration;

use overburden_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

pub type DbPool = sqlx::SqlitePool;

/// Claim writes wait this long on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Opens the claim store described by the service configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Every pooled connection enforces foreign keys, since status transitions,
/// signatures and reconciliation snapshots all hang off `claim` rows.
///
/// An in-memory database lives and dies with its connection, so those pools
/// hold a single connection that is never recycled, and skip WAL.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);
    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    let mut options = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if in_memory {
        options = options.idle_timeout(None).max_lifetime(None);
    }

    let pool = options
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                if !in_memory {
                    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                }
                sqlx::query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await?;

    debug!(
        event_name = "db.pool.connected",
        in_memory,
        max_connections,
        "claim store pool ready"
    );
    Ok(pool)
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use overburden_core::config::DatabaseConfig;

    use super::{connect, connect_with_settings, is_in_memory};

    #[test]
    fn recognises_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:claims?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://overburden.db?mode=rwc"));
    }

    #[tokio::test]
    async fn in_memory_pool_is_single_connection_with_foreign_keys() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_owned(),
            max_connections: 8,
            timeout_secs: 5,
        };
        let pool = connect(&config).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 1);

        let enabled: i64 =
            sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn file_pool_uses_wal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}/claims.db?mode=rwc", dir.path().display());
        let pool = connect_with_settings(&url, 2, 5).await.expect("connect");

        let mode: String =
            sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&pool).await.expect("pragma");
        assert_eq!(mode, "wal");
        let busy: i64 =
            sqlx::query_scalar("PRAGMA busy_timeout").fetch_one(&pool).await.expect("pragma");
        assert_eq!(busy, 5_000);
        pool.close().await;
    }
}
