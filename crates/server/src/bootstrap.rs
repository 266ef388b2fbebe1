use overburden_core::config::{AppConfig, ConfigError, LoadOptions};
use overburden_core::ClaimWorkflow;
use overburden_db::{connect, migrations, sql_repositories, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: ClaimWorkflow,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let workflow = ClaimWorkflow::new(sql_repositories(db_pool.clone()))
        .with_reconciliation(&config.reconciliation);
    info!(
        event_name = "system.bootstrap.workflow_ready",
        correlation_id = "bootstrap",
        fallback_limit = %config.reconciliation.fallback_limit,
        "claim workflow wired to sqlite repositories"
    );

    Ok(Application { config, db_pool, workflow })
}
