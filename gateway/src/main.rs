use anyhow::Context;
use gateway::app::GatewayState;
use gateway::config::{AppConfig, CliArgs};
use gateway::store::{SeaOrmStore, Store};
use migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args: CliArgs = argh::from_env();
    let config = AppConfig::load(args)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    gateway::metrics::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = match &config.database_url {
        Some(db_url) => {
            let db = get_migrated_db(db_url, config.workers).await?;
            Arc::new(SeaOrmStore::new(db))
        }
        None => {
            tracing::warn!("no database configured, running against an in-memory store");
            Arc::new(gateway::store::InMemoryStore::new())
        }
    };

    let state = GatewayState::build(config, store).await?;
    gateway::app::serve(state).await
}

/// Connect to Postgres and run pending migrations -- the teacher's
/// `app.rs::get_migrated_db` does the same, minus the mysql-specific pool
/// tuning this gateway doesn't need.
async fn get_migrated_db(db_url: &str, min_connections: usize) -> anyhow::Result<sea_orm::DatabaseConnection> {
    let mut opts = sea_orm::ConnectOptions::new(db_url.to_owned());
    opts.max_connections(99)
        .min_connections(min_connections as u32)
        .connect_timeout(std::time::Duration::from_secs(8))
        .idle_timeout(std::time::Duration::from_secs(8))
        .max_lifetime(std::time::Duration::from_secs(60))
        .sqlx_logging(false);

    let db = sea_orm::Database::connect(opts).await.context("connecting to database")?;
    migration::Migrator::up(&db, None).await.context("running migrations")?;

    Ok(db)
}
