use devcred_backend::api;
use devcred_backend::config::Config;
use devcred_backend::registry::{CredentialRegistry, SqliteStore, SystemClock};
use devcred_backend::state::AppState;
use devcred_backend::stats::{FixtureStatsProvider, StatsProvider};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    // Local state (sqlite ledger, Groth16 keys) lives under DATA_DIR.
    std::fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::connect(&config.database_url).await?;
    let registry =
        CredentialRegistry::open(Arc::new(store), config.service_address.clone(), Arc::new(SystemClock)).await?;

    let stats: Arc<dyn StatsProvider> = match &config.stats_fixture_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading repository fixtures");
            Arc::new(FixtureStatsProvider::from_path(path)?)
        }
        None => {
            tracing::warn!("STATS_FIXTURE_PATH not set; no repository statistics available");
            Arc::new(FixtureStatsProvider::new())
        }
    };

    let addr = config.backend_addr.clone();
    let state = AppState::new(config, registry, stats);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "backend listening");

    axum::serve(listener, app).await?;

    Ok(())
}
