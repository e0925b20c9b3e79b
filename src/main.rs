use anyhow::Result;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn config_path() -> PathBuf {
    env::var_os("FETCHARR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fetcharr.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    match dotenv() {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }
    init_tracing();

    let path = config_path();
    info!("Loading configuration from {}", path.display());
    let config = fetcharr::config::AppConfig::load(&path)?;
    fetcharr::app::run_server(config).await
}
