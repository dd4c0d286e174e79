//! Turnstile Server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_server::{
    AdmissionController, AppState, Settings,
    cache::{CacheStore, MokaCacheStore},
    create_router_with_state,
    metrics::{AdmissionMetrics, CacheMetrics, init_metrics},
    run_server,
    settings::DEFAULT_CONFIG_PATH,
};
use turnstile_store::{MemoryUserStore, UserStore};

#[derive(Debug, Parser)]
#[command(name = "turnstile-server", version, about = "Turnstile user registry server")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short = 'f', long = "config", env = "TURNSTILE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let settings = Settings::load(Some(&args.config))
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let addr = settings.bind_addr()?;
    let policy = settings.cache_policy()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "Starting Turnstile server"
    );

    let prometheus = init_metrics().context("installing metrics recorder")?;
    let cache_metrics = CacheMetrics::new();

    let store: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
    let cache: Arc<dyn CacheStore> = Arc::new(MokaCacheStore::with_metrics(
        settings.moka_config(),
        cache_metrics.clone(),
    ));
    let state = AppState::with_metrics(Arc::clone(&store), cache, policy, cache_metrics);

    let admission = Arc::new(AdmissionController::with_metrics(
        settings.rate_limit.capacity,
        settings.rate_limit.refill_per_sec,
        AdmissionMetrics::new(),
    )?);

    info!(
        store = store.name(),
        positive_ttl_secs = policy.positive_ttl().as_secs(),
        negative_ttl_secs = policy.negative_ttl().as_secs(),
        bucket_capacity = admission.capacity(),
        refill_per_sec = admission.refill_per_sec(),
        "Components initialized"
    );

    let app = create_router_with_state(state, admission, prometheus);
    run_server(addr, app).await?;

    Ok(())
}
