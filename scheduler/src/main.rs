//! PriceSync Scheduler Binary
//!
//! Keeps the dollar rate current and cascades it into ARS prices.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricesync_common::{DollarResponse, ProviderName};
use pricesync_fx::{
    BluelyticsProvider, DolarApiProvider, FallbackRateProvider, RateProvider, RateService,
};
use pricesync_scheduler::{
    CascadeScheduler, ProviderConfig, SchedulerConfig, StoreBackend, TickOutcome,
};
use pricesync_store::{MemoryStore, OrderStore, PgStore, RateStore, VariantStore};

/// PriceSync dollar rate scheduler
#[derive(Parser, Debug)]
#[command(name = "pricesync")]
#[command(about = "Refreshes the USD/ARS rate and reprices the catalog")]
struct Args {
    /// Run a single refresh tick and exit
    #[arg(long, conflicts_with = "force_cascade")]
    once: bool,

    /// Cascade the current rate into all prices and exit
    #[arg(long)]
    force_cascade: bool,
}

struct Stores {
    rates: Arc<dyn RateStore>,
    variants: Arc<dyn VariantStore>,
    orders: Arc<dyn OrderStore>,
}

impl Stores {
    fn wire<S>(store: Arc<S>) -> Self
    where
        S: RateStore + VariantStore + OrderStore + 'static,
    {
        Self {
            rates: store.clone(),
            variants: store.clone(),
            orders: store,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting PriceSync scheduler");

    // Load configuration
    let config = SchedulerConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let stores = open_stores(&config).await?;
    let provider = build_provider(&config.providers)?;
    let rate_service = Arc::new(RateService::new(provider, stores.rates));

    let scheduler = Arc::new(
        CascadeScheduler::new(
            config.refresh_interval,
            rate_service,
            stores.variants,
            stores.orders,
        )
        .with_shutdown_grace(config.shutdown_grace),
    );

    if args.force_cascade {
        let outcome = scheduler.force_cascade().await?;
        report(&outcome)?;
        return Ok(());
    }

    if args.once {
        let outcome = scheduler.refresh_now().await;
        report(&outcome)?;
        return Ok(());
    }

    scheduler.start()?;
    info!(
        interval_secs = config.refresh_interval.as_secs(),
        primary = %config.providers.primary,
        "Scheduler running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("listening for Ctrl+C")?;
    info!("Shutdown signal received");

    if let Err(e) = scheduler.stop().await {
        error!(error = %e, "Error during shutdown");
    }

    info!(metrics = ?scheduler.metrics().snapshot(), "Scheduler shutdown complete");
    Ok(())
}

async fn open_stores(config: &SchedulerConfig) -> anyhow::Result<Stores> {
    match config.store {
        StoreBackend::Postgres => {
            let store = PgStore::connect(&config.database_url)
                .await
                .context("connecting to database")?;
            store.migrate().await.context("applying schema")?;
            info!("Connected to PostgreSQL");
            Ok(Stores::wire(Arc::new(store)))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store, data is lost on exit");
            Ok(Stores::wire(Arc::new(MemoryStore::new())))
        }
    }
}

fn build_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn RateProvider>> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("pricesync/", env!("CARGO_PKG_VERSION")))
        .timeout(config.request_timeout)
        .build()
        .context("building HTTP client")?;

    let dolarapi: Arc<dyn RateProvider> = Arc::new(DolarApiProvider::new(
        client.clone(),
        config.dolarapi_url.clone(),
        config.dolarapi_casa.clone(),
    ));
    let bluelytics: Arc<dyn RateProvider> = Arc::new(BluelyticsProvider::new(
        client,
        config.bluelytics_url.clone(),
        config.bluelytics_market,
    ));

    let (primary, secondary) = match config.primary {
        ProviderName::DolarApi => (dolarapi, bluelytics),
        ProviderName::Bluelytics => (bluelytics, dolarapi),
    };

    Ok(Arc::new(FallbackRateProvider::new(primary, secondary)))
}

fn report(outcome: &TickOutcome) -> anyhow::Result<()> {
    info!(
        state = %outcome.state,
        changed = outcome.changed,
        variants_updated = ?outcome.variants.as_ref().map(|r| r.updated),
        orders_updated = ?outcome.orders.as_ref().map(|r| r.updated),
        failed_stages = outcome.failed_stages.len(),
        "Tick finished"
    );

    if let Some(error) = &outcome.error {
        anyhow::bail!("rate refresh failed: {}", error);
    }

    if let Some(rate) = &outcome.rate {
        println!("{}", serde_json::to_string_pretty(&DollarResponse::from(rate))?);
    }

    Ok(())
}
