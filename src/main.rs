use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod dispatch;
mod metrics;
mod models;
mod queue;
mod routing;
mod server;
mod utils;
mod volume;

use config::Config;
use dispatch::HttpDispatcher;
use metrics::Metrics;
use queue::QueueProcessor;
use routing::{RoutingService, RoutingTables};
use server::AppState;
use volume::{InMemoryVolumeStore, RedisVolumeStore, VolumeStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fulfillment_router=debug")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("🚀 Starting fulfillment order router");

    let metrics = Arc::new(Metrics::new()?);

    // === 1. Counter store for daily volume caps ===
    let store: Arc<dyn VolumeStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to counter store...");
            Arc::new(RedisVolumeStore::connect(url, config.counter_timeout).await?)
        }
        None => {
            tracing::warn!(
                "REDIS_URL not set, daily volume counters are process-local and reset on restart"
            );
            Arc::new(InMemoryVolumeStore::default())
        }
    };

    // === 2. Routing engine ===
    let routing = Arc::new(RoutingService::new(
        RoutingTables {
            us_skus: config.us_skus.clone(),
            refill_skus: config.refill_skus.clone(),
        },
        config.caps.clone(),
        store,
        metrics.clone(),
    ));

    // === 3. Partner dispatch client ===
    let dispatcher = Arc::new(HttpDispatcher::new(
        config.endpoints.clone(),
        config.dispatch_timeout,
        config.breaker.clone(),
        metrics.clone(),
    )?);

    // === 4. Queue processor and workers ===
    let processor = QueueProcessor::new(
        routing.clone(),
        dispatcher,
        metrics.clone(),
        config.max_attempts,
        config.backoff.clone(),
    );
    let workers = processor.clone().start_workers(config.worker_count);
    tracing::info!(workers = config.worker_count, "📦 Queue workers started");

    // === 5. HTTP ingress + observability ===
    server::run(
        AppState {
            processor,
            routing,
            metrics,
        },
        config.http_port,
    )
    .await?;

    tracing::info!("HTTP server stopped, shutting down workers");
    for handle in workers {
        handle.abort();
    }

    Ok(())
}
