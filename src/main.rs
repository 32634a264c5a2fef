//! downtrail - downtime reporting service.

use downtrail::config::ServerConfig;
use downtrail::db::Store;
use downtrail::downtime::DowntimeAggregator;
use downtrail::scheduler::RetentionManager;
use downtrail::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("downtrail=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting downtrail on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let monitors = store.get_monitors()?;
    tracing::info!(
        "Serving downtime for {} monitors, up to {} fetches at a time",
        monitors.len(),
        cfg.max_concurrent_fetches
    );

    let aggregator = Arc::new(DowntimeAggregator::new(
        store.clone(),
        store.clone(),
        cfg.max_concurrent_fetches,
    ));

    let retention = RetentionManager::new(store.clone(), cfg.retention_days);
    let retention_task = retention.start();

    // Start web server
    let server = Server::new(cfg, store, aggregator);
    let result = server.start().await;

    retention.stop();
    if let Some(task) = retention_task {
        let _ = task.await;
    }
    result
}
