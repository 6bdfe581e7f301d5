/**
 * RoofSync Agent Entry Point
 *
 * Headless process that replays the local sync queue against the configured
 * backend until interrupted.
 */

use std::sync::Arc;
use std::time::Duration;

use roofsync::local_db::LocalDatabase;
use roofsync::remote::RestBackend;
use roofsync::shared::{EventBus, SyncConfig, SyncEvent};
use roofsync::sync::{ConnectivityMonitor, SyncEngine, SyncScheduler};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "roofsync=debug,info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = match std::env::var("ROOFSYNC_CONFIG") {
        Ok(path) => SyncConfig::load(path)?,
        Err(_) => SyncConfig::from_env()?,
    };
    tracing::info!("[STARTUP] Database at {}", config.resolved_database_path().display());

    let db = LocalDatabase::open_with_config(&config).await?;
    let stats = db.get_stats().await?;
    tracing::info!(
        "[STARTUP] {} pending operation(s), {} record(s) in error",
        stats.pending_operations,
        stats.error_records
    );

    let events = Arc::new(EventBus::new());
    events.subscribe_all(|event| match event {
        SyncEvent::SyncError { item, reason } => {
            tracing::warn!("[AGENT] {} not synced: {}", item.id, reason)
        }
        other => tracing::debug!("[AGENT] {:?}", other.kind()),
    });

    // Without a health endpoint the platform is assumed to be online.
    let connectivity = Arc::new(ConnectivityMonitor::new(
        config.remote.health_url.is_none(),
        Arc::clone(&events),
    ));

    let engine = Arc::new(
        SyncEngine::new(
            db.clone(),
            Arc::new(RestBackend::from_config(&config)?),
            Arc::clone(&connectivity),
            events,
        )
        .configured(&config),
    );

    let probe = config
        .remote
        .health_url
        .clone()
        .map(|url| tokio::spawn(poll_health(url, Arc::clone(&connectivity))));

    let scheduler = SyncScheduler::spawn(Arc::clone(&engine), config.sync_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("[AGENT] Shutting down");

    if let Some(probe) = probe {
        probe.abort();
    }
    scheduler.shutdown().await;

    let status = engine.status().await?;
    tracing::info!("[AGENT] {} operation(s) left in the queue", status.pending_operations);
    db.close().await;

    Ok(())
}

/// Feed the connectivity monitor from a health endpoint
async fn poll_health(url: String, connectivity: Arc<ConnectivityMonitor>) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default();
    let mut ticker = tokio::time::interval(HEALTH_POLL_INTERVAL);

    loop {
        ticker.tick().await;
        let online = match client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("[AGENT] Health check failed: {}", e);
                false
            }
        };
        connectivity.set_online(online);
    }
}
