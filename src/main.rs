use std::sync::Arc;

use tracing::{info, warn};

use parkd::clock::SystemClock;
use parkd::config::Config;
use parkd::directory::InMemoryDirectory;
use parkd::payment::LocalGateway;
use parkd::scheduler::{self, BookingScheduler};
use parkd::service::BookingService;
use parkd::store::LedgerStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    parkd::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let clock = Arc::new(SystemClock);
    let store = Arc::new(LedgerStore::open(config.wal_path(), clock.clone())?);
    let directory = Arc::new(match &config.seed_file {
        Some(path) => InMemoryDirectory::from_seed_file(path)?,
        None => InMemoryDirectory::new(),
    });
    let service = Arc::new(
        BookingService::new(
            store.clone(),
            directory.clone(),
            directory.clone(),
            Arc::new(LocalGateway),
            clock.clone(),
        )
        .with_failure_policy(config.payment_failure_policy),
    );

    let unlisted = service.unlisted_spots().await?;
    if !unlisted.is_empty() {
        warn!("{} spots with bookings are missing from the catalog", unlisted.len());
    }

    info!("parkd started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  bookings: {} across {} spots", store.booking_count(), store.spot_count());
    info!("  catalog: {} spots", directory.spot_count());
    info!("  reconcile every: {:?}", config.reconcile_interval);
    info!("  payment failure policy: {:?}", service.failure_policy());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let reconciler = Arc::new(BookingScheduler::new(store.clone(), clock));
    tokio::spawn(scheduler::run_scheduler(reconciler, config.reconcile_interval));
    tokio::spawn(scheduler::run_compactor(store.clone(), config.compact_threshold));

    // Run until SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received, compacting WAL");
    if let Err(e) = store.compact_wal().await {
        warn!("final compaction failed: {e}");
    }
    info!("parkd stopped");
    Ok(())
}
