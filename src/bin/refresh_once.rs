// src/bin/refresh_once.rs
use ipo_analyzer::config::AppConfig;
use ipo_analyzer::offering_source;
use ipo_analyzer::services::scheduler::RefreshScheduler;
use ipo_analyzer::services::store::OfferingStore;
use log::{error, info};
use std::sync::Arc;

/// Runs a single refresh cycle against the configured feed and prints what
/// ended up in the store.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = AppConfig::from_env()?;
    let store = Arc::new(OfferingStore::new());
    if let Some(path) = &config.snapshot_path {
        store.load_snapshot(path).await?;
    }

    let scheduler = RefreshScheduler::new(Arc::clone(&store), offering_source(&config)?, config.refresh.clone())
        .with_snapshot(config.snapshot_path.clone());

    let Some(report) = scheduler.run_cycle().await else {
        error!("Refresh cycle did not run");
        return Ok(());
    };
    info!("Cycle report: {:?}", report);

    let mut offerings: Vec<_> = store.list_all().collect();
    offerings.sort_by(|a, b| a.record.listing_date.cmp(&b.record.listing_date));
    for stored in offerings {
        println!(
            "{:<16} {:<28} {:<12} listing {} ratio {} {}",
            stored.record.offering_id,
            stored.record.company_name,
            stored.record.phase,
            stored.record.listing_date,
            stored
                .record
                .subscription_competition_ratio
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            if stored.status.stale { "(stale)" } else { "" }
        );
    }
    Ok(())
}
