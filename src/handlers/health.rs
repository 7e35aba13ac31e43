// src/handlers/health.rs
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::reply::Json;

use crate::services::query::CacheStats;
use crate::services::scheduler::CycleReport;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    offerings: usize,
    stale: usize,
    generation: u64,
    cache: CacheStats,
    last_cycle: Option<CycleReport>,
    skipped_cycles: u64,
}

pub async fn get_health(state: Arc<AppState>) -> Result<Json, Infallible> {
    let (last_cycle, skipped_cycles) = match &state.scheduler {
        Some(scheduler) => (scheduler.last_report(), scheduler.skipped_cycles()),
        None => (None, 0),
    };

    Ok(warp::reply::json(&HealthResponse {
        status: "ok",
        offerings: state.store.len(),
        stale: state.store.stale_count(),
        generation: state.store.generation(),
        cache: state.query.cache_stats(),
        last_cycle,
        skipped_cycles,
    }))
}
