// src/services/scheduler.rs
//! Periodic refresh of offerings from the upstream feed.
//!
//! One cycle runs at a time. A cycle that comes due while another is still
//! running is skipped, not queued. Failed fetches are not retried within a
//! cycle; the next cycle is the retry.

use anyhow::anyhow;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::RefreshConfig;
use crate::error::IpoError;
use crate::models::{OfferingRecord, Phase};
use crate::services::feed::{exchange_today, normalize, FetchError, OfferingSource};
use crate::services::store::OfferingStore;

#[derive(Debug, Error)]
pub enum RefreshFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("upstream sent {received} when {requested} was requested")]
    IdMismatch { requested: String, received: String },

    #[error("upstream data rejected: {0}")]
    Rejected(#[from] IpoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Offerings seen upstream for the first time.
    pub discovered: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Stored offerings left alone because they are settled history.
    pub inactive: usize,
}

pub struct RefreshScheduler {
    store: Arc<OfferingStore>,
    source: Arc<dyn OfferingSource>,
    config: RefreshConfig,
    snapshot_path: Option<PathBuf>,
    cycle_lock: Mutex<()>,
    shutting_down: AtomicBool,
    skipped_cycles: AtomicU64,
    last_report: StdMutex<Option<CycleReport>>,
}

impl RefreshScheduler {
    pub fn new(store: Arc<OfferingStore>, source: Arc<dyn OfferingSource>, config: RefreshConfig) -> Self {
        RefreshScheduler {
            store,
            source,
            config,
            snapshot_path: None,
            cycle_lock: Mutex::new(()),
            shutting_down: AtomicBool::new(false),
            skipped_cycles: AtomicU64::new(0),
            last_report: StdMutex::new(None),
        }
    }

    /// Persist the store to `path` after every cycle.
    pub fn with_snapshot(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    /// Whether an offering still changes upstream and should be refetched.
    pub fn is_active(record: &OfferingRecord, today: NaiveDate, retention_days: i64) -> bool {
        record.phase != Phase::Listed || record.listing_date >= today - ChronoDuration::days(retention_days)
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn skipped_cycles(&self) -> u64 {
        self.skipped_cycles.load(Ordering::SeqCst)
    }

    /// Runs one refresh cycle, or returns `None` without doing anything when
    /// a cycle is already in flight or shutdown has begun.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            self.skipped_cycles.fetch_add(1, Ordering::SeqCst);
            warn!("Previous refresh cycle still running, skipping this one");
            return None;
        };
        // Checked under the lock: `shutdown` raises the flag before it waits
        // for the lock, so no cycle can start once that wait has returned.
        if self.shutting_down.load(Ordering::SeqCst) {
            return None;
        }

        let report = self.refresh_all(exchange_today()).await;
        *self
            .last_report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report.clone());
        Some(report)
    }

    async fn refresh_all(&self, today: NaiveDate) -> CycleReport {
        let started_at = Utc::now();
        info!("Refresh cycle started");

        let mut targets = BTreeSet::new();
        let mut inactive = 0;
        for stored in self.store.list_all() {
            if Self::is_active(&stored.record, today, self.config.retention_days) {
                targets.insert(stored.record.offering_id.clone());
            } else {
                inactive += 1;
            }
        }

        let mut discovered = 0;
        match timeout(self.config.fetch_timeout, self.source.list_offering_ids()).await {
            Ok(Ok(ids)) => {
                for id in ids {
                    if !self.store.contains(&id) && targets.insert(id) {
                        discovered += 1;
                    }
                }
            }
            Ok(Err(e)) => warn!("Upstream index unavailable, refreshing known offerings only: {}", e),
            Err(_) => warn!(
                "Upstream index timed out after {:?}, refreshing known offerings only",
                self.config.fetch_timeout
            ),
        }

        let outcomes: Vec<(String, Result<(), RefreshFailure>)> = stream::iter(targets)
            .map(|id| async move {
                let outcome = self.refresh_one(&id, today).await;
                (id, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut refreshed = 0;
        let mut failed = 0;
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => refreshed += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Refresh of offering {} failed: {}", id, e);
                    if self.store.contains(&id) {
                        if let Err(e) = self.store.record_failure(&id, &e.to_string()).await {
                            error!("Could not record failure for {}: {}", id, e);
                        }
                    }
                }
            }
        }

        if let Some(path) = &self.snapshot_path {
            if let Err(e) = self.store.save_snapshot(path).await {
                error!("Failed to write snapshot {}: {}", path.display(), e);
            }
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            discovered,
            refreshed,
            failed,
            inactive,
        };
        info!(
            "Refresh cycle finished: {} refreshed, {} failed, {} new, {} inactive",
            report.refreshed, report.failed, report.discovered, report.inactive
        );
        report
    }

    async fn refresh_one(&self, offering_id: &str, today: NaiveDate) -> Result<(), RefreshFailure> {
        let raw = timeout(self.config.fetch_timeout, self.source.fetch_offering(offering_id))
            .await
            .map_err(|_| FetchError::Timeout(self.config.fetch_timeout))??;

        let mut record = normalize(&raw, today)?;
        if record.offering_id != offering_id {
            return Err(RefreshFailure::IdMismatch {
                requested: offering_id.to_string(),
                received: record.offering_id,
            });
        }
        record.last_refreshed_at = Some(Utc::now());
        self.store.upsert(record).await?;
        Ok(())
    }

    /// Runs a first cycle right away, then one every `interval`.
    pub async fn start(self: Arc<Self>) -> anyhow::Result<SchedulerHandle> {
        let jobs = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("failed to create job scheduler: {:?}", e))?;

        let scheduler = Arc::clone(&self);
        let job = Job::new_repeated_async(self.config.interval, move |_uuid, _jobs| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                scheduler.run_cycle().await;
            })
        })
        .map_err(|e| anyhow!("failed to create refresh job: {:?}", e))?;

        jobs.add(job)
            .await
            .map_err(|e| anyhow!("failed to schedule refresh job: {:?}", e))?;
        jobs.start()
            .await
            .map_err(|e| anyhow!("failed to start job scheduler: {:?}", e))?;
        info!("Refresh scheduled every {:?}", self.config.interval);

        let first = Arc::clone(&self);
        let initial = tokio::spawn(async move {
            first.run_cycle().await;
        });

        Ok(SchedulerHandle {
            jobs,
            scheduler: self,
            initial,
        })
    }
}

/// Owns the running schedule. Dropping it without `shutdown` leaves the job
/// scheduler running.
pub struct SchedulerHandle {
    jobs: JobScheduler,
    scheduler: Arc<RefreshScheduler>,
    initial: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    /// Stops future cycles immediately and waits for one in flight to finish.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.scheduler.shutting_down.store(true, Ordering::SeqCst);
        self.jobs
            .shutdown()
            .await
            .map_err(|e| anyhow!("failed to stop job scheduler: {:?}", e))?;

        if !self.initial.is_finished() {
            info!("Waiting for the start-up refresh cycle to finish");
        }
        let _ = self.initial.await;
        let _guard = self.scheduler.cycle_lock.lock().await;
        info!("Refresh scheduler stopped");
        Ok(())
    }
}
