// src/services/store.rs
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{IpoError, IpoResult};
use crate::models::{OfferingRecord, RefreshStatus, StoredOffering};

/// Consecutive refresh failures after which an offering is reported stale.
pub const STALE_AFTER_FAILURES: u32 = 3;

/// Canonical set of offerings.
///
/// Records are kept behind `Arc` and replaced whole, so a reader always sees
/// either the old or the new version of a record. Writers take a per-offering
/// lock; the map lock is only held for the pointer swap.
pub struct OfferingStore {
    records: RwLock<HashMap<String, Arc<StoredOffering>>>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    generation: AtomicU64,
}

impl Default for OfferingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OfferingStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn read_records(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<StoredOffering>>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_records(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<StoredOffering>>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn lock_offering(&self, offering_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.write_locks.lock().await;
            Arc::clone(
                locks
                    .entry(offering_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    fn publish(&self, stored: StoredOffering) -> Arc<StoredOffering> {
        let stored = Arc::new(stored);
        self.write_records()
            .insert(stored.record.offering_id.clone(), Arc::clone(&stored));
        self.generation.fetch_add(1, Ordering::SeqCst);
        stored
    }

    /// Inserts or replaces the record for its `offering_id`.
    ///
    /// The record is validated first and nothing is written when validation
    /// fails. A stored offering can never move back to an earlier phase.
    /// A successful upsert clears the refresh failure counter.
    pub async fn upsert(&self, record: OfferingRecord) -> IpoResult<Arc<StoredOffering>> {
        record.validate()?;

        let _guard = self.lock_offering(&record.offering_id).await;

        if let Some(existing) = self.read_records().get(&record.offering_id) {
            if existing.record.phase > record.phase {
                return Err(IpoError::validation(format!(
                    "{}: phase cannot regress from {} to {}",
                    record.offering_id, existing.record.phase, record.phase
                )));
            }
        }

        debug!("Upserting offering {} ({})", record.offering_id, record.phase);
        Ok(self.publish(StoredOffering {
            record,
            status: RefreshStatus::default(),
        }))
    }

    pub fn get(&self, offering_id: &str) -> IpoResult<Arc<StoredOffering>> {
        self.read_records()
            .get(offering_id)
            .cloned()
            .ok_or_else(|| IpoError::not_found(offering_id))
    }

    pub fn contains(&self, offering_id: &str) -> bool {
        self.read_records().contains_key(offering_id)
    }

    /// Iterates over a snapshot taken at call time. Later writes are not
    /// observed by an iterator that is already running.
    pub fn list_all(&self) -> impl Iterator<Item = Arc<StoredOffering>> {
        let snapshot: Vec<Arc<StoredOffering>> = self.read_records().values().cloned().collect();
        snapshot.into_iter()
    }

    /// Notes a failed upstream refresh. Record fields and `last_refreshed_at`
    /// are left as they are.
    pub async fn record_failure(&self, offering_id: &str, error: &str) -> IpoResult<RefreshStatus> {
        let _guard = self.lock_offering(offering_id).await;

        let existing = self.get(offering_id)?;
        let failures = existing.status.consecutive_failures.saturating_add(1);
        let status = RefreshStatus {
            consecutive_failures: failures,
            stale: failures >= STALE_AFTER_FAILURES,
            last_failure_at: Some(Utc::now()),
            last_error: Some(error.to_string()),
        };

        if status.stale && !existing.status.stale {
            warn!(
                "Offering {} marked stale after {} consecutive refresh failures",
                offering_id, failures
            );
        }

        self.publish(StoredOffering {
            record: existing.record.clone(),
            status: status.clone(),
        });
        Ok(status)
    }

    /// Change counter, bumped by every successful write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stale_count(&self) -> usize {
        self.read_records().values().filter(|s| s.status.stale).count()
    }

    /// Writes every stored offering to `path` as JSON.
    pub async fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let mut entries: Vec<StoredOffering> =
            self.list_all().map(|stored| (*stored).clone()).collect();
        entries.sort_by(|a, b| a.record.offering_id.cmp(&b.record.offering_id));

        let json = serde_json::to_vec_pretty(&entries)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;

        info!("Saved {} offerings to {}", entries.len(), path.display());
        Ok(())
    }

    /// Loads a snapshot written by `save_snapshot`. A missing file is an empty
    /// store, not an error. Entries failing validation are skipped.
    pub async fn load_snapshot(&self, path: &Path) -> anyhow::Result<usize> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {}, starting empty", path.display());
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<StoredOffering> = serde_json::from_slice(&bytes)?;
        let mut loaded = 0;
        for entry in entries {
            if let Err(e) = entry.record.validate() {
                warn!("Skipping invalid snapshot entry: {}", e);
                continue;
            }
            let _guard = self.lock_offering(&entry.record.offering_id).await;
            self.publish(entry);
            loaded += 1;
        }

        info!("Loaded {} offerings from {}", loaded, path.display());
        Ok(loaded)
    }
}
