// src/services/query.rs
use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::error::{IpoError, IpoResult};
use crate::models::{OfferingView, Phase, StoredOffering};
use crate::services::metrics;
use crate::services::store::OfferingStore;

pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Competition ratio, highest first; earlier listing wins ties.
    #[default]
    Competition,
    ListingDate,
    ExpectedGain,
    ExpectedReturn,
    Name,
}

impl FromStr for SortKey {
    type Err = IpoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "competition" | "competition_ratio" => Ok(SortKey::Competition),
            "listing_date" => Ok(SortKey::ListingDate),
            "expected_gain" => Ok(SortKey::ExpectedGain),
            "expected_return" => Ok(SortKey::ExpectedReturn),
            "name" => Ok(SortKey::Name),
            other => Err(IpoError::validation(format!("unknown sort '{}'", other))),
        }
    }
}

/// Predicates for `list_offerings`. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OfferingFilter {
    pub phases: Vec<Phase>,
    pub listed_from: Option<NaiveDate>,
    pub listed_to: Option<NaiveDate>,
    pub name_contains: Option<String>,
    pub sector: Option<String>,
    pub stale: Option<bool>,
}

impl OfferingFilter {
    pub fn validate(&self) -> IpoResult<()> {
        if let (Some(from), Some(to)) = (self.listed_from, self.listed_to) {
            if from > to {
                return Err(IpoError::validation(format!(
                    "listed_from {} is after listed_to {}",
                    from, to
                )));
            }
        }
        Ok(())
    }

    /// Canonical form, so equivalent filters share a cache entry.
    fn normalized(mut self) -> Self {
        self.phases.sort();
        self.phases.dedup();
        self.name_contains = self
            .name_contains
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty());
        self.sector = self
            .sector
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn matches(&self, stored: &StoredOffering) -> bool {
        let record = &stored.record;
        if !self.phases.is_empty() && !self.phases.contains(&record.phase) {
            return false;
        }
        if self.listed_from.map_or(false, |from| record.listing_date < from) {
            return false;
        }
        if self.listed_to.map_or(false, |to| record.listing_date > to) {
            return false;
        }
        if let Some(needle) = &self.name_contains {
            if !record.company_name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(sector) = &self.sector {
            let matches_sector = record
                .sector
                .as_ref()
                .map_or(false, |s| s.to_lowercase() == sector.to_lowercase());
            if !matches_sector {
                return false;
            }
        }
        if let Some(stale) = self.stale {
            if stored.status.stale != stale {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKey {
    filter: OfferingFilter,
    sort: SortKey,
}

struct CacheEntry {
    generation: u64,
    created_at: Instant,
    results: Arc<Vec<OfferingView>>,
}

#[derive(Debug, Error)]
enum CacheMiss {
    #[error("no cached entry")]
    Absent,
    #[error("cached entry expired")]
    Expired,
    #[error("cache inconsistency: entry built at generation {cached}, store is at {current}")]
    Inconsistent { cached: u64, current: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Read side of the service: records plus derived metrics, with a short-lived
/// cache of ranked listings. Never writes to the store.
pub struct QueryService {
    store: Arc<OfferingStore>,
    ttl: Duration,
    max_entries: usize,
    cache: Mutex<HashMap<QueryKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryService {
    pub fn new(store: Arc<OfferingStore>, ttl: Duration) -> Self {
        QueryService {
            store,
            ttl,
            max_entries: DEFAULT_MAX_CACHE_ENTRIES,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn store(&self) -> &Arc<OfferingStore> {
        &self.store
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One offering with metrics. `reference_price` overrides the record's own
    /// reference for the listing-gain estimate.
    pub fn get_offering(&self, offering_id: &str, reference_price: Option<Decimal>) -> IpoResult<OfferingView> {
        let stored = self.store.get(offering_id)?;
        Ok(view(&stored, reference_price))
    }

    /// Filtered offerings in `sort` order.
    pub fn list_offerings(&self, filter: OfferingFilter, sort: SortKey) -> IpoResult<Arc<Vec<OfferingView>>> {
        filter.validate()?;
        let key = QueryKey {
            filter: filter.normalized(),
            sort,
        };

        // Read the generation before computing: a write that lands while we
        // rank makes the entry look old and it is rebuilt on the next call.
        let generation = self.store.generation();
        match self.lookup(&key, generation) {
            Ok(results) => {
                self.hits.fetch_add(1, AtomicOrdering::Relaxed);
                debug!("Query cache hit for {:?}", key);
                return Ok(results);
            }
            Err(miss) => {
                self.misses.fetch_add(1, AtomicOrdering::Relaxed);
                debug!("Query cache miss for {:?}: {}", key, miss);
            }
        }

        let results = Arc::new(self.compute(&key));
        self.insert(key, generation, Arc::clone(&results));
        Ok(results)
    }

    fn lookup(&self, key: &QueryKey, generation: u64) -> Result<Arc<Vec<OfferingView>>, CacheMiss> {
        let mut cache = self.lock_cache();
        let entry = cache.get(key).ok_or(CacheMiss::Absent)?;
        let miss = if entry.generation != generation {
            CacheMiss::Inconsistent {
                cached: entry.generation,
                current: generation,
            }
        } else if entry.created_at.elapsed() > self.ttl {
            CacheMiss::Expired
        } else {
            return Ok(Arc::clone(&entry.results));
        };
        cache.remove(key);
        Err(miss)
    }

    fn insert(&self, key: QueryKey, generation: u64, results: Arc<Vec<OfferingView>>) {
        let mut cache = self.lock_cache();
        let ttl = self.ttl;
        cache.retain(|_, entry| entry.created_at.elapsed() <= ttl && entry.generation == generation);
        if cache.len() >= self.max_entries {
            if let Some(victim) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&victim);
            }
        }
        cache.insert(
            key,
            CacheEntry {
                generation,
                created_at: Instant::now(),
                results,
            },
        );
    }

    fn compute(&self, key: &QueryKey) -> Vec<OfferingView> {
        let mut views: Vec<OfferingView> = self
            .store
            .list_all()
            .filter(|stored| key.filter.matches(stored))
            .map(|stored| view(&stored, None))
            .collect();
        views.sort_by(|a, b| sort_cmp(key.sort, a, b));
        views
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(AtomicOrdering::Relaxed),
            misses: self.misses.load(AtomicOrdering::Relaxed),
            entries: self.lock_cache().len(),
        }
    }
}

fn view(stored: &StoredOffering, reference_price: Option<Decimal>) -> OfferingView {
    OfferingView {
        metrics: metrics::derive(&stored.record, reference_price),
        record: stored.record.clone(),
        stale: stored.status.stale,
        consecutive_failures: stored.status.consecutive_failures,
    }
}

/// Descending on a value that may be unknown; unknown values go last.
fn desc_known(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sort_cmp(sort: SortKey, a: &OfferingView, b: &OfferingView) -> Ordering {
    let by_competition = || metrics::competition_ratio_cmp(&a.record, &b.record);
    match sort {
        SortKey::Competition => by_competition(),
        SortKey::ListingDate => a
            .record
            .listing_date
            .cmp(&b.record.listing_date)
            .then_with(|| a.record.offering_id.cmp(&b.record.offering_id)),
        SortKey::ExpectedGain => desc_known(
            a.metrics.estimated_listing_gain_pct,
            b.metrics.estimated_listing_gain_pct,
        )
        .then_with(by_competition),
        SortKey::ExpectedReturn => desc_known(a.record.expected_return_pct, b.record.expected_return_pct)
            .then_with(by_competition),
        SortKey::Name => a
            .record
            .company_name
            .to_lowercase()
            .cmp(&b.record.company_name.to_lowercase())
            .then_with(|| a.record.offering_id.cmp(&b.record.offering_id)),
    }
}
