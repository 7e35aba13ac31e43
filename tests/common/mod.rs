//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use ipo_analyzer::models::{OfferingRecord, Phase};
use ipo_analyzer::services::feed::{FetchError, OfferingSource, RawOffering};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn won(amount: i64) -> Decimal {
    Decimal::from(amount)
}

/// An announced offering with a 10,000~12,000 band.
pub fn announced(id: &str, listing: NaiveDate) -> OfferingRecord {
    OfferingRecord::announced(
        id,
        format!("{} Corp", id),
        (listing - chrono::Duration::days(10), listing - chrono::Duration::days(9)),
        listing,
        (won(10000), won(12000)),
        1_000_000,
    )
}

/// A priced offering with a published competition ratio.
pub fn priced(id: &str, ratio: i64, listing: NaiveDate) -> OfferingRecord {
    let mut record = announced(id, listing);
    record.phase = Phase::Priced;
    record.final_offer_price = Some(won(11000));
    record.subscription_competition_ratio = Some(Decimal::from(ratio));
    record
}

/// Upstream double: serves the records it holds, fails on demand.
#[derive(Default)]
pub struct ScriptedSource {
    offerings: Mutex<HashMap<String, OfferingRecord>>,
    failing: Mutex<HashSet<String>>,
    index_fails: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    pub fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(records: Vec<OfferingRecord>) -> Self {
        let source = ScriptedSource::default();
        for record in records {
            source.put(record);
        }
        source
    }

    pub fn put(&self, record: OfferingRecord) {
        self.offerings
            .lock()
            .unwrap()
            .insert(record.offering_id.clone(), record);
    }

    pub fn fail(&self, offering_id: &str) {
        self.failing.lock().unwrap().insert(offering_id.to_string());
    }

    pub fn recover(&self, offering_id: &str) {
        self.failing.lock().unwrap().remove(offering_id);
    }

    pub fn fail_index(&self, fails: bool) {
        *self.index_fails.lock().unwrap() = fails;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    fn current_delay(&self) -> Option<Duration> {
        *self.delay.lock().unwrap()
    }
}

#[async_trait]
impl OfferingSource for ScriptedSource {
    async fn list_offering_ids(&self) -> Result<Vec<String>, FetchError> {
        if *self.index_fails.lock().unwrap() {
            return Err(FetchError::Malformed("index down".to_string()));
        }
        let mut ids: Vec<String> = self.offerings.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn fetch_offering(&self, offering_id: &str) -> Result<RawOffering, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.current_delay() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(offering_id) {
            return Err(FetchError::Status {
                status: 503,
                url: format!("scripted://{}", offering_id),
            });
        }
        let record = self
            .offerings
            .lock()
            .unwrap()
            .get(offering_id)
            .cloned()
            .ok_or_else(|| FetchError::UnknownOffering(offering_id.to_string()))?;
        RawOffering::from_json(serde_json::to_value(record)?)
    }
}
