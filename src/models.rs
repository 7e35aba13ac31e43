// src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{IpoError, IpoResult};

/// Lifecycle of an offering. Declaration order is the lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Announced,
    Subscribing,
    Priced,
    Listed,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Announced, Phase::Subscribing, Phase::Priced, Phase::Listed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Announced => "announced",
            Phase::Subscribing => "subscribing",
            Phase::Priced => "priced",
            Phase::Listed => "listed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = IpoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "announced" => Ok(Phase::Announced),
            "subscribing" => Ok(Phase::Subscribing),
            "priced" => Ok(Phase::Priced),
            "listed" => Ok(Phase::Listed),
            other => Err(IpoError::validation(format!("unknown phase '{}'", other))),
        }
    }
}

/// One subscription IPO listing, in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingRecord {
    pub offering_id: String,
    pub company_name: String,
    pub phase: Phase,
    pub subscription_start_date: NaiveDate,
    pub subscription_end_date: NaiveDate,
    pub listing_date: NaiveDate,
    pub price_band_low: Decimal,
    pub price_band_high: Decimal,
    #[serde(default)]
    pub final_offer_price: Option<Decimal>,
    pub total_shares_offered: u64,
    #[serde(default)]
    pub subscription_competition_ratio: Option<Decimal>,
    #[serde(default)]
    pub last_refreshed_at: Option<DateTime<Utc>>,

    // Inputs for the same-day trading analysis. Not phase gated.
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub mandatory_holding_pct: Option<Decimal>,
    #[serde(default)]
    pub available_float_pct: Option<Decimal>,
    #[serde(default)]
    pub sector_avg_return_pct: Option<Decimal>,
    #[serde(default)]
    pub expected_return_pct: Option<Decimal>,
    #[serde(default)]
    pub reference_price: Option<Decimal>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

impl OfferingRecord {
    /// A fresh `announced` record carrying only the fields known at announcement.
    pub fn announced(
        offering_id: impl Into<String>,
        company_name: impl Into<String>,
        subscription: (NaiveDate, NaiveDate),
        listing_date: NaiveDate,
        price_band: (Decimal, Decimal),
        total_shares_offered: u64,
    ) -> Self {
        OfferingRecord {
            offering_id: offering_id.into(),
            company_name: company_name.into(),
            phase: Phase::Announced,
            subscription_start_date: subscription.0,
            subscription_end_date: subscription.1,
            listing_date,
            price_band_low: price_band.0,
            price_band_high: price_band.1,
            final_offer_price: None,
            total_shares_offered,
            subscription_competition_ratio: None,
            last_refreshed_at: None,
            sector: None,
            mandatory_holding_pct: None,
            available_float_pct: None,
            sector_avg_return_pct: None,
            expected_return_pct: None,
            reference_price: None,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
        }
    }

    /// Checks field invariants and the lifecycle rule that no later-phase
    /// field is populated before its phase is reached.
    pub fn validate(&self) -> IpoResult<()> {
        if self.offering_id.trim().is_empty() {
            return Err(IpoError::validation("offering_id must not be empty"));
        }
        if self.company_name.trim().is_empty() {
            return Err(IpoError::validation(format!(
                "{}: company_name must not be empty",
                self.offering_id
            )));
        }
        if self.subscription_start_date > self.subscription_end_date {
            return Err(IpoError::validation(format!(
                "{}: subscription starts {} after it ends {}",
                self.offering_id, self.subscription_start_date, self.subscription_end_date
            )));
        }
        if self.listing_date < self.subscription_end_date {
            return Err(IpoError::validation(format!(
                "{}: listing date {} precedes subscription end {}",
                self.offering_id, self.listing_date, self.subscription_end_date
            )));
        }
        if self.price_band_low <= Decimal::ZERO {
            return Err(IpoError::validation(format!(
                "{}: price band must be positive",
                self.offering_id
            )));
        }
        if self.price_band_low > self.price_band_high {
            return Err(IpoError::validation(format!(
                "{}: price band low {} exceeds high {}",
                self.offering_id, self.price_band_low, self.price_band_high
            )));
        }
        if self.total_shares_offered == 0 {
            return Err(IpoError::validation(format!(
                "{}: total_shares_offered must be positive",
                self.offering_id
            )));
        }

        if let Some(ratio) = self.subscription_competition_ratio {
            if self.phase < Phase::Subscribing {
                return Err(IpoError::validation(format!(
                    "{}: competition ratio set while still {}",
                    self.offering_id, self.phase
                )));
            }
            if ratio < Decimal::ZERO {
                return Err(IpoError::validation(format!(
                    "{}: competition ratio {} is negative",
                    self.offering_id, ratio
                )));
            }
        }

        if let Some(price) = self.final_offer_price {
            if self.phase < Phase::Priced {
                return Err(IpoError::validation(format!(
                    "{}: final offer price set while still {}",
                    self.offering_id, self.phase
                )));
            }
            if price <= Decimal::ZERO {
                return Err(IpoError::validation(format!(
                    "{}: final offer price must be positive",
                    self.offering_id
                )));
            }
        }

        if let Some(reference) = self.reference_price {
            if reference <= Decimal::ZERO {
                return Err(IpoError::validation(format!(
                    "{}: reference price must be positive",
                    self.offering_id
                )));
            }
        }

        for (name, value) in [
            ("mandatory_holding_pct", self.mandatory_holding_pct),
            ("available_float_pct", self.available_float_pct),
        ] {
            if let Some(pct) = value {
                if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                    return Err(IpoError::validation(format!(
                        "{}: {} {} outside 0..=100",
                        self.offering_id, name, pct
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Refresh bookkeeping the store keeps next to each record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub consecutive_failures: u32,
    pub stale: bool,
    #[serde(default)]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// A record together with its refresh status, as handed out by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOffering {
    pub record: OfferingRecord,
    pub status: RefreshStatus,
}

/// Analysis numbers computed on demand. Absent values are unknown, not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub expected_allocation_per_subscriber: Option<Decimal>,
    pub estimated_listing_gain_pct: Option<Decimal>,
    pub price_band_position_pct: Option<Decimal>,
}

/// What the query surface returns for one offering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferingView {
    #[serde(flatten)]
    pub record: OfferingRecord,
    pub stale: bool,
    pub consecutive_failures: u32,
    pub metrics: DerivedMetrics,
}
