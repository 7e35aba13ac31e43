// src/services/metrics.rs
//! Pure analysis metrics over offering records.
//!
//! Everything here is fixed-point decimal arithmetic; no floats are involved,
//! so recomputing the same record always gives the same digits.

use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::models::{DerivedMetrics, OfferingRecord};

/// Minimum subscription lot in shares.
pub const SUBSCRIPTION_LOT_SHARES: u64 = 10;

const ALLOCATION_DP: u32 = 4;
const PERCENT_DP: u32 = 2;

/// Ranking used by the "top offerings" view: competition ratio descending,
/// earlier listing first among ties. Offerings without a published ratio come
/// after all offerings that have one.
pub fn competition_ratio_cmp(a: &OfferingRecord, b: &OfferingRecord) -> Ordering {
    match (a.subscription_competition_ratio, b.subscription_competition_ratio) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.listing_date.cmp(&b.listing_date))
    .then_with(|| a.offering_id.cmp(&b.offering_id))
}

pub fn competition_ratio_rank<'a, I>(records: I) -> Vec<&'a OfferingRecord>
where
    I: IntoIterator<Item = &'a OfferingRecord>,
{
    let mut ranked: Vec<&OfferingRecord> = records.into_iter().collect();
    ranked.sort_by(|a, b| competition_ratio_cmp(a, b));
    ranked
}

/// Shares one subscriber can expect when applying for one lot.
///
/// Demand is `shares * ratio`; spread over lot-sized subscribers that gives
/// `shares / (demand / lot)`, which is `lot / ratio` shares each, capped at
/// the full lot when the offering is not oversubscribed. Unknown until the
/// ratio is published.
pub fn expected_allocation_per_subscriber(record: &OfferingRecord) -> Option<Decimal> {
    let ratio = record.subscription_competition_ratio?;
    let lot = Decimal::from(SUBSCRIPTION_LOT_SHARES);
    if ratio <= Decimal::ONE {
        return Some(lot);
    }
    let allocation = lot.checked_div(ratio)?;
    Some(allocation.min(lot).round_dp(ALLOCATION_DP))
}

/// Final offer price relative to a reference market price, in percent.
/// Unknown until the offering is priced or without a usable reference.
pub fn estimated_listing_gain_pct(record: &OfferingRecord, reference: Option<Decimal>) -> Option<Decimal> {
    let offer = record.final_offer_price?;
    let reference = reference.filter(|r| *r > Decimal::ZERO)?;
    let gain = (offer - reference).checked_div(reference)?;
    Some(gain.checked_mul(Decimal::ONE_HUNDRED)?.round_dp(PERCENT_DP))
}

/// Position of the final price inside the price band: 0 at the low end, 100
/// at the high end. Can exceed 100 when pricing landed above the band.
pub fn price_band_position_pct(record: &OfferingRecord) -> Option<Decimal> {
    let offer = record.final_offer_price?;
    let width = record.price_band_high - record.price_band_low;
    if width.is_zero() {
        return None;
    }
    let position = (offer - record.price_band_low).checked_div(width)?;
    Some(position.checked_mul(Decimal::ONE_HUNDRED)?.round_dp(PERCENT_DP))
}

/// All derived metrics for a record. `reference_override` takes precedence
/// over the record's own reference price.
pub fn derive(record: &OfferingRecord, reference_override: Option<Decimal>) -> DerivedMetrics {
    let reference = reference_override.or(record.reference_price);
    DerivedMetrics {
        expected_allocation_per_subscriber: expected_allocation_per_subscriber(record),
        estimated_listing_gain_pct: estimated_listing_gain_pct(record, reference),
        price_band_position_pct: price_band_position_pct(record),
    }
}
