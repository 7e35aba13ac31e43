// src/services/suitability.rs
//! Same-day ("단타") trading screen for offerings about to list.
//!
//! An offering is unsuitable when any one of the criteria fails. Suitable
//! offerings also get a sell-timing recommendation for listing day.

use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;

use crate::models::OfferingRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuitabilityCriteria {
    pub min_mandatory_holding_pct: Decimal,
    pub max_available_float_pct: Decimal,
    pub min_sector_return_pct: Decimal,
    pub target_min_return_pct: Decimal,
    pub target_max_return_pct: Decimal,
}

impl Default for SuitabilityCriteria {
    fn default() -> Self {
        SuitabilityCriteria {
            min_mandatory_holding_pct: Decimal::from(10),
            max_available_float_pct: Decimal::from(35),
            min_sector_return_pct: Decimal::from(5),
            target_min_return_pct: Decimal::from(5),
            target_max_return_pct: Decimal::from(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Suitability {
    Suitable,
    Unsuitable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuitabilityEvaluation {
    pub offering_id: String,
    pub company_name: String,
    pub status: Suitability,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyStrength {
    Strong,
    Medium,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellTiming {
    pub offering_id: String,
    pub company_name: String,
    pub supply_strength: Decimal,
    pub strength: SupplyStrength,
    pub dangerous_period: String,
    pub safe_period: String,
    pub reason: String,
}

/// Inputs the screen needs. `None` from `from_record` means the offering is
/// not far enough along to be judged.
struct ScreenInputs {
    offer_price: Decimal,
    holding: Decimal,
    float: Decimal,
    sector_return: Decimal,
}

impl ScreenInputs {
    fn from_record(record: &OfferingRecord) -> Option<Self> {
        Some(ScreenInputs {
            offer_price: record.final_offer_price?,
            holding: record.mandatory_holding_pct?,
            float: record.available_float_pct?,
            sector_return: record.sector_avg_return_pct?,
        })
    }
}

pub struct SuitabilityAnalyzer {
    criteria: SuitabilityCriteria,
}

impl Default for SuitabilityAnalyzer {
    fn default() -> Self {
        Self::new(SuitabilityCriteria::default())
    }
}

impl SuitabilityAnalyzer {
    pub fn new(criteria: SuitabilityCriteria) -> Self {
        SuitabilityAnalyzer { criteria }
    }

    pub fn criteria(&self) -> &SuitabilityCriteria {
        &self.criteria
    }

    pub fn evaluate(&self, record: &OfferingRecord) -> Option<SuitabilityEvaluation> {
        let inputs = ScreenInputs::from_record(record)?;
        let c = &self.criteria;
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();
        let mut status = Suitability::Suitable;

        if inputs.holding < c.min_mandatory_holding_pct {
            status = Suitability::Unsuitable;
            reasons.push(format!(
                "Mandatory holding {}% (needs at least {}%)",
                inputs.holding, c.min_mandatory_holding_pct
            ));
        }
        if inputs.float > c.max_available_float_pct {
            status = Suitability::Unsuitable;
            reasons.push(format!(
                "Available float {}% (needs at most {}%)",
                inputs.float, c.max_available_float_pct
            ));
        }
        if inputs.offer_price > record.price_band_high {
            status = Suitability::Unsuitable;
            reasons.push(format!(
                "Offer price {} is above the top of the band {}",
                format_won(inputs.offer_price),
                format_won(record.price_band_high)
            ));
        }
        if inputs.sector_return < c.min_sector_return_pct {
            status = Suitability::Unsuitable;
            reasons.push(format!(
                "Sector ({}) average listing-day return {}% (needs at least {}%)",
                record.sector.as_deref().unwrap_or("unknown"),
                inputs.sector_return,
                c.min_sector_return_pct
            ));
        }

        if status == Suitability::Suitable {
            reasons.push(format!("Mandatory holding {}% (good)", inputs.holding));
            reasons.push(format!("Available float {}% (acceptable)", inputs.float));
            reasons.push(format!(
                "Sector average listing-day return {}% (acceptable)",
                inputs.sector_return
            ));
            if let Some(expected) = record.expected_return_pct {
                reasons.push(format!(
                    "Expected return {}% (target {}~{}%)",
                    expected, c.target_min_return_pct, c.target_max_return_pct
                ));
            }

            if inputs.float > Decimal::from(30) {
                warnings.push(format!(
                    "Available float of {}% is on the high side",
                    inputs.float
                ));
            }
            let midpoint = record
                .price_band_low
                .checked_add(record.price_band_high)
                .map(|sum| sum / Decimal::TWO);
            if midpoint.map_or(false, |mid| inputs.offer_price > mid) {
                warnings.push("Offer price sits in the upper half of the band; expect more volatility".to_string());
            }
            if let Some(expected) = record.expected_return_pct {
                if expected > Decimal::from(20) {
                    warnings.push(format!(
                        "Expected return of {}% is high; volatility may be large",
                        expected
                    ));
                }
            }
        }

        Some(SuitabilityEvaluation {
            offering_id: record.offering_id.clone(),
            company_name: record.company_name.clone(),
            status,
            reasons,
            warnings,
        })
    }

    /// Listing-day sell window, from how tight the tradable supply is.
    pub fn sell_timing(&self, record: &OfferingRecord) -> Option<SellTiming> {
        let holding = record.mandatory_holding_pct?;
        let float = record.available_float_pct?;
        let supply_strength = holding - float / Decimal::TWO;
        let expected = record
            .expected_return_pct
            .map(|e| format!("{}%", e))
            .unwrap_or_else(|| "the target".to_string());

        let (strength, dangerous_period, safe_period, reason) = if supply_strength > Decimal::from(15) {
            (
                SupplyStrength::Strong,
                "14:30~15:20 (profit taking before the close)",
                "09:30~10:30 (first peak after the opening run-up)",
                format!(
                    "Mandatory holding {}% is high and float {}% is low, so early supply favours buyers. Sell as soon as {} is reached.",
                    holding, float, expected
                ),
            )
        } else if supply_strength > Decimal::from(5) {
            (
                SupplyStrength::Medium,
                "10:30~11:00, 14:00~15:20 (weakening demand and profit taking)",
                "09:15~09:45 (right after the opening price forms)",
                format!(
                    "Moderate supply. Sell quickly once the opening price forms; scale out when {} is reached.",
                    expected
                ),
            )
        } else {
            (
                SupplyStrength::Weak,
                "After 09:30 (steady decline as demand fades)",
                "09:00~09:20 (at the opening price)",
                format!(
                    "Weak supply, sell early. Sell immediately at {} or better on the open; consider cutting losses otherwise.",
                    expected
                ),
            )
        };

        Some(SellTiming {
            offering_id: record.offering_id.clone(),
            company_name: record.company_name.clone(),
            supply_strength,
            strength,
            dangerous_period: dangerous_period.to_string(),
            safe_period: safe_period.to_string(),
            reason,
        })
    }

    /// Suitable offerings, highest expected return first.
    pub fn select_suitable<'a>(&self, records: &'a [OfferingRecord]) -> Vec<&'a OfferingRecord> {
        let mut suitable: Vec<&OfferingRecord> = records
            .iter()
            .filter(|r| {
                self.evaluate(r)
                    .map(|e| e.status == Suitability::Suitable)
                    .unwrap_or(false)
            })
            .collect();
        suitable.sort_by(|a, b| expected_return_desc(a, b));
        suitable
    }

    pub fn generate_report(&self, records: &[OfferingRecord]) -> String {
        let c = &self.criteria;
        let rule = "=".repeat(80);
        let thin = "-".repeat(80);
        let mut lines = vec![rule.clone(), "IPO same-day trading analysis".to_string(), rule.clone(), String::new()];

        lines.push("1. Offerings selected for same-day trading".to_string());
        lines.push(thin.clone());
        let suitable = self.select_suitable(records);
        if suitable.is_empty() {
            lines.push(String::new());
            lines.push("  No offering currently qualifies.".to_string());
        }
        for (idx, record) in suitable.iter().enumerate() {
            lines.push(String::new());
            lines.push(format!("[{}] {}", idx + 1, record.company_name));
            lines.push(format!("  Listing date: {}", record.listing_date.format("%Y-%m-%d")));
            if let Some(price) = record.final_offer_price {
                lines.push(format!(
                    "  Offer price: {} (band {}~{})",
                    format_won(price),
                    format_won(record.price_band_low),
                    format_won(record.price_band_high)
                ));
            }
            if let Some(expected) = record.expected_return_pct {
                lines.push(format!("  Expected return: +{}%", expected));
            }
            if let Some(sector) = &record.sector {
                lines.push(format!("  Sector: {}", sector));
            }
            lines.push(String::new());
            lines.push("  [Strengths]".to_string());
            lines.extend(record.strengths.iter().map(|s| format!("    - {}", s)));
            lines.push(String::new());
            lines.push("  [Weaknesses]".to_string());
            lines.extend(record.weaknesses.iter().map(|w| format!("    - {}", w)));
        }

        lines.push(String::new());
        lines.push(String::new());
        lines.push("2. Suitability".to_string());
        lines.push(thin.clone());
        lines.push(String::new());
        lines.push(format!(
            "Target: +{}~{}% on listing day",
            c.target_min_return_pct, c.target_max_return_pct
        ));
        lines.push(String::new());
        lines.push("[Unsuitable if any of these hold]".to_string());
        lines.push(format!("  - Mandatory holding < {}%", c.min_mandatory_holding_pct));
        lines.push(format!("  - Available float > {}%", c.max_available_float_pct));
        lines.push("  - Offer price above the top of the band".to_string());
        lines.push(format!(
            "  - Sector average listing-day return < {}%",
            c.min_sector_return_pct
        ));

        for record in records {
            lines.push(String::new());
            match self.evaluate(record) {
                Some(evaluation) => {
                    let mark = match evaluation.status {
                        Suitability::Suitable => "OK",
                        Suitability::Unsuitable => "NO",
                    };
                    lines.push(format!("[{}] {}", mark, record.company_name));
                    lines.extend(evaluation.reasons.iter().map(|r| format!("    - {}", r)));
                    if !evaluation.warnings.is_empty() {
                        lines.push("  [Warnings]".to_string());
                        lines.extend(evaluation.warnings.iter().map(|w| format!("    ! {}", w)));
                    }
                }
                None => lines.push(format!("[--] {}: not enough data yet", record.company_name)),
            }
        }

        lines.push(String::new());
        lines.push(String::new());
        lines.push("3. Listing-day sell timing".to_string());
        lines.push(thin);
        for record in &suitable {
            if let Some(timing) = self.sell_timing(record) {
                lines.push(String::new());
                lines.push(format!("[{}]", timing.company_name));
                lines.push(format!("  Riskiest window: {}", timing.dangerous_period));
                lines.push(format!("  Safest sell window: {}", timing.safe_period));
                lines.push(format!("  Rationale: {}", timing.reason));
            }
        }

        lines.push(String::new());
        lines.push(rule.clone());
        lines.push("Based on historical data and supply structure; actual markets may differ.".to_string());
        lines.push(rule);
        lines.join("\n")
    }
}

fn expected_return_desc(a: &OfferingRecord, b: &OfferingRecord) -> Ordering {
    match (a.expected_return_pct, b.expected_return_pct) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.offering_id.cmp(&b.offering_id))
}

/// Whole-won amount with thousands separators, e.g. `25,000 KRW`.
pub fn format_won(amount: Decimal) -> String {
    let rounded = amount.round_dp(0);
    let digits = rounded.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.insert(0, '-');
    }
    format!("{} KRW", grouped)
}
