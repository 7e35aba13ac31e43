// src/handlers/analysis.rs
use chrono::NaiveDate;
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::{reject, ApiError};
use super::offerings::decode_offering_id;
use crate::models::{OfferingRecord, Phase};
use crate::services::sample::sample_offerings;
use crate::services::suitability::{format_won, SellTiming, Suitability, SuitabilityEvaluation};
use crate::state::AppState;

/// A stock as the analysis form submits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStock {
    pub name: String,
    pub listing_date: NaiveDate,
    pub ipo_price: Decimal,
    pub price_band_min: Decimal,
    pub price_band_max: Decimal,
    pub mandatory_holding_pct: Decimal,
    pub available_float_pct: Decimal,
    pub sector: String,
    pub sector_avg_return_pct: Decimal,
    pub expected_return_pct: Decimal,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

impl AnalysisStock {
    /// A priced offering that only carries what the screen looks at. It is
    /// never stored, so subscription dates collapse onto the listing date.
    fn into_record(self, index: usize) -> OfferingRecord {
        let mut record = OfferingRecord::announced(
            format!("adhoc-{}", index + 1),
            self.name,
            (self.listing_date, self.listing_date),
            self.listing_date,
            (self.price_band_min, self.price_band_max),
            1,
        );
        record.phase = Phase::Priced;
        record.final_offer_price = Some(self.ipo_price);
        record.mandatory_holding_pct = Some(self.mandatory_holding_pct);
        record.available_float_pct = Some(self.available_float_pct);
        record.sector = Some(self.sector);
        record.sector_avg_return_pct = Some(self.sector_avg_return_pct);
        record.expected_return_pct = Some(self.expected_return_pct);
        record.strengths = self.strengths;
        record.weaknesses = self.weaknesses;
        record
    }

    fn from_record(record: &OfferingRecord) -> Option<Self> {
        Some(AnalysisStock {
            name: record.company_name.clone(),
            listing_date: record.listing_date,
            ipo_price: record.final_offer_price?,
            price_band_min: record.price_band_low,
            price_band_max: record.price_band_high,
            mandatory_holding_pct: record.mandatory_holding_pct?,
            available_float_pct: record.available_float_pct?,
            sector: record.sector.clone()?,
            sector_avg_return_pct: record.sector_avg_return_pct?,
            expected_return_pct: record.expected_return_pct?,
            strengths: record.strengths.clone(),
            weaknesses: record.weaknesses.clone(),
        })
    }
}

fn default_use_sample() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default = "default_use_sample")]
    pub use_sample: bool,
    #[serde(default)]
    pub stocks: Vec<AnalysisStock>,
}

#[derive(Debug, Serialize)]
struct StockAnalysis {
    name: String,
    listing_date: NaiveDate,
    ipo_price: Option<Decimal>,
    price_band: String,
    expected_return: Option<Decimal>,
    sector: Option<String>,
    status: Suitability,
    reasons: Vec<String>,
    warnings: Vec<String>,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    timing: Option<SellTiming>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    success: bool,
    suitable_count: usize,
    total_count: usize,
    suitable_stocks: Vec<StockAnalysis>,
    unsuitable_stocks: Vec<StockAnalysis>,
}

#[derive(Debug, Serialize)]
struct OfferingAnalysis {
    offering_id: String,
    evaluation: Option<SuitabilityEvaluation>,
    timing: Option<SellTiming>,
}

fn analyze_records(state: &AppState, records: &[OfferingRecord]) -> AnalyzeResponse {
    let mut suitable_stocks = Vec::new();
    let mut unsuitable_stocks = Vec::new();

    for record in records {
        let Some(evaluation) = state.analyzer.evaluate(record) else {
            continue;
        };
        let timing = match evaluation.status {
            Suitability::Suitable => state.analyzer.sell_timing(record),
            Suitability::Unsuitable => None,
        };
        let entry = StockAnalysis {
            name: record.company_name.clone(),
            listing_date: record.listing_date,
            ipo_price: record.final_offer_price,
            price_band: format!(
                "{}~{}",
                format_won(record.price_band_low),
                format_won(record.price_band_high)
            ),
            expected_return: record.expected_return_pct,
            sector: record.sector.clone(),
            status: evaluation.status,
            reasons: evaluation.reasons,
            warnings: evaluation.warnings,
            strengths: record.strengths.clone(),
            weaknesses: record.weaknesses.clone(),
            timing,
        };
        match entry.status {
            Suitability::Suitable => suitable_stocks.push(entry),
            Suitability::Unsuitable => unsuitable_stocks.push(entry),
        }
    }

    AnalyzeResponse {
        success: true,
        suitable_count: suitable_stocks.len(),
        total_count: suitable_stocks.len() + unsuitable_stocks.len(),
        suitable_stocks,
        unsuitable_stocks,
    }
}

/// Screens submitted stocks (or the sample set) without touching the store.
pub async fn analyze(request: AnalyzeRequest, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!(
        "Handling analysis request (sample: {}, stocks: {})",
        request.use_sample,
        request.stocks.len()
    );

    let records = if request.use_sample {
        sample_offerings()
    } else {
        if request.stocks.is_empty() {
            return Err(reject(ApiError::bad_request("no stocks submitted")));
        }
        let records: Vec<OfferingRecord> = request
            .stocks
            .into_iter()
            .enumerate()
            .map(|(idx, stock)| stock.into_record(idx))
            .collect();
        for record in &records {
            record.validate().map_err(reject)?;
        }
        records
    };

    Ok(warp::reply::json(&analyze_records(&state, &records)))
}

pub async fn get_sample_data() -> Result<Json, Rejection> {
    let stocks: Vec<AnalysisStock> = sample_offerings()
        .iter()
        .filter_map(AnalysisStock::from_record)
        .collect();
    Ok(warp::reply::json(&serde_json::json!({
        "success": true,
        "stocks": stocks,
    })))
}

pub async fn get_offering_analysis(offering_id: String, state: Arc<AppState>) -> Result<Json, Rejection> {
    let offering_id = decode_offering_id(&offering_id).map_err(reject)?;
    info!("Handling analysis request for offering {}", offering_id);

    let stored = state.store.get(&offering_id).map_err(reject)?;
    let evaluation = state.analyzer.evaluate(&stored.record);
    let timing = match evaluation.as_ref().map(|e| e.status) {
        Some(Suitability::Suitable) => state.analyzer.sell_timing(&stored.record),
        _ => None,
    };

    Ok(warp::reply::json(&OfferingAnalysis {
        offering_id,
        evaluation,
        timing,
    }))
}

pub async fn get_report(state: Arc<AppState>) -> Result<impl warp::Reply, Rejection> {
    info!("Handling request for the analysis report");

    let mut records: Vec<OfferingRecord> = state
        .store
        .list_all()
        .map(|stored| stored.record.clone())
        .collect();
    records.sort_by(|a, b| {
        a.listing_date
            .cmp(&b.listing_date)
            .then_with(|| a.offering_id.cmp(&b.offering_id))
    });

    Ok(warp::reply::with_header(
        state.analyzer.generate_report(&records),
        "content-type",
        "text/plain; charset=utf-8",
    ))
}
