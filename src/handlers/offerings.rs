// src/handlers/offerings.rs
use chrono::NaiveDate;
use log::{debug, info};
use percent_encoding::percent_decode_str;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::{reject, ApiError};
use crate::models::{OfferingView, Phase};
use crate::services::query::{OfferingFilter, SortKey};
use crate::state::AppState;

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 500;

/// Query string of `GET /offerings`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Comma separated, e.g. `phase=subscribing,priced`.
    pub phase: Option<String>,
    pub listed_from: Option<String>,
    pub listed_to: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub stale: Option<bool>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailParams {
    pub reference_price: Option<String>,
}

#[derive(Serialize)]
struct ListResponse<'a> {
    total: usize,
    offset: usize,
    limit: usize,
    sort: SortKey,
    offerings: &'a [OfferingView],
}

fn parse_date_param(name: &str, value: &Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    value
        .as_deref()
        .map(|text| {
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map_err(|_| ApiError::bad_request(format!("{} must be YYYY-MM-DD, got '{}'", name, text)))
        })
        .transpose()
}

/// Path segments reach the handlers still percent-encoded.
pub fn decode_offering_id(raw: &str) -> Result<String, ApiError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|id| id.into_owned())
        .map_err(|_| ApiError::bad_request(format!("offering id '{}' is not valid UTF-8", raw)))
}

impl ListParams {
    pub fn to_query(&self) -> Result<(OfferingFilter, SortKey), ApiError> {
        let phases = match &self.phase {
            Some(list) => list
                .split(',')
                .filter(|p| !p.trim().is_empty())
                .map(Phase::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let sort = match &self.sort {
            Some(sort) => SortKey::from_str(sort)?,
            None => SortKey::default(),
        };
        let filter = OfferingFilter {
            phases,
            listed_from: parse_date_param("listed_from", &self.listed_from)?,
            listed_to: parse_date_param("listed_to", &self.listed_to)?,
            name_contains: self.name.clone(),
            sector: self.sector.clone(),
            stale: self.stale,
        };
        Ok((filter, sort))
    }
}

pub async fn list_offerings(params: ListParams, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!("Handling request to list offerings: {:?}", params);

    let (filter, sort) = params.to_query().map_err(reject)?;
    let results = state.query.list_offerings(filter, sort).map_err(reject)?;

    let offset = params.offset.unwrap_or(0).min(results.len());
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
    let end = offset.saturating_add(limit).min(results.len());
    debug!("Returning offerings {}..{} of {}", offset, end, results.len());

    Ok(warp::reply::json(&ListResponse {
        total: results.len(),
        offset,
        limit,
        sort,
        offerings: &results[offset..end],
    }))
}

pub async fn get_offering(offering_id: String, params: DetailParams, state: Arc<AppState>) -> Result<Json, Rejection> {
    let offering_id = decode_offering_id(&offering_id).map_err(reject)?;
    info!("Handling request to get offering {}", offering_id);

    let reference_price = params
        .reference_price
        .as_deref()
        .map(|text| {
            Decimal::from_str(text.trim())
                .ok()
                .filter(|price| *price > Decimal::ZERO)
                .ok_or_else(|| ApiError::bad_request(format!("reference_price must be a positive number, got '{}'", text)))
        })
        .transpose()
        .map_err(reject)?;

    let view = state
        .query
        .get_offering(&offering_id, reference_price)
        .map_err(reject)?;
    Ok(warp::reply::json(&view))
}
