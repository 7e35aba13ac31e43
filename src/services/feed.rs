// src/services/feed.rs
//! Upstream offering feed and the one place its payloads are normalized.
//!
//! Whatever the provider sends (JSON objects, CSV rows, Korean or English
//! column names, "12,000원" style amounts) is turned into an
//! `OfferingRecord` by `normalize`. Nothing else in the crate looks at raw
//! upstream fields.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Asia::Seoul;
use csv::Reader;
use log::{debug, info};
use regex::Regex;
use reqwest::{Client, Url};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::models::{OfferingRecord, Phase};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream has no offering {0}")]
    UnknownOffering(String),

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed CSV payload: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("cannot normalize offering: {0}")]
    Normalization(String),
}

/// Wire format of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Json,
    Csv,
}

impl FromStr for FeedFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(FeedFormat::Json),
            "csv" => Ok(FeedFormat::Csv),
            other => Err(format!("unknown feed format '{}'", other)),
        }
    }
}

/// Today's date on the exchange calendar.
pub fn exchange_today() -> NaiveDate {
    Utc::now().with_timezone(&Seoul).date_naive()
}

/// An upstream offering as a loose bag of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOffering {
    fields: BTreeMap<String, Value>,
}

fn canonical_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

impl RawOffering {
    pub fn from_json(value: Value) -> Result<Self, FetchError> {
        let object = match value {
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Object(inner)) if map.is_empty() => inner,
                Some(other) => {
                    map.insert("data".to_string(), other);
                    map
                }
                None => map,
            },
            other => {
                return Err(FetchError::Malformed(format!(
                    "expected an object, got {}",
                    other
                )))
            }
        };

        Ok(RawOffering {
            fields: object
                .into_iter()
                .map(|(k, v)| (canonical_key(&k), v))
                .collect(),
        })
    }

    pub fn from_csv_row(headers: &csv::StringRecord, row: &csv::StringRecord) -> Self {
        RawOffering {
            fields: headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (canonical_key(h), Value::String(v.trim().to_string())))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(canonical_key(key), value);
    }

    /// First present, non-blank value among `aliases`.
    fn lookup(&self, aliases: &[&str]) -> Option<&Value> {
        aliases.iter().find_map(|alias| match self.fields.get(*alias) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if is_blank(s) => None,
            Some(v) => Some(v),
        })
    }

    pub fn offering_id(&self) -> Option<String> {
        self.lookup(ID_ALIASES).map(value_text)
    }
}

fn is_blank(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s == "-" || s.eq_ignore_ascii_case("n/a")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

const ID_ALIASES: &[&str] = &["offering_id", "id", "ipo_id", "code", "공모코드"];
const NAME_ALIASES: &[&str] = &["company_name", "name", "company", "종목명", "기업명"];
const PHASE_ALIASES: &[&str] = &["phase", "status", "stage", "단계"];
const SUB_START_ALIASES: &[&str] = &["subscription_start_date", "subscription_start", "sub_start", "청약시작일"];
const SUB_END_ALIASES: &[&str] = &["subscription_end_date", "subscription_end", "sub_end", "청약종료일"];
const LISTING_ALIASES: &[&str] = &["listing_date", "listed_on", "상장일"];
const BAND_LOW_ALIASES: &[&str] = &["price_band_low", "price_band_min", "band_low", "희망공모가하단"];
const BAND_HIGH_ALIASES: &[&str] = &["price_band_high", "price_band_max", "band_high", "희망공모가상단"];
const BAND_ALIASES: &[&str] = &["price_band", "band", "희망공모가"];
const OFFER_PRICE_ALIASES: &[&str] = &["final_offer_price", "offer_price", "ipo_price", "확정공모가", "공모가"];
const SHARES_ALIASES: &[&str] = &["total_shares_offered", "shares_offered", "total_shares", "공모주식수"];
const RATIO_ALIASES: &[&str] = &["subscription_competition_ratio", "competition_ratio", "청약경쟁률"];
const SECTOR_ALIASES: &[&str] = &["sector", "industry", "업종"];
const HOLDING_ALIASES: &[&str] = &["mandatory_holding_pct", "lockup_pct", "의무보유확약"];
const FLOAT_ALIASES: &[&str] = &["available_float_pct", "float_pct", "유통가능물량"];
const SECTOR_RETURN_ALIASES: &[&str] = &["sector_avg_return_pct", "sector_return_pct", "유사업종수익률"];
const EXPECTED_RETURN_ALIASES: &[&str] = &["expected_return_pct", "expected_return", "예상수익률"];
const REFERENCE_ALIASES: &[&str] = &["reference_price", "market_price", "expected_listing_price"];
const STRENGTH_ALIASES: &[&str] = &["strengths", "장점"];
const WEAKNESS_ALIASES: &[&str] = &["weaknesses", "단점"];

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("number pattern is valid"))
}

/// First number in `text`, ignoring thousands separators and units:
/// `"12,000원"`, `"1,250.5:1"` and `"15.5%"` all parse.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let found = number_pattern().find(text)?;
    Decimal::from_str(&found.as_str().replace(',', "")).ok()
}

/// A JSON number as a decimal. Small and large floats print in exponent
/// form (`1e-5`), which the text pattern would misread.
fn number_decimal(n: &serde_json::Number) -> Option<Decimal> {
    let text = n.to_string();
    Decimal::from_str_exact(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Accepts ISO dates and the dotted/Korean forms common in Korean feeds.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim().trim_end_matches('.');
    ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%Y%m%d", "%Y년 %m월 %d일"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Phase names in English or Korean.
pub fn parse_phase(text: &str) -> Option<Phase> {
    if let Ok(phase) = Phase::from_str(text) {
        return Some(phase);
    }
    match text.trim() {
        "공고" | "예정" | "수요예측" => Some(Phase::Announced),
        "청약" | "청약중" => Some(Phase::Subscribing),
        "확정" | "공모가확정" | "청약완료" => Some(Phase::Priced),
        "상장" | "상장완료" => Some(Phase::Listed),
        _ => None,
    }
}

struct Fields<'a> {
    raw: &'a RawOffering,
    id: String,
}

impl<'a> Fields<'a> {
    fn text(&self, aliases: &[&str]) -> Option<String> {
        self.raw.lookup(aliases).map(value_text)
    }

    fn required_text(&self, aliases: &[&str]) -> Result<String, FetchError> {
        self.text(aliases).ok_or_else(|| self.missing(aliases))
    }

    fn decimal(&self, aliases: &[&str]) -> Result<Option<Decimal>, FetchError> {
        let parsed = match self.raw.lookup(aliases) {
            None => return Ok(None),
            Some(Value::Number(n)) => number_decimal(n),
            Some(other) => parse_decimal(&value_text(other)),
        };
        match parsed {
            Some(value) => Ok(Some(value)),
            None => Err(FetchError::Normalization(format!(
                "{}: '{}' is not a number ({})",
                self.id,
                self.text(aliases).unwrap_or_default(),
                aliases[0]
            ))),
        }
    }

    fn date(&self, aliases: &[&str]) -> Result<NaiveDate, FetchError> {
        let text = self.required_text(aliases)?;
        parse_date(&text).ok_or_else(|| {
            FetchError::Normalization(format!("{}: '{}' is not a date ({})", self.id, text, aliases[0]))
        })
    }

    fn list(&self, aliases: &[&str]) -> Vec<String> {
        match self.raw.lookup(aliases) {
            Some(Value::Array(items)) => items.iter().map(value_text).filter(|s| !is_blank(s)).collect(),
            Some(Value::String(s)) => s
                .split(';')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn missing(&self, aliases: &[&str]) -> FetchError {
        FetchError::Normalization(format!("{}: missing field {}", self.id, aliases[0]))
    }

    fn price_band(&self) -> Result<(Decimal, Decimal), FetchError> {
        let low = self.decimal(BAND_LOW_ALIASES)?;
        let high = self.decimal(BAND_HIGH_ALIASES)?;
        if let (Some(low), Some(high)) = (low, high) {
            return Ok((low, high));
        }
        // Combined form, e.g. "23,000~27,000원".
        let text = self.required_text(BAND_ALIASES)?;
        let bounds: Vec<Decimal> = number_pattern()
            .find_iter(&text)
            .filter_map(|m| Decimal::from_str(&m.as_str().replace(',', "")).ok())
            .collect();
        match bounds.as_slice() {
            [low, high] => Ok((*low, *high)),
            [single] => Ok((*single, *single)),
            _ => Err(FetchError::Normalization(format!(
                "{}: cannot read price band '{}'",
                self.id, text
            ))),
        }
    }
}

/// Turns an upstream payload into a canonical record.
///
/// When the provider does not send a phase, it is inferred from the fields
/// present and from `today` on the exchange calendar. The result is not
/// validated here; `OfferingStore::upsert` does that.
pub fn normalize(raw: &RawOffering, today: NaiveDate) -> Result<OfferingRecord, FetchError> {
    let id = raw
        .offering_id()
        .ok_or_else(|| FetchError::Normalization("payload without an offering id".to_string()))?;
    let f = Fields { raw, id: id.clone() };

    let subscription_start_date = f.date(SUB_START_ALIASES)?;
    let subscription_end_date = f.date(SUB_END_ALIASES)?;
    let listing_date = f.date(LISTING_ALIASES)?;
    let (price_band_low, price_band_high) = f.price_band()?;
    let final_offer_price = f.decimal(OFFER_PRICE_ALIASES)?;
    let subscription_competition_ratio = f.decimal(RATIO_ALIASES)?;

    let shares = f.decimal(SHARES_ALIASES)?.ok_or_else(|| f.missing(SHARES_ALIASES))?;
    let whole_shares = if shares.fract().is_zero() { shares.to_u64() } else { None };
    let total_shares_offered = whole_shares.ok_or_else(|| FetchError::Normalization(format!("{}: share count {} is not a whole number", id, shares)))?;

    let phase = match f.text(PHASE_ALIASES) {
        Some(text) => parse_phase(&text)
            .ok_or_else(|| FetchError::Normalization(format!("{}: unknown phase '{}'", id, text)))?,
        None => {
            if final_offer_price.is_some() && listing_date <= today {
                Phase::Listed
            } else if final_offer_price.is_some() {
                Phase::Priced
            } else if subscription_competition_ratio.is_some() || subscription_start_date <= today {
                Phase::Subscribing
            } else {
                Phase::Announced
            }
        }
    };

    Ok(OfferingRecord {
        offering_id: id.clone(),
        company_name: f.required_text(NAME_ALIASES)?,
        phase,
        subscription_start_date,
        subscription_end_date,
        listing_date,
        price_band_low,
        price_band_high,
        final_offer_price,
        total_shares_offered,
        subscription_competition_ratio,
        last_refreshed_at: None,
        sector: f.text(SECTOR_ALIASES),
        mandatory_holding_pct: f.decimal(HOLDING_ALIASES)?,
        available_float_pct: f.decimal(FLOAT_ALIASES)?,
        sector_avg_return_pct: f.decimal(SECTOR_RETURN_ALIASES)?,
        expected_return_pct: f.decimal(EXPECTED_RETURN_ALIASES)?,
        reference_price: f.decimal(REFERENCE_ALIASES)?,
        strengths: f.list(STRENGTH_ALIASES),
        weaknesses: f.list(WEAKNESS_ALIASES),
    })
}

/// Where the refresh scheduler gets offerings from.
#[async_trait]
pub trait OfferingSource: Send + Sync {
    /// Ids of every offering the provider currently lists.
    async fn list_offering_ids(&self) -> Result<Vec<String>, FetchError>;

    async fn fetch_offering(&self, offering_id: &str) -> Result<RawOffering, FetchError>;
}

/// HTTP provider: `GET {base}/offerings` for the index and
/// `GET {base}/offerings/{id}` for one offering.
pub struct HttpOfferingSource {
    client: Client,
    base_url: Url,
    format: FeedFormat,
}

impl HttpOfferingSource {
    pub fn new(base_url: &str, format: FeedFormat, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("ipo_analyzer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::Malformed(format!("invalid feed URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::Malformed(format!("feed URL '{}' cannot take a path", base_url)));
        }
        Ok(HttpOfferingSource {
            client,
            base_url,
            format,
        })
    }

    /// `{base}/offerings[/{id}]`, with the id percent-encoded as one segment.
    pub fn offerings_url(&self, offering_id: Option<&str>) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed(format!("feed URL '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push("offerings")
            .extend(offering_id);
        Ok(url)
    }

    async fn get_text(&self, url: Url) -> Result<String, FetchError> {
        debug!("Fetching {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    fn parse_rows(&self, body: &str) -> Result<Vec<RawOffering>, FetchError> {
        match self.format {
            FeedFormat::Json => match serde_json::from_str::<Value>(body)? {
                Value::Array(items) => items.into_iter().map(RawOffering::from_json).collect(),
                other => Ok(vec![RawOffering::from_json(other)?]),
            },
            FeedFormat::Csv => {
                let mut rdr = Reader::from_reader(body.as_bytes());
                let headers = rdr.headers()?.clone();
                let mut rows = Vec::new();
                for record in rdr.records() {
                    rows.push(RawOffering::from_csv_row(&headers, &record?));
                }
                Ok(rows)
            }
        }
    }
}

#[async_trait]
impl OfferingSource for HttpOfferingSource {
    async fn list_offering_ids(&self) -> Result<Vec<String>, FetchError> {
        let body = self.get_text(self.offerings_url(None)?).await?;

        // A JSON index may also be a plain array of id strings.
        if self.format == FeedFormat::Json {
            if let Ok(ids) = serde_json::from_str::<Vec<String>>(&body) {
                return Ok(ids);
            }
        }

        let rows = self.parse_rows(&body)?;
        let ids: Vec<String> = rows.iter().filter_map(RawOffering::offering_id).collect();
        info!("Upstream index lists {} offerings", ids.len());
        Ok(ids)
    }

    async fn fetch_offering(&self, offering_id: &str) -> Result<RawOffering, FetchError> {
        let body = self.get_text(self.offerings_url(Some(offering_id))?).await?;
        self.parse_rows(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Malformed(format!("empty payload for {}", offering_id)))
    }
}

/// Serves the built-in sample offerings as if they came from upstream.
pub struct SampleOfferingSource {
    offerings: Vec<OfferingRecord>,
}

impl SampleOfferingSource {
    pub fn new(offerings: Vec<OfferingRecord>) -> Self {
        SampleOfferingSource { offerings }
    }
}

#[async_trait]
impl OfferingSource for SampleOfferingSource {
    async fn list_offering_ids(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.offerings.iter().map(|o| o.offering_id.clone()).collect())
    }

    async fn fetch_offering(&self, offering_id: &str) -> Result<RawOffering, FetchError> {
        let record = self
            .offerings
            .iter()
            .find(|o| o.offering_id == offering_id)
            .ok_or_else(|| FetchError::UnknownOffering(offering_id.to_string()))?;
        RawOffering::from_json(serde_json::to_value(record)?)
    }
}
