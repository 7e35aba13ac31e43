// src/routes.rs
use log::{error, info};
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::analysis::{analyze, get_offering_analysis, get_report, get_sample_data};
use crate::handlers::error::ApiError;
use crate::handlers::health::get_health;
use crate::handlers::offerings::{get_offering, list_offerings, DetailParams, ListParams};
use crate::state::AppState;

/// Largest accepted analysis request body.
const MAX_BODY_BYTES: u64 = 256 * 1024;

// Maps every rejection to a JSON error body with a 4xx status where the
// caller is at fault.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if let Some(invalid) = err.find::<warp::reject::InvalidQuery>() {
        code = StatusCode::BAD_REQUEST;
        message = invalid.to_string();
    } else if let Some(invalid) = err.find::<warp::filters::body::BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        message = invalid.to_string();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = StatusCode::PAYLOAD_TOO_LARGE;
        message = "Payload Too Large".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        error!("Unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let state_filter = warp::any().map(move || state.clone());

    let list_route = warp::path!("offerings")
        .and(warp::get())
        .and(warp::query::<ListParams>())
        .and(state_filter.clone())
        .and_then(list_offerings);

    let detail_route = warp::path!("offerings" / String)
        .and(warp::get())
        .and(warp::query::<DetailParams>())
        .and(state_filter.clone())
        .and_then(get_offering);

    let offering_analysis_route = warp::path!("offerings" / String / "analysis")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_offering_analysis);

    let analyze_route = warp::path!("analysis")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(analyze);

    let report_route = warp::path!("analysis" / "report")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_report);

    let sample_route = warp::path!("analysis" / "sample")
        .and(warp::get())
        .and_then(get_sample_data);

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_health);

    info!("All routes configured successfully.");

    list_route
        .or(detail_route)
        .or(offering_analysis_route)
        .or(analyze_route)
        .or(report_route)
        .or(sample_route)
        .or(health_route)
        .recover(handle_rejection)
}
