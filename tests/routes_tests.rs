//! HTTP surface, exercised through `warp::test`.

mod common;

use common::{announced, date, priced, won};
use ipo_analyzer::models::Phase;
use ipo_analyzer::routes::routes;
use ipo_analyzer::services::query::QueryService;
use ipo_analyzer::services::store::OfferingStore;
use ipo_analyzer::state::AppState;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;

async fn state() -> Arc<AppState> {
    let store = Arc::new(OfferingStore::new());
    store.upsert(priced("A", 500, date(2024, 3, 1))).await.unwrap();
    store.upsert(priced("B", 500, date(2024, 2, 15))).await.unwrap();
    store.upsert(announced("C", date(2024, 4, 2))).await.unwrap();
    let query = QueryService::new(Arc::clone(&store), Duration::from_secs(300));
    Arc::new(AppState::new(store, query))
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn ids(body: &Value) -> Vec<String> {
    body["offerings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["offering_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_list_offerings_default_ranking() {
    let api = routes(state().await);
    let resp = warp::test::request().method("GET").path("/offerings").reply(&api).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["total"], json!(3));
    assert_eq!(body["sort"], json!("competition"));
    assert_eq!(ids(&body), vec!["B", "A", "C"]);
}

#[tokio::test]
async fn test_list_offerings_filters_and_pages() {
    let api = routes(state().await);

    let resp = warp::test::request()
        .method("GET")
        .path("/offerings?phase=priced&sort=listing_date&limit=1&offset=1")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["total"], json!(2));
    assert_eq!(ids(&body), vec!["A"]);

    let resp = warp::test::request()
        .method("GET")
        .path("/offerings?listed_from=2024-03-01&listed_to=2024-12-31")
        .reply(&api)
        .await;
    assert_eq!(ids(&body_json(resp.body())), vec!["A", "C"]);
}

#[tokio::test]
async fn test_list_offerings_rejects_bad_parameters() {
    let api = routes(state().await);
    for query in [
        "/offerings?listed_from=2024-13-01",
        "/offerings?listed_from=2024-05-01&listed_to=2024-04-01",
        "/offerings?sort=hype",
        "/offerings?phase=rumoured",
        "/offerings?limit=many",
    ] {
        let resp = warp::test::request().method("GET").path(query).reply(&api).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", query);
        assert!(body_json(resp.body())["error"].is_string());
    }
}

#[tokio::test]
async fn test_get_offering_with_reference_price() {
    let api = routes(state().await);
    let resp = warp::test::request()
        .method("GET")
        .path("/offerings/A?reference_price=12000")
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["offering_id"], json!("A"));
    assert_eq!(body["phase"], json!("priced"));
    assert_eq!(body["stale"], json!(false));
    assert_eq!(body["metrics"]["estimated_listing_gain_pct"], json!("-8.33"));
}

#[tokio::test]
async fn test_encoded_offering_ids_are_decoded() {
    let state = state().await;
    state.store.upsert(announced("KR/7001", date(2024, 5, 2))).await.unwrap();
    state.store.upsert(announced("한빛", date(2024, 5, 3))).await.unwrap();
    let api = routes(state);

    let resp = warp::test::request()
        .method("GET")
        .path("/offerings/KR%2F7001")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body())["offering_id"], json!("KR/7001"));

    let resp = warp::test::request()
        .method("GET")
        .path("/offerings/%ED%95%9C%EB%B9%9B/analysis")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body())["offering_id"], json!("한빛"));
}

#[tokio::test]
async fn test_get_offering_errors() {
    let api = routes(state().await);

    let resp = warp::test::request().method("GET").path("/offerings/NOPE").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = warp::test::request()
        .method("GET")
        .path("/offerings/A?reference_price=-5")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extreme_reference_price_leaves_gain_unknown() {
    let api = routes(state().await);
    let resp = warp::test::request()
        .method("GET")
        .path("/offerings/A?reference_price=0.000000000000000000000001")
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["metrics"]["estimated_listing_gain_pct"], Value::Null);
}

#[tokio::test]
async fn test_analyze_sample_set() {
    let api = routes(state().await);
    let resp = warp::test::request()
        .method("POST")
        .path("/analysis")
        .json(&json!({ "use_sample": true }))
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["total_count"], json!(5));
    assert_eq!(body["suitable_count"], json!(3));
    let names: Vec<&str> = body["suitable_stocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"BioHealthcare"));
    assert!(body["suitable_stocks"][0]["timing"].is_object());
}

#[tokio::test]
async fn test_analyze_submitted_stocks() {
    let api = routes(state().await);
    let stock = json!({
        "name": "Hanul Materials",
        "listing_date": "2026-11-20",
        "ipo_price": "20000",
        "price_band_min": "18000",
        "price_band_max": "22000",
        "mandatory_holding_pct": "3",
        "available_float_pct": "50",
        "sector": "Chemicals",
        "sector_avg_return_pct": "2",
        "expected_return_pct": "40"
    });
    let resp = warp::test::request()
        .method("POST")
        .path("/analysis")
        .json(&json!({ "use_sample": false, "stocks": [stock] }))
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["suitable_count"], json!(0));
    let rejected = &body["unsuitable_stocks"][0];
    assert_eq!(rejected["status"], json!("unsuitable"));
    assert_eq!(rejected["reasons"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_analyze_price_band_at_decimal_limit() {
    let api = routes(state().await);
    let stock = json!({
        "name": "Overflow Holdings",
        "listing_date": "2026-11-20",
        "ipo_price": "72000000000000000000000000000",
        "price_band_min": "70000000000000000000000000000",
        "price_band_max": "75000000000000000000000000000",
        "mandatory_holding_pct": "20",
        "available_float_pct": "20",
        "sector": "Chemicals",
        "sector_avg_return_pct": "10",
        "expected_return_pct": "15"
    });
    let resp = warp::test::request()
        .method("POST")
        .path("/analysis")
        .json(&json!({ "use_sample": false, "stocks": [stock] }))
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["suitable_count"], json!(1));
    assert_eq!(body["suitable_stocks"][0]["warnings"], json!([]));
}

#[tokio::test]
async fn test_analyze_rejects_empty_or_malformed_requests() {
    let api = routes(state().await);

    let resp = warp::test::request()
        .method("POST")
        .path("/analysis")
        .json(&json!({ "use_sample": false }))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = warp::test::request()
        .method("POST")
        .path("/analysis")
        .header("content-type", "application/json")
        .body("{ not json")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sample_data_and_report() {
    let api = routes(state().await);

    let resp = warp::test::request().method("GET").path("/analysis/sample").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body())["stocks"].as_array().unwrap().len(), 5);

    let resp = warp::test::request().method("GET").path("/analysis/report").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(resp.body().to_vec()).unwrap();
    assert!(text.contains("IPO same-day trading analysis"));
}

#[tokio::test]
async fn test_offering_analysis_without_screening_data() {
    let api = routes(state().await);
    let resp = warp::test::request()
        .method("GET")
        .path("/offerings/C/analysis")
        .reply(&api)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["offering_id"], json!("C"));
    assert_eq!(body["evaluation"], Value::Null);
}

#[tokio::test]
async fn test_health_reports_store_and_cache() {
    let state = state().await;
    let mut stale = priced("D", 10, date(2024, 5, 1));
    stale.phase = Phase::Listed;
    stale.final_offer_price = Some(won(9000));
    state.store.upsert(stale).await.unwrap();
    for _ in 0..3 {
        state.store.record_failure("D", "timeout").await.unwrap();
    }
    let api = routes(Arc::clone(&state));

    warp::test::request().method("GET").path("/offerings").reply(&api).await;
    let resp = warp::test::request().method("GET").path("/health").reply(&api).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["offerings"], json!(4));
    assert_eq!(body["stale"], json!(1));
    assert_eq!(body["cache"]["misses"], json!(1));
    assert_eq!(body["last_cycle"], Value::Null);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let api = routes(state().await);
    let resp = warp::test::request().method("GET").path("/nowhere").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
