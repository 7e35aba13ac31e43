//! Refresh scheduler against scripted and HTTP upstreams.

mod common;

use common::{announced, date, priced, won, ScriptedSource};
use ipo_analyzer::config::RefreshConfig;
use ipo_analyzer::models::Phase;
use ipo_analyzer::services::feed::{FeedFormat, HttpOfferingSource};
use ipo_analyzer::services::scheduler::RefreshScheduler;
use ipo_analyzer::services::store::OfferingStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> RefreshConfig {
    RefreshConfig {
        interval: Duration::from_secs(3600),
        fetch_timeout: Duration::from_secs(2),
        retention_days: 30,
        concurrency: 4,
    }
}

fn scheduler_for(source: Arc<ScriptedSource>, store: Arc<OfferingStore>) -> RefreshScheduler {
    RefreshScheduler::new(store, source, config())
}

#[tokio::test]
async fn test_discovers_and_refreshes_upstream_offerings() {
    let store = Arc::new(OfferingStore::new());
    let source = Arc::new(ScriptedSource::new(vec![
        announced("A", date(2031, 3, 1)),
        priced("B", 250, date(2031, 2, 15)),
    ]));
    let scheduler = scheduler_for(Arc::clone(&source), Arc::clone(&store));

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!((report.discovered, report.refreshed, report.failed), (2, 2, 0));
    assert_eq!(store.len(), 2);

    let b = store.get("B").unwrap();
    assert_eq!(b.record.phase, Phase::Priced);
    assert_eq!(b.record.final_offer_price, Some(won(11000)));
    assert!(b.record.last_refreshed_at.is_some());
    assert_eq!(scheduler.last_report(), Some(report));
}

#[tokio::test]
async fn test_three_failures_mark_stale_and_keep_last_good_record() {
    let store = Arc::new(OfferingStore::new());
    let source = Arc::new(ScriptedSource::new(vec![priced("A", 120, date(2031, 3, 1))]));
    let scheduler = scheduler_for(Arc::clone(&source), Arc::clone(&store));

    scheduler.run_cycle().await.unwrap();
    let good = store.get("A").unwrap().record.clone();

    source.fail("A");
    for expected in 1..=3u32 {
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = store.get("A").unwrap();
        assert_eq!(stored.status.consecutive_failures, expected);
        assert_eq!(stored.status.stale, expected >= 3);
        assert_eq!(stored.record, good);
    }
    assert!(store.get("A").unwrap().status.last_error.as_deref().unwrap().contains("503"));

    source.recover("A");
    scheduler.run_cycle().await.unwrap();
    let stored = store.get("A").unwrap();
    assert_eq!(stored.status.consecutive_failures, 0);
    assert!(!stored.status.stale);
    assert!(stored.record.last_refreshed_at > good.last_refreshed_at);
}

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let store = Arc::new(OfferingStore::new());
    let source = Arc::new(ScriptedSource::new(vec![announced("A", date(2031, 3, 1))]));
    source.set_delay(Duration::from_millis(300));
    let scheduler = Arc::new(scheduler_for(Arc::clone(&source), Arc::clone(&store)));

    let running = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run_cycle().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(scheduler.run_cycle().await, None);
    assert_eq!(scheduler.skipped_cycles(), 1);

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.refreshed, 1);
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_settled_listings_are_not_refetched() {
    let store = Arc::new(OfferingStore::new());
    let mut old = priced("OLD", 800, date(2020, 1, 10));
    old.phase = Phase::Listed;
    store.upsert(old.clone()).await.unwrap();

    let source = Arc::new(ScriptedSource::new(vec![old]));
    let scheduler = scheduler_for(Arc::clone(&source), Arc::clone(&store));

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!((report.inactive, report.refreshed, report.discovered), (1, 0, 0));
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
}

#[test]
fn test_activity_window() {
    let today = date(2024, 6, 30);
    let mut record = priced("A", 10, date(2024, 5, 31));
    assert!(RefreshScheduler::is_active(&record, today, 30));

    record.phase = Phase::Listed;
    assert!(RefreshScheduler::is_active(&record, today, 30));
    assert!(!RefreshScheduler::is_active(&record, today, 29));
}

#[tokio::test]
async fn test_index_outage_still_refreshes_known_offerings() {
    let store = Arc::new(OfferingStore::new());
    store.upsert(announced("A", date(2031, 3, 1))).await.unwrap();
    let source = Arc::new(ScriptedSource::new(vec![
        announced("A", date(2031, 3, 1)),
        announced("B", date(2031, 4, 1)),
    ]));
    source.fail_index(true);
    let scheduler = scheduler_for(Arc::clone(&source), Arc::clone(&store));

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!((report.discovered, report.refreshed), (0, 1));
    assert!(!store.contains("B"));
}

#[tokio::test]
async fn test_slow_fetch_counts_as_failure() {
    let store = Arc::new(OfferingStore::new());
    store.upsert(announced("A", date(2031, 3, 1))).await.unwrap();
    let source = Arc::new(ScriptedSource::new(vec![announced("A", date(2031, 3, 1))]));
    source.set_delay(Duration::from_millis(300));
    let scheduler = RefreshScheduler::new(
        Arc::clone(&store),
        source,
        RefreshConfig {
            fetch_timeout: Duration::from_millis(50),
            ..config()
        },
    );

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);
    let status = store.get("A").unwrap().status.clone();
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_failed_discovery_creates_nothing() {
    let store = Arc::new(OfferingStore::new());
    let source = Arc::new(ScriptedSource::new(vec![announced("NEW", date(2031, 3, 1))]));
    source.fail("NEW");
    let scheduler = scheduler_for(Arc::clone(&source), Arc::clone(&store));

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!((report.discovered, report.failed), (1, 1));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_invalid_upstream_record_is_rejected() {
    let store = Arc::new(OfferingStore::new());
    store.upsert(priced("A", 100, date(2031, 3, 1))).await.unwrap();
    // Upstream went back to "announced": the store refuses the regression.
    let source = Arc::new(ScriptedSource::new(vec![announced("A", date(2031, 3, 1))]));
    let scheduler = scheduler_for(Arc::clone(&source), Arc::clone(&store));

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);
    let stored = store.get("A").unwrap();
    assert_eq!(stored.record.phase, Phase::Priced);
    assert!(stored.status.last_error.as_deref().unwrap().contains("regress"));
}

#[tokio::test]
async fn test_refresh_from_json_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/offerings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["KR-7001"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/offerings/KR-7001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "공모코드": "KR-7001",
                "종목명": "한빛소재",
                "단계": "청약",
                "청약시작일": "2031.03.02",
                "청약종료일": "2031.03.03",
                "상장일": "2031-03-12",
                "희망공모가": "23,000~27,000원",
                "공모주식수": "1,200,000주",
                "청약경쟁률": "1,250.5:1"
            }
        })))
        .mount(&server)
        .await;

    let store = Arc::new(OfferingStore::new());
    let source = HttpOfferingSource::new(&server.uri(), FeedFormat::Json, Duration::from_secs(5)).unwrap();
    let scheduler = RefreshScheduler::new(Arc::clone(&store), Arc::new(source), config());

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!((report.discovered, report.refreshed), (1, 1));

    let record = store.get("KR-7001").unwrap().record.clone();
    assert_eq!(record.company_name, "한빛소재");
    assert_eq!(record.phase, Phase::Subscribing);
    assert_eq!(record.listing_date, date(2031, 3, 12));
    assert_eq!((record.price_band_low, record.price_band_high), (won(23000), won(27000)));
    assert_eq!(record.total_shares_offered, 1_200_000);
    assert_eq!(record.subscription_competition_ratio, "1250.5".parse().ok());
}

#[tokio::test]
async fn test_feed_ids_are_escaped_in_request_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/offerings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["KR/7001?a"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/offerings/KR%2F7001%3Fa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "KR/7001?a",
            "name": "Slash Industries",
            "subscription_start": "2031-03-02",
            "subscription_end": "2031-03-03",
            "listing_date": "2031-03-12",
            "price_band_low": 9000,
            "price_band_high": 11000,
            "shares_offered": 500000,
            "phase": "announced"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(OfferingStore::new());
    let source = HttpOfferingSource::new(&server.uri(), FeedFormat::Json, Duration::from_secs(5)).unwrap();
    let scheduler = RefreshScheduler::new(Arc::clone(&store), Arc::new(source), config());

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!((report.refreshed, report.failed), (1, 0));
    assert_eq!(store.get("KR/7001?a").unwrap().record.company_name, "Slash Industries");
}

#[tokio::test]
async fn test_refresh_from_csv_feed() {
    let header = "offering_id,company_name,subscription_start_date,subscription_end_date,listing_date,price_band_low,price_band_high,final_offer_price,total_shares_offered\n";
    let row = "CSV-1,Daehan Logistics,2031-05-01,2031-05-02,2031-05-11,15000,18000,18000,800000\n";

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/offerings"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}{}", header, row)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/offerings/CSV-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}{}", header, row)))
        .mount(&server)
        .await;

    let store = Arc::new(OfferingStore::new());
    let source = HttpOfferingSource::new(&server.uri(), FeedFormat::Csv, Duration::from_secs(5)).unwrap();
    let scheduler = RefreshScheduler::new(Arc::clone(&store), Arc::new(source), config());

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.refreshed, 1);
    let record = store.get("CSV-1").unwrap().record.clone();
    // No phase column: a final price before listing means priced.
    assert_eq!(record.phase, Phase::Priced);
    assert_eq!(record.final_offer_price, Some(won(18000)));
}

#[tokio::test]
async fn test_upstream_error_status_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/offerings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/offerings/A"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let store = Arc::new(OfferingStore::new());
    store.upsert(announced("A", date(2031, 3, 1))).await.unwrap();
    let source = HttpOfferingSource::new(&server.uri(), FeedFormat::Json, Duration::from_secs(5)).unwrap();
    let scheduler = RefreshScheduler::new(Arc::clone(&store), Arc::new(source), config());

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!((report.refreshed, report.failed), (0, 1));
    assert!(store.get("A").unwrap().status.last_error.as_deref().unwrap().contains("502"));
}

#[tokio::test]
async fn test_cycle_writes_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("offerings.json");

    let store = Arc::new(OfferingStore::new());
    let source = Arc::new(ScriptedSource::new(vec![
        priced("A", 40, date(2031, 3, 1)),
        announced("B", date(2031, 4, 1)),
    ]));
    let scheduler = scheduler_for(source, Arc::clone(&store)).with_snapshot(Some(snapshot.clone()));
    scheduler.run_cycle().await.unwrap();

    let restored = OfferingStore::new();
    assert_eq!(restored.load_snapshot(&snapshot).await.unwrap(), 2);
    assert_eq!(restored.get("A").unwrap().record, store.get("A").unwrap().record);
    assert_eq!(restored.get("B").unwrap().record, store.get("B").unwrap().record);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_future_cycles() {
    let store = Arc::new(OfferingStore::new());
    let source = Arc::new(ScriptedSource::new(vec![announced("A", date(2031, 3, 1))]));
    let scheduler = Arc::new(scheduler_for(source, Arc::clone(&store)));

    let handle = Arc::clone(&scheduler).start().await.unwrap();
    handle.shutdown().await.unwrap();

    assert_eq!(scheduler.run_cycle().await, None);
}
