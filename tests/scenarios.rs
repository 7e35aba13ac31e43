//! End-to-end behaviour of the store, metrics and query service together.

mod common;

use common::{announced, date, priced, won};
use ipo_analyzer::error::IpoError;
use ipo_analyzer::models::Phase;
use ipo_analyzer::services::query::{OfferingFilter, QueryService, SortKey};
use ipo_analyzer::services::store::OfferingStore;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

fn service() -> (Arc<OfferingStore>, QueryService) {
    let store = Arc::new(OfferingStore::new());
    let query = QueryService::new(Arc::clone(&store), Duration::from_secs(300));
    (store, query)
}

#[tokio::test]
async fn test_announced_then_priced_listing_gain() {
    let (store, query) = service();

    store.upsert(announced("A", date(2024, 3, 1))).await.unwrap();
    let view = query.get_offering("A", Some(won(12000))).unwrap();
    assert_eq!(view.record.price_band_low, won(10000));
    assert_eq!(view.record.price_band_high, won(12000));
    assert_eq!(view.record.final_offer_price, None);
    assert_eq!(view.metrics.estimated_listing_gain_pct, None);

    let mut a = announced("A", date(2024, 3, 1));
    a.phase = Phase::Priced;
    a.final_offer_price = Some(won(11000));
    store.upsert(a).await.unwrap();

    let view = query.get_offering("A", Some(won(12000))).unwrap();
    assert_eq!(view.metrics.estimated_listing_gain_pct, Some(Decimal::new(-833, 2)));
}

#[tokio::test]
async fn test_equal_ratio_ranks_earlier_listing_first() {
    let (store, query) = service();
    store.upsert(priced("A", 500, date(2024, 3, 1))).await.unwrap();
    store.upsert(priced("B", 500, date(2024, 2, 15))).await.unwrap();

    let results = query
        .list_offerings(OfferingFilter::default(), SortKey::default())
        .unwrap();
    let ids: Vec<&str> = results.iter().map(|v| v.record.offering_id.as_str()).collect();
    assert_eq!(ids, vec!["B", "A"]);
}

#[tokio::test]
async fn test_unknown_offering_is_not_found() {
    let (_store, query) = service();
    assert_eq!(
        query.get_offering("missing", None).unwrap_err(),
        IpoError::not_found("missing")
    );
}

#[tokio::test]
async fn test_allocation_undefined_until_ratio_published() {
    let (store, query) = service();
    store.upsert(announced("A", date(2024, 3, 1))).await.unwrap();
    assert_eq!(
        query.get_offering("A", None).unwrap().metrics.expected_allocation_per_subscriber,
        None
    );

    store.upsert(priced("A", 1000, date(2024, 3, 1))).await.unwrap();
    assert_eq!(
        query.get_offering("A", None).unwrap().metrics.expected_allocation_per_subscriber,
        Some(Decimal::new(1, 2))
    );
}
