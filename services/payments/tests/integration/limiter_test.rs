use std::time::Duration;

use futures::future::join_all;

use payflow_payments::domain::repository::{KeyValueStore, RateLimiter};
use payflow_payments::domain::types::rate_limit_key;
use payflow_payments::error::PaymentServiceError;
use payflow_payments::infra::rate_limiter::FixedWindowLimiter;

use crate::helpers::{MemoryStore, TEST_LIMIT, TEST_WINDOW};

fn limiter(store: &MemoryStore) -> FixedWindowLimiter<MemoryStore> {
    FixedWindowLimiter::new(store.clone(), TEST_LIMIT, TEST_WINDOW)
}

#[tokio::test(start_paused = true)]
async fn should_admit_up_to_limit_then_refuse() {
    let store = MemoryStore::new();
    let limiter = limiter(&store);

    for n in 1..=TEST_LIMIT {
        assert!(limiter.allow("u1").await.unwrap(), "request {n} refused");
    }
    assert!(!limiter.allow("u1").await.unwrap());
    assert!(!limiter.allow("u1").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn should_count_users_independently() {
    let store = MemoryStore::new();
    let limiter = limiter(&store);

    for _ in 0..TEST_LIMIT {
        limiter.allow("u1").await.unwrap();
    }
    assert!(!limiter.allow("u1").await.unwrap());
    assert!(limiter.allow("u2").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn should_start_window_on_first_request_only() {
    let store = MemoryStore::new();
    let limiter = limiter(&store);
    let key = rate_limit_key("u1");

    limiter.allow("u1").await.unwrap();
    let first_expiry = store.expires_at(&key).expect("window not started");

    tokio::time::advance(Duration::from_secs(10)).await;
    limiter.allow("u1").await.unwrap();

    assert_eq!(store.expires_at(&key), Some(first_expiry));
}

#[tokio::test(start_paused = true)]
async fn should_admit_again_after_window_elapses() {
    let store = MemoryStore::new();
    let limiter = limiter(&store);

    for _ in 0..TEST_LIMIT {
        limiter.allow("u1").await.unwrap();
    }
    assert!(!limiter.allow("u1").await.unwrap());

    tokio::time::advance(TEST_WINDOW + Duration::from_millis(1)).await;

    assert!(limiter.allow("u1").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn refused_requests_still_count_within_window() {
    let store = MemoryStore::new();
    let limiter = limiter(&store);

    for _ in 0..TEST_LIMIT + 3 {
        limiter.allow("u1").await.unwrap();
    }
    let raw = store.get(&rate_limit_key("u1")).await.unwrap().unwrap();
    let count = String::from_utf8(raw).unwrap();
    assert_eq!(count, (TEST_LIMIT + 3).to_string());
}

#[tokio::test]
async fn should_propagate_store_failure() {
    let store = MemoryStore::new();
    store.faults.lock().unwrap().fail_incr = true;

    let result = limiter(&store).allow("u1").await;
    assert!(
        matches!(result, Err(PaymentServiceError::StoreUnavailable(_))),
        "expected StoreUnavailable, got {result:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_admit_exactly_limit() {
    let store = MemoryStore::new();
    let limiter = limiter(&store);

    let calls = (0..TEST_LIMIT + 3).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.allow("u1").await })
    });
    let admitted = join_all(calls)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap().as_ref().unwrap())
        .count();

    assert_eq!(admitted as u64, TEST_LIMIT);
    assert!(store.expires_at(&rate_limit_key("u1")).is_some());
}
