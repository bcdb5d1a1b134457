mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockEngine, PageBehavior, pool_config};
use kodegen_page_scraper::{BrowserPool, HandleState, ScrapeError};

#[tokio::test]
async fn current_fails_before_first_launch() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::new(engine.clone(), pool_config(10));

    assert!(matches!(pool.current(), Err(ScrapeError::PoolExhausted)));
    assert_eq!(engine.launched(), 0);

    let handle = pool.launch_initial().await.unwrap();
    assert_eq!(pool.current().unwrap().id(), handle.id());
}

#[tokio::test]
async fn launch_initial_is_idempotent() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(10)).await.unwrap();

    let again = pool.launch_initial().await.unwrap();
    assert_eq!(again.id(), pool.current().unwrap().id());
    assert_eq!(engine.launched(), 1);
}

#[tokio::test]
async fn fatal_report_swaps_active_browser() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(60_000)).await.unwrap();
    let old = pool.current().unwrap();

    pool.report_fatal(&old).await.unwrap();

    let new = pool.current().unwrap();
    assert_ne!(new.id(), old.id());
    assert_eq!(pool.state_of(&old), HandleState::Retiring);
    assert_eq!(pool.state_of(&new), HandleState::Active);
    assert_eq!(pool.active_count(), 1);
    assert_eq!(pool.len(), 2);
    // Still inside the grace delay
    assert!(!engine.browser(0).is_closed());
}

#[tokio::test]
async fn retiring_browser_keeps_serving_in_flight_pages() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(60_000)).await.unwrap();
    let old = pool.current().unwrap();
    let in_flight = old.new_page().await.unwrap();

    pool.report_fatal(&old).await.unwrap();

    assert_eq!(in_flight.title().await.unwrap(), "Example Domain");
    assert!(old.new_page().await.is_ok());
}

#[tokio::test]
async fn retired_browser_closes_after_grace() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(20)).await.unwrap();
    let old = pool.current().unwrap();

    pool.report_fatal(&old).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(engine.browser(0).is_closed());
    assert!(!engine.browser(1).is_closed());
    assert_eq!(pool.state_of(&old), HandleState::Closed);
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn consecutive_failures_always_leave_one_active_browser() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(5)).await.unwrap();

    for round in 0..8 {
        let active = pool.current().unwrap();
        pool.report_fatal(&active).await.unwrap();

        let next = pool.current().unwrap();
        assert_ne!(next.id(), active.id(), "round {round}");
        assert_eq!(pool.state_of(&next), HandleState::Active);
        assert_eq!(pool.active_count(), 1);
    }
    assert_eq!(engine.launched(), 9);

    tokio::time::sleep(Duration::from_millis(200)).await;
    for index in 0..8 {
        assert!(engine.browser(index).is_closed(), "browser {index} should be retired");
    }
    assert!(!engine.browser(8).is_closed());
}

#[tokio::test]
async fn stale_reports_are_ignored() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(60_000)).await.unwrap();
    let old = pool.current().unwrap();

    pool.report_fatal(&old).await.unwrap();
    let active = pool.current().unwrap();

    // Another page on the old browser fails later
    pool.report_fatal(&old).await.unwrap();

    assert_eq!(pool.current().unwrap().id(), active.id());
    assert_eq!(engine.launched(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reports_launch_a_single_replacement() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(60_000)).await.unwrap();
    let old = pool.current().unwrap();

    let reports: Vec<_> = (0..10)
        .map(|_| {
            let pool = pool.clone();
            let old = old.clone();
            tokio::spawn(async move { pool.report_fatal(&old).await })
        })
        .collect();
    for report in futures::future::join_all(reports).await {
        report.unwrap().unwrap();
    }

    assert_eq!(engine.launched(), 2);
    assert_eq!(pool.active_count(), 1);
}

#[tokio::test]
async fn failed_replacement_raises_fatal_signal() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()).with_launch_limit(1));
    let pool = BrowserPool::start(engine.clone(), pool_config(10)).await.unwrap();
    let fatal = pool.fatal_signal();
    let old = pool.current().unwrap();

    let result = pool.report_fatal(&old).await;

    assert!(matches!(result, Err(ScrapeError::Launch(_))));
    assert!(fatal.is_cancelled());
}

#[tokio::test]
async fn first_launch_failure_is_reported() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()).with_launch_limit(0));
    let result = BrowserPool::start(engine, pool_config(10)).await;
    assert!(matches!(result, Err(ScrapeError::Launch(_))));
}

#[tokio::test]
async fn shutdown_closes_every_browser_and_empties_the_pool() {
    let engine = Arc::new(MockEngine::uniform(PageBehavior::default()));
    let pool = BrowserPool::start(engine.clone(), pool_config(60_000)).await.unwrap();
    let old = pool.current().unwrap();
    pool.report_fatal(&old).await.unwrap();

    pool.shutdown().await;

    assert!(pool.is_empty());
    assert!(engine.browser(0).is_closed());
    assert!(engine.browser(1).is_closed());
    assert!(matches!(pool.current(), Err(ScrapeError::PoolExhausted)));

    // Reports after shutdown never launch
    pool.report_fatal(&old).await.unwrap();
    assert_eq!(engine.launched(), 2);
}
