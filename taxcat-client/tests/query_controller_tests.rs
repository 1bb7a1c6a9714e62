//! Filter query controller integration tests
//!
//! Run on a paused clock so debounce windows and fetch latencies are exact.

mod helpers;

use helpers::MockCatalog;
use std::time::Duration;
use taxcat_client::query::{Phase, QueryController};
use taxcat_client::session::SessionContext;
use taxcat_common::config::QueryConfig;
use taxcat_common::Error;

fn controller(catalog: &MockCatalog) -> QueryController {
    let session = SessionContext::authenticated(None);
    QueryController::new(&session, catalog.as_service(), &QueryConfig::default()).unwrap()
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_two_edits_within_window_fetch_once_with_final_text() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.set_county_prefix("Ki");
    sleep_ms(100).await;
    controller.set_county_prefix("Kings");
    let view = controller.wait_idle().await;

    let queries = catalog.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].0.county_prefix.as_deref(), Some("Kings"));
    assert!(view.result.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_nothing_fetched_before_quiet_period() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.set_min_subtotal(Some(10.0));
    assert_eq!(controller.phase(), Phase::Debouncing);
    sleep_ms(299).await;
    assert!(catalog.queries().is_empty());

    controller.wait_idle().await;
    assert_eq!(catalog.queries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_page_response_is_discarded() {
    let catalog = MockCatalog::new();
    catalog.push_query_delay(Duration::from_millis(1000));
    let controller = controller(&catalog);

    controller.refresh();
    // debounce elapsed, page 1 fetch in flight
    sleep_ms(400).await;
    assert_eq!(controller.phase(), Phase::Fetching);
    assert_eq!(catalog.queries().len(), 1);

    controller.set_page(2);
    assert_eq!(controller.phase(), Phase::Debouncing);
    let view = controller.wait_idle().await;
    assert_eq!(view.result.as_ref().unwrap().page, 2);

    // page 1 response arrives long after page 2 was applied
    sleep_ms(2000).await;
    let view = controller.view();
    assert_eq!(view.result.as_ref().unwrap().page, 2);
    assert_eq!(view.applied, 1);
    assert_eq!(catalog.queries().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_response_during_new_quiet_period_changes_nothing() {
    let catalog = MockCatalog::new();
    catalog.push_query_delay(Duration::from_millis(500));
    let controller = controller(&catalog);

    // page 1 fetch starts at 300ms and answers at 800ms
    controller.refresh();
    sleep_ms(700).await;
    assert_eq!(controller.phase(), Phase::Fetching);

    // page 2 quiet period runs until 1000ms
    controller.set_page(2);
    sleep_ms(200).await;

    let view = controller.view();
    assert_eq!(view.phase, Phase::Debouncing);
    assert_eq!(view.applied, 0);
    assert!(view.result.is_none());
    assert_eq!(catalog.queries().len(), 1);

    let view = controller.wait_idle().await;
    assert_eq!(view.result.as_ref().unwrap().page, 2);
    assert_eq!(view.applied, 1);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_failure_keeps_displayed_records() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.refresh();
    controller.wait_idle().await;

    catalog.set_fail_queries(true);
    catalog.push_query_delay(Duration::from_millis(500));
    controller.refresh();
    // failing fetch in flight until 1100ms
    sleep_ms(400).await;
    assert_eq!(controller.phase(), Phase::Fetching);

    catalog.set_fail_queries(false);
    controller.set_page(2);
    controller.wait_idle().await;

    sleep_ms(1000).await;
    let view = controller.view();
    assert!(view.failure.is_none());
    assert_eq!(view.result.as_ref().unwrap().page, 2);
    assert!(!view.records().is_empty());
    assert_eq!(view.applied, 2);
    assert_eq!(catalog.queries().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_min_rate_percent_sent_as_fraction() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.set_min_rate_percent(Some(8.875));
    controller.wait_idle().await;

    let rate = catalog.queries()[0].0.min_rate_fraction.unwrap();
    assert!((rate - 0.08875).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn test_filter_change_resets_page() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.set_page(3);
    controller.wait_idle().await;
    assert_eq!(controller.state().page, 3);

    controller.set_min_tax(Some(1.5));
    assert_eq!(controller.state().page, 1);
    controller.wait_idle().await;

    let (filter, page) = catalog.queries().last().cloned().unwrap();
    assert_eq!(filter.min_tax, Some(1.5));
    assert_eq!(page.number, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pagination_and_refresh_keep_page_and_filter() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.set_county_prefix("Erie");
    controller.wait_idle().await;
    controller.set_page(3);
    controller.wait_idle().await;
    controller.refresh();
    controller.wait_idle().await;

    let state = controller.state();
    assert_eq!(state.page, 3);
    assert_eq!(state.filter.county_prefix.as_deref(), Some("Erie"));

    let queries = catalog.queries();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[2].1.number, 3);
    assert_eq!(queries[2].0.county_prefix.as_deref(), Some("Erie"));
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_value_schedules_nothing() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.set_county_prefix("   ");
    controller.set_include_error_rows(false);
    controller.previous_page();
    assert_eq!(controller.phase(), Phase::Idle);

    sleep_ms(1000).await;
    assert!(catalog.queries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_clears_records_but_keeps_filters() {
    let catalog = MockCatalog::new();
    let controller = controller(&catalog);

    controller.set_county_prefix("Queens");
    let view = controller.wait_idle().await;
    assert!(!view.records().is_empty());

    catalog.set_fail_queries(true);
    controller.refresh();
    let view = controller.wait_idle().await;
    assert!(view.result.is_none());
    assert!(view.records().is_empty());
    assert!(view.failure.as_ref().unwrap().message.contains("connection refused"));
    assert_eq!(controller.state().filter.county_prefix.as_deref(), Some("Queens"));

    // retry succeeds with the preserved filter
    catalog.set_fail_queries(false);
    controller.refresh();
    let view = controller.wait_idle().await;
    assert!(view.failure.is_none());
    assert!(view.result.is_some());
    assert_eq!(catalog.queries().last().unwrap().0.county_prefix.as_deref(), Some("Queens"));
}

#[tokio::test(start_paused = true)]
async fn test_next_and_previous_page_clamp() {
    let catalog = MockCatalog::new();
    // 40 rows at 15 per page
    catalog.set_total_rows(40);
    let controller = controller(&catalog);

    controller.refresh();
    let view = controller.wait_idle().await;
    assert_eq!(view.result.as_ref().unwrap().total_pages, 3);

    for _ in 0..5 {
        controller.next_page();
    }
    assert_eq!(controller.state().page, 3);

    for _ in 0..5 {
        controller.previous_page();
    }
    assert_eq!(controller.state().page, 1);
}

#[tokio::test(start_paused = true)]
async fn test_next_page_never_moves_back_past_jump() {
    let catalog = MockCatalog::new();
    catalog.set_total_rows(40);
    let controller = controller(&catalog);

    controller.refresh();
    controller.wait_idle().await;
    controller.set_page(10);
    controller.wait_idle().await;

    controller.next_page();
    assert_eq!(controller.state().page, 10);
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(catalog.queries().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_result_is_one_atomic_snapshot() {
    let catalog = MockCatalog::new();
    catalog.set_total_rows(20);
    let controller = controller(&catalog);

    controller.set_page(2);
    let view = controller.wait_idle().await;
    let result = view.result.unwrap();

    assert_eq!(result.page, 2);
    assert_eq!(result.records.len(), 5);
    assert_eq!(result.total_count, 20);
    assert_eq!(result.total_pages, 2);
    assert_eq!(result.aggregate_tax, 10.0);
    assert_eq!(result.aggregate_revenue, 200.0);
}

#[test]
fn test_anonymous_session_rejected() {
    let catalog = MockCatalog::new();
    let session = SessionContext::anonymous();
    assert!(matches!(
        QueryController::new(&session, catalog.as_service(), &QueryConfig::default()),
        Err(Error::NotAuthenticated)
    ));
}
