//! Cached reads, refresh throttling and notification-driven invalidation.

use std::sync::Arc;
use std::time::Duration;

use leadsync_cache::{Invalidation, ResponseCache};
use leadsync_client::admin::paths;
use leadsync_client::{AdminApi, DataLoader, SyncConfig, SyncCoordinator, SyncUpdate};
use leadsync_core::SessionGateway;
use leadsync_test_utils::fixtures::{dashboard_json, new_items, status_changed, submission};
use leadsync_test_utils::{
    GatewayError, GatewayResponse, MockGateway, SubmissionId, SubmissionQuery, SubmissionStatus,
};
use serde_json::json;
use tokio::time::sleep;

fn setup() -> (Arc<MockGateway>, SyncCoordinator) {
    let gateway = Arc::new(MockGateway::new());
    let session: Arc<dyn SessionGateway> = gateway.clone();
    let loader = DataLoader::new(Arc::new(ResponseCache::with_defaults()));
    let api = Arc::new(AdminApi::new(session, loader));
    (gateway, SyncCoordinator::new(api, SyncConfig::default()))
}

#[tokio::test(start_paused = true)]
async fn test_dashboard_miss_then_hit() {
    let (gateway, coordinator) = setup();
    gateway.respond_json(paths::DASHBOARD, dashboard_json(3));
    let api = coordinator.api();

    let data = api.dashboard().await.unwrap();
    assert_eq!(data, json!({ "stats": { "new": 3 } }));
    assert_eq!(api.loader().cache().get("dashboard-data"), Some(data));
    api.dashboard().await.unwrap();
    assert_eq!(gateway.request_count(paths::DASHBOARD), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_list_loads_share_one_request() {
    let (gateway, coordinator) = setup();
    gateway.respond_json(paths::SUBMISSIONS, json!({ "submissions": [submission(1)] }));
    gateway.hold();
    let api = Arc::clone(coordinator.api());
    let query = SubmissionQuery::new().with_page(1);

    let first = tokio::spawn({
        let api = Arc::clone(&api);
        let query = query.clone();
        async move { api.list_submissions(&query).await }
    });
    let second = tokio::spawn({
        let api = Arc::clone(&api);
        let query = query.clone();
        async move { api.list_submissions(&query).await }
    });
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert!(api.loader().coalescer().is_in_flight("submissions:page=1"));

    gateway.release();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(gateway.request_count(paths::SUBMISSIONS), 1);
    assert!(!api.loader().coalescer().is_in_flight("submissions:page=1"));
}

#[tokio::test(start_paused = true)]
async fn test_status_change_invalidates_only_affected_entries() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(&paths::submission(SubmissionId(42)), json!(submission(42)))
        .respond_json(&paths::submission(SubmissionId(7)), json!(submission(7)))
        .respond_json(paths::SUBMISSIONS, json!({ "submissions": [] }))
        .respond_json(paths::STATS, json!({ "total": 9, "new": 3 }));
    let api = coordinator.api();
    let mut updates = coordinator.subscribe();

    api.submission_detail(SubmissionId(42)).await.unwrap();
    api.submission_detail(SubmissionId(7)).await.unwrap();
    api.list_submissions(&SubmissionQuery::new().with_page(1)).await.unwrap();
    api.list_submissions(&SubmissionQuery::new().with_status(SubmissionStatus::New))
        .await
        .unwrap();
    api.stats().await.unwrap();

    coordinator
        .on_notification(status_changed(42, SubmissionStatus::Contacted))
        .await;

    assert_eq!(
        api.loader().cache().keys(),
        vec!["dashboard-stats".to_string(), "submission-detail:7".to_string()]
    );
    assert_eq!(
        updates.recv().await.unwrap(),
        SyncUpdate::EntityInvalidated(SubmissionId(42))
    );
    // no refresh was forced
    assert_eq!(gateway.request_count(paths::DASHBOARD), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pattern_invalidation_removes_exactly_matching_keys() {
    let (_gateway, coordinator) = setup();
    let cache = coordinator.api().loader().cache();
    for key in [
        "dashboard-data",
        "dashboard-stats",
        "submissions:page=1",
        "submissions:page=2&status=new",
        "submission-detail:3",
    ] {
        cache.set(key, json!(key), None);
    }

    let removed = coordinator
        .api()
        .loader()
        .invalidate(&Invalidation::from_parts(None, Some("submissions")));

    assert_eq!(removed, 2);
    assert_eq!(
        cache.keys(),
        vec![
            "dashboard-data".to_string(),
            "dashboard-stats".to_string(),
            "submission-detail:3".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unforced_refresh_is_throttled() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(paths::DASHBOARD, dashboard_json(1))
        .respond_json(paths::STATS, json!({}));

    coordinator.refresh(false).await.unwrap();
    let cached = coordinator.refresh(false).await.unwrap();
    assert_eq!(cached, dashboard_json(1));
    assert_eq!(gateway.request_count(paths::DASHBOARD), 1);

    sleep(Duration::from_secs(31)).await;
    coordinator.refresh(false).await.unwrap();
    assert_eq!(gateway.request_count(paths::DASHBOARD), 2);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_unforced_refreshes_fetch_once() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(paths::DASHBOARD, dashboard_json(1))
        .respond_json(paths::STATS, json!({}));
    gateway.hold();
    let coordinator = Arc::new(coordinator);

    let first = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.refresh(false).await }
    });
    let second = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.refresh(false).await }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    assert_eq!(gateway.request_count(paths::DASHBOARD), 1);

    gateway.release();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, dashboard_json(1));
    assert_eq!(second, first);
    assert_eq!(gateway.request_count(paths::DASHBOARD), 1);
    assert!(coordinator.last_refresh_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_forced_refreshes_run_one_after_another() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(paths::DASHBOARD, dashboard_json(1))
        .respond_json(paths::STATS, json!({}));
    gateway.hold();
    let coordinator = Arc::new(coordinator);

    let first = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.refresh(true).await }
    });
    let second = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.refresh(true).await }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    // the second refresh waits instead of invalidating the first one's load
    assert_eq!(gateway.request_count(paths::DASHBOARD), 1);

    gateway.release();
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(gateway.request_count(paths::DASHBOARD), 2);
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_always_fetches() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(paths::DASHBOARD, dashboard_json(1))
        .respond_json(paths::STATS, json!({}));

    coordinator.refresh(true).await.unwrap();
    coordinator.refresh(true).await.unwrap();
    coordinator.refresh(true).await.unwrap();

    assert_eq!(gateway.request_count(paths::DASHBOARD), 3);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_refresh_without_cached_dashboard_loads_it() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(paths::DASHBOARD, dashboard_json(1))
        .respond_json(paths::STATS, json!({}));

    coordinator.refresh(true).await.unwrap();
    let refreshed_at = coordinator.last_refresh_at();
    coordinator.api().loader().invalidate_key("dashboard-data");

    coordinator.refresh(false).await.unwrap();
    assert_eq!(gateway.request_count(paths::DASHBOARD), 2);
    assert_eq!(coordinator.last_refresh_at(), refreshed_at);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_propagates() {
    let (gateway, coordinator) = setup();
    gateway.respond(
        paths::DASHBOARD,
        Ok(GatewayResponse::new(500, "database unavailable")),
    );
    let mut updates = coordinator.subscribe();

    let err = coordinator.refresh(true).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(coordinator.last_refresh_at().is_none());
    assert!(matches!(updates.recv().await.unwrap(), SyncUpdate::RefreshFailed(_)));
    assert!(!coordinator.api().loader().cache().contains("dashboard-data"));
}

#[tokio::test(start_paused = true)]
async fn test_prefetch_runs_after_delay_and_failures_are_ignored() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(paths::DASHBOARD, dashboard_json(2))
        .respond_once(
            paths::STATS,
            Err(GatewayError::Transport("connection reset".into())),
        )
        .respond_json(paths::STATS, json!({ "total": 4, "new": 2 }));

    coordinator.refresh(true).await.unwrap();
    assert_eq!(gateway.request_count(paths::STATS), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.request_count(paths::STATS), 1);
    assert!(!coordinator.api().loader().cache().contains("dashboard-stats"));

    coordinator.refresh(true).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.request_count(paths::STATS), 2);
    assert!(coordinator.api().loader().cache().contains("dashboard-stats"));
}

#[tokio::test(start_paused = true)]
async fn test_new_items_force_refresh_inside_throttle_window() {
    let (gateway, coordinator) = setup();
    gateway
        .respond_json(paths::DASHBOARD, dashboard_json(1))
        .respond_json(paths::STATS, json!({}));

    coordinator.refresh(false).await.unwrap();
    coordinator.on_notification(new_items(&[5, 6])).await;

    assert_eq!(gateway.request_count(paths::DASHBOARD), 2);
}

#[tokio::test(start_paused = true)]
async fn test_new_items_refresh_failure_is_not_fatal() {
    let (gateway, coordinator) = setup();
    gateway.respond(paths::DASHBOARD, Err(GatewayError::Transport("offline".into())));
    let mut updates = coordinator.subscribe();

    coordinator.on_notification(new_items(&[1])).await;

    assert!(matches!(updates.recv().await.unwrap(), SyncUpdate::RefreshFailed(_)));
}
