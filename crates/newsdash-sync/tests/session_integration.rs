//! End-to-end session behavior over the scripted connector
//!
//! These tests drive a full `DashboardSession` (transport, supervisor,
//! engine task and hub) with an in-memory server, so every scenario runs
//! without network access.


use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use newsdash_core::{BackoffConfig, ConnectionStatus, RawMessage, SyncConfig};
use newsdash_sync::{DashboardSession, ScriptedConnector};
use serde_json::{json, Value};
use test_utils::{eventually, test_config, CallCounter};

fn activity(description: &str) -> Value {
    json!({"kind": "publish", "description": description, "timestamp": "2024-05-01T10:00:00Z"})
}

fn alert(n: usize) -> Value {
    json!({"id": n, "type": "warning", "title": format!("alert {}", n), "time": "10:00"})
}

async fn connected_session(
    config: SyncConfig,
) -> (DashboardSession, Arc<ScriptedConnector>, newsdash_sync::ScriptedServer) {
    let connector = Arc::new(ScriptedConnector::new());
    let server = connector.accept_next();
    let session = DashboardSession::open_with(config, connector.clone()).unwrap();
    eventually("engine to see Connected", || {
        session.state().status() == ConnectionStatus::Connected
    })
    .await;
    (session, connector, server)
}

#[tokio::test]
async fn test_stats_then_activities_newest_first() {
    let (session, _connector, server) = connected_session(test_config(false)).await;

    server.push("stats_update", json!({"a": 1}));
    server.push("activity_update", activity("A"));
    server.push("activity_update", activity("B"));

    eventually("two activities", || session.state().activities().len() == 2).await;
    let state = session.state();
    assert_eq!(state.stats().unwrap().get("a"), Some(&json!(1)));
    let order: Vec<String> = state
        .activities()
        .iter()
        .map(|e| e.description.clone())
        .collect();
    assert_eq!(order, vec!["B", "A"]);

    session.close().await;
}

#[tokio::test]
async fn test_alert_feed_keeps_five_most_recent() {
    let (session, _connector, server) = connected_session(test_config(false)).await;

    for n in 1..=12 {
        server.push("alert", alert(n));
    }
    eventually("all alerts routed", || session.stats().messages_routed == 12).await;

    let ids: Vec<String> = session
        .state()
        .alerts()
        .iter()
        .map(|e| e.id.to_string())
        .collect();
    assert_eq!(ids, vec!["12", "11", "10", "9", "8"]);

    session.close().await;
}

#[tokio::test]
async fn test_subscriber_sees_exactly_n_events_before_unsubscribe() {
    let (session, _connector, server) = connected_session(test_config(false)).await;
    let calls = CallCounter::default();
    let counter = calls.clone();
    let subscription = session.subscribe(move |_| counter.bump());

    let n = 6;
    for i in 0..n {
        server.push("activity_update", activity(&format!("story {}", i)));
    }
    eventually("n notifications", || calls.get() == n).await;

    assert!(subscription.unsubscribe());
    server.push("activity_update", activity("late"));
    eventually("late event applied", || session.stats().messages_routed == n as u64 + 1).await;

    assert_eq!(calls.get(), n);
    session.close().await;
}

#[tokio::test]
async fn test_all_subscribers_see_the_same_sequence() {
    let (session, _connector, server) = connected_session(test_config(false)).await;
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let (a, b) = (Arc::clone(&first), Arc::clone(&second));
    let _s1 = session.subscribe(move |s| a.lock().unwrap().push(s.version()));
    let _s2 = session.subscribe(move |s| b.lock().unwrap().push(s.version()));
    let _panicky = session.subscribe(|_| panic!("subscriber bug"));

    server.push("stats_update", json!({"total": 3}));
    server.push("alert", alert(1));
    server.push("activity_update", activity("x"));
    eventually("three versions", || second.lock().unwrap().len() == 3).await;

    let seen = first.lock().unwrap().clone();
    assert_eq!(seen, *second.lock().unwrap());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));

    session.close().await;
}

#[tokio::test]
async fn test_disconnect_preserves_data() {
    let (session, _connector, server) = connected_session(test_config(false)).await;

    server.push("stats_update", json!({"readers": 120}));
    server.push("activity_update", activity("kept"));
    eventually("data applied", || session.state().activities().len() == 1).await;

    server.disconnect();
    eventually("Disconnected version", || {
        session.state().status() == ConnectionStatus::Disconnected
    })
    .await;

    let state = session.state();
    assert_eq!(state.stats().unwrap().get("readers"), Some(&json!(120)));
    assert_eq!(state.activities().newest().unwrap().description, "kept");
    assert!(!session.send("request_stats", Value::Null));

    session.close().await;
}

#[tokio::test]
async fn test_unknown_and_malformed_events_leave_state_alone() {
    let (session, _connector, server) = connected_session(test_config(false)).await;
    let version = session.state().version();

    server.push("connected", json!({"status": "connected"}));
    server.push("stats_update", json!([1, 2, 3]));
    server.push("activity_update", json!({"kind": "info"}));
    eventually("three messages seen", || session.stats().messages_received == 3).await;

    let stats = session.stats();
    assert_eq!(stats.unknown_dropped, 1);
    assert_eq!(stats.malformed_dropped, 2);
    assert_eq!(session.state().version(), version);

    session.close().await;
}

#[tokio::test]
async fn test_reconnects_after_link_loss() {
    let (session, connector, first) = connected_session(test_config(true)).await;
    let second = connector.accept_next();

    first.disconnect();
    eventually("second connect", || connector.attempts() == 2).await;
    eventually("Connected again", || session.status() == ConnectionStatus::Connected).await;

    second.push("activity_update", activity("after reconnect"));
    eventually("event over new link", || session.state().activities().len() == 1).await;

    session.close().await;
}

#[tokio::test]
async fn test_retries_until_backend_returns() {
    let connector = Arc::new(ScriptedConnector::new());
    let session = DashboardSession::open_with(test_config(true), connector.clone()).unwrap();

    eventually("two refused attempts", || connector.attempts() >= 2).await;
    let _server = connector.accept_next();
    eventually("eventually connected", || {
        session.state().status() == ConnectionStatus::Connected
    })
    .await;

    session.close().await;
}

#[tokio::test]
async fn test_successful_connect_resets_backoff() {
    // Delays grow 20, 40, 80, 160, 320ms without a reset
    let mut config = test_config(true);
    config.backoff = BackoffConfig {
        base_delay_ms: 20,
        max_delay_ms: 1_000,
        jitter_ratio: 0.0,
    };
    let connector = Arc::new(ScriptedConnector::new());
    let session = DashboardSession::open_with(config, connector.clone()).unwrap();

    eventually("four refused attempts", || connector.attempts() == 4).await;
    let first = connector.accept_next();
    eventually("Connected after backoff", || {
        session.status() == ConnectionStatus::Connected
    })
    .await;
    assert_eq!(connector.attempts(), 5);

    let _second = connector.accept_next();
    let lost_at = Instant::now();
    first.disconnect();
    eventually("retry after link loss", || connector.attempts() == 6).await;

    let waited = lost_at.elapsed();
    assert!(
        waited < Duration::from_millis(200),
        "retry waited {:?}; backoff was not reset by the connect",
        waited
    );
    eventually("Connected again", || session.status() == ConnectionStatus::Connected).await;

    session.close().await;
}

#[tokio::test]
async fn test_close_during_backoff_stops_retries() {
    let mut config = test_config(true);
    config.backoff = BackoffConfig::fixed(200);
    let connector = Arc::new(ScriptedConnector::new());
    let session = DashboardSession::open_with(config, connector.clone()).unwrap();

    eventually("first attempt refused", || {
        connector.attempts() == 1 && session.status() == ConnectionStatus::Reconnecting
    })
    .await;
    session.close().await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(session.status(), ConnectionStatus::Disconnected);
    assert_eq!(session.state().status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_no_retry_when_auto_reconnect_disabled() {
    let connector = Arc::new(ScriptedConnector::new());
    let session = DashboardSession::open_with(test_config(false), connector.clone()).unwrap();

    eventually("first attempt", || connector.attempts() == 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(session.status(), ConnectionStatus::Disconnected);

    session.close().await;
}

#[tokio::test]
async fn test_refresh_on_connect_requests_stats() {
    let mut config = test_config(false);
    config.refresh_on_connect = true;
    let (session, _connector, mut server) = connected_session(config).await;

    let sent = server.next_sent().await.unwrap();
    assert_eq!(sent, RawMessage::new("request_stats", Value::Null));

    assert!(session.request_stats());
    assert_eq!(server.next_sent().await.unwrap().event, "request_stats");

    session.close().await;
}

#[tokio::test]
async fn test_close_releases_subscribers_and_publishes_final_status() {
    let (session, _connector, _server) = connected_session(test_config(true)).await;
    let last = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&last);
    let _subscription = session.subscribe(move |s| *sink.lock().unwrap() = Some(s.status()));

    session.close().await;

    assert_eq!(*last.lock().unwrap(), Some(ConnectionStatus::Disconnected));
    assert!(session.is_closed());
    assert!(session.ensure_open().is_err());
    assert!(!session.request_stats());

    session.close().await;
}

#[tokio::test]
async fn test_open_rejects_invalid_config() {
    let mut config = test_config(true);
    config.alert_capacity = 0;
    let connector = Arc::new(ScriptedConnector::new());
    assert!(DashboardSession::open_with(config, connector.clone()).is_err());
    assert_eq!(connector.attempts(), 0);
}
