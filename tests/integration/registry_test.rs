//! Integration tests for channel subscription tracking, replay, and
//! message dispatch.

use std::sync::{Arc, Mutex};

use tokio::time::Duration;

use deskwire_realtime::{ConnectionState, SUBSCRIPTION_ERROR_EVENT, handler};

use crate::helpers;

fn recording_handler(log: Arc<Mutex<Vec<String>>>, label: &'static str) -> deskwire_realtime::EventHandler {
    handler(move |payload| {
        log.lock().unwrap().push(format!("{label}:{payload}"));
    })
}

#[tokio::test]
async fn test_subscriptions_deferred_until_connected_then_replayed_in_order() {
    let rig = helpers::manual_harness();

    rig.service
        .subscribe("codes", vec![(".tick".to_string(), handler(|_| {}))]);
    rig.service
        .subscribe("trades", vec![(".tick".to_string(), handler(|_| {}))]);
    rig.service
        .subscribe("alerts", vec![(".tick".to_string(), handler(|_| {}))]);
    helpers::settle().await;

    // Nothing reaches the transport while disconnected.
    assert!(rig.transport.subscribe_calls().is_empty());

    rig.service.reconnect();
    helpers::settle().await;
    rig.transport.complete_connect();
    helpers::settle().await;

    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);
    assert_eq!(
        rig.transport.subscribe_calls(),
        vec!["codes", "trades", "alerts"]
    );
    // Transport-subscribed set equals the tracked set.
    assert_eq!(rig.service.live_channels(), rig.service.subscribed_channels());
}

#[tokio::test]
async fn test_reconnect_replays_without_duplicates() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    rig.service
        .subscribe("codes", vec![(".tick".to_string(), handler(|_| {}))]);
    rig.service
        .subscribe("trades", vec![(".tick".to_string(), handler(|_| {}))]);
    helpers::settle().await;
    assert_eq!(rig.transport.subscribe_calls(), vec!["codes", "trades"]);

    rig.transport.drop_connection("flap");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);

    // Each channel re-subscribed exactly once, in original order.
    assert_eq!(
        rig.transport.subscribe_calls(),
        vec!["codes", "trades", "codes", "trades"]
    );
}

#[tokio::test]
async fn test_dispatch_order_and_exactly_once_delivery() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    rig.service.subscribe(
        "codes",
        vec![(
            ".codes.updated".to_string(),
            recording_handler(log.clone(), "a"),
        )],
    );
    helpers::settle().await;

    rig.transport
        .inject("codes", ".codes.updated", serde_json::json!({"seq": 1}));
    helpers::settle().await;
    assert_eq!(*log.lock().unwrap(), vec![r#"a:{"seq":1}"#]);

    // Consumer B subscribes to the same pair after A; both fire, A first.
    rig.service.subscribe(
        "codes",
        vec![(
            ".codes.updated".to_string(),
            recording_handler(log.clone(), "b"),
        )],
    );
    helpers::settle().await;

    rig.transport
        .inject("codes", ".codes.updated", serde_json::json!({"seq": 2}));
    helpers::settle().await;
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            r#"a:{"seq":1}"#.to_string(),
            r#"a:{"seq":2}"#.to_string(),
            r#"b:{"seq":2}"#.to_string(),
        ]
    );

    // The merged subscribe issued no second transport-level call.
    assert_eq!(rig.transport.subscribe_calls(), vec!["codes"]);
}

#[tokio::test]
async fn test_same_handler_registered_twice_fires_once() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let shared = recording_handler(log.clone(), "a");

    rig.service.subscribe(
        "codes",
        vec![(".codes.updated".to_string(), shared.clone())],
    );
    rig.service
        .subscribe("codes", vec![(".codes.updated".to_string(), shared)]);
    helpers::settle().await;

    rig.transport
        .inject("codes", ".codes.updated", serde_json::json!({}));
    helpers::settle().await;

    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsubscribe_drops_channel_and_stops_delivery() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    rig.service.subscribe(
        "codes",
        vec![
            (
                ".codes.updated".to_string(),
                recording_handler(log.clone(), "upd"),
            ),
            (
                ".codes.removed".to_string(),
                recording_handler(log.clone(), "rm"),
            ),
        ],
    );
    helpers::settle().await;

    // Removing one event keeps the channel alive on the transport.
    rig.service.unsubscribe_event("codes", ".codes.updated");
    helpers::settle().await;
    assert!(rig.transport.unsubscribe_calls().is_empty());
    assert!(rig.service.subscribed_channels().contains(&"codes".to_string()));

    // Removing the last event withdraws the transport subscription.
    rig.service.unsubscribe_event("codes", ".codes.removed");
    helpers::settle().await;
    assert_eq!(rig.transport.unsubscribe_calls(), vec!["codes"]);
    assert!(rig.service.subscribed_channels().is_empty());

    rig.transport
        .inject("codes", ".codes.updated", serde_json::json!({}));
    helpers::settle().await;
    assert!(log.lock().unwrap().is_empty());

    // Unsubscribing a channel that is not tracked is a no-op.
    rig.service.unsubscribe("codes");
    rig.service.unsubscribe("never-subscribed");
    helpers::settle().await;
    assert_eq!(rig.transport.unsubscribe_calls(), vec!["codes"]);
}

#[tokio::test]
async fn test_subscription_rejection_reaches_channel_error_handlers() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    rig.service.subscribe_private(
        "private-desk",
        vec![(
            SUBSCRIPTION_ERROR_EVENT.to_string(),
            recording_handler(log.clone(), "err"),
        )],
    );
    helpers::settle().await;

    rig.transport
        .reject_subscription("private-desk", "signature invalid");
    helpers::settle().await;

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("signature invalid"));
}
