//! Integration tests for the reference-counted status observer hub.

use std::sync::Arc;

use deskwire_core::session::SharedSession;
use deskwire_realtime::ConnectionState;

use crate::helpers;

#[tokio::test]
async fn test_first_observer_connects_once_and_stays_warm() {
    let rig = helpers::harness();

    let first = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;
    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);
    assert_eq!(rig.transport.connect_calls(), 1);

    let second = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;
    assert_eq!(rig.transport.connect_calls(), 1);

    // Releasing every observer keeps the connection warm while the
    // session lives, so route navigations do not thrash the socket.
    first.release();
    second.release();
    helpers::settle().await;
    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);

    let _third = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;
    assert_eq!(rig.transport.connect_calls(), 1);
}

#[tokio::test]
async fn test_no_connect_without_session_token() {
    let rig = helpers::build(Arc::new(SharedSession::new()), false);

    let handle = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    assert_eq!(
        rig.service.connection_status(),
        ConnectionState::Disconnected
    );
    assert_eq!(rig.transport.connect_calls(), 0);

    handle.release();
    handle.release(); // double release is a no-op
}

#[tokio::test]
async fn test_last_release_after_session_end_tears_down() {
    let rig = helpers::harness();

    let handle = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;
    rig.service.subscribe(
        "codes",
        vec![(".tick".to_string(), deskwire_realtime::handler(|_| {}))],
    );
    helpers::settle().await;
    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);

    rig.session.clear();
    handle.release();
    helpers::settle().await;

    assert_eq!(
        rig.service.connection_status(),
        ConnectionState::Disconnected
    );
    assert!(rig.service.subscribed_channels().is_empty());
}

#[tokio::test]
async fn test_session_ended_with_no_observers_tears_down() {
    let rig = helpers::harness();

    let handle = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;
    handle.release();
    helpers::settle().await;
    // Warm connection survives the release.
    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);

    rig.session.clear();
    rig.service.session_ended();
    helpers::settle().await;

    assert_eq!(
        rig.service.connection_status(),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn test_session_end_stops_heartbeat_but_keeps_observed_connection() {
    let rig = helpers::harness();

    let _handle = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;
    rig.service.start_heartbeat();
    helpers::settle().await;
    assert!(!rig.transport.published().is_empty());

    rig.session.clear();
    rig.service.session_ended();
    helpers::settle().await;

    // An observer still exists, so the connection stays up; only the
    // heartbeat stops.
    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);
}
