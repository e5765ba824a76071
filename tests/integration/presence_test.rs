//! Integration tests for heartbeat-driven presence.

use tokio::time::Duration;

use deskwire_core::types::UserId;
use deskwire_realtime::ConnectionState;

use crate::helpers;

#[tokio::test(start_paused = true)]
async fn test_heartbeat_marks_local_user_online() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;
    assert_eq!(rig.service.connection_status(), ConnectionState::Connected);

    rig.service.start_heartbeat();
    helpers::settle().await;

    assert!(rig.service.is_user_online(&UserId::from("local")));
    assert_eq!(rig.service.online_users(), vec![UserId::from("local")]);

    // The liveness signal went out on the heartbeat channel, and the core
    // listens on that channel for everyone else's signals.
    let published = rig.transport.published();
    assert_eq!(published[0].0, "private-online");
    assert_eq!(published[0].1, "client-heartbeat");
    assert_eq!(published[0].2["user_id"], "local");
    assert!(
        rig.transport
            .subscribe_calls()
            .contains(&"private-online".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_presence_expires_after_ttl_without_signals() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    rig.service.start_heartbeat();
    helpers::settle().await;
    assert!(rig.service.is_user_online(&UserId::from("local")));

    rig.service.stop_heartbeat();

    // TTL is 45s in the test config.
    tokio::time::advance(Duration::from_secs(44)).await;
    helpers::settle().await;
    assert!(rig.service.is_user_online(&UserId::from("local")));

    tokio::time::advance(Duration::from_secs(2)).await;
    helpers::settle().await;
    assert!(!rig.service.is_user_online(&UserId::from("local")));
}

#[tokio::test(start_paused = true)]
async fn test_stopped_heartbeat_emits_nothing_further() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    rig.service.start_heartbeat();
    helpers::settle().await;
    let emitted = rig.transport.published().len();
    assert_eq!(emitted, 1);

    rig.service.stop_heartbeat();
    tokio::time::advance(Duration::from_secs(60)).await;
    helpers::settle().await;

    assert_eq!(rig.transport.published().len(), emitted);
}

#[tokio::test(start_paused = true)]
async fn test_start_heartbeat_twice_does_not_double_emit() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    rig.service.start_heartbeat();
    rig.service.start_heartbeat();
    helpers::settle().await;

    // Interval is 15s: ticks at 0s, 15s, 30s.
    tokio::time::advance(Duration::from_secs(15)).await;
    helpers::settle().await;
    tokio::time::advance(Duration::from_secs(15)).await;
    helpers::settle().await;

    assert_eq!(rig.transport.published().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_pauses_while_disconnected() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    rig.service.start_heartbeat();
    helpers::settle().await;
    assert!(rig.service.is_user_online(&UserId::from("local")));

    // All further connect attempts fail; retries exhaust into Failed.
    rig.transport.fail_next_connects(10);
    rig.transport.drop_connection("network gone");
    tokio::time::sleep(Duration::from_secs(2)).await;
    helpers::settle().await;
    assert_eq!(rig.service.connection_status(), ConnectionState::Failed);

    // The heartbeat keeps ticking but emits nothing while disconnected,
    // so presence decays passively once the TTL passes.
    let emitted = rig.transport.published().len();
    tokio::time::sleep(Duration::from_secs(50)).await;
    helpers::settle().await;
    assert_eq!(rig.transport.published().len(), emitted);
    assert!(!rig.service.is_user_online(&UserId::from("local")));
}

#[tokio::test]
async fn test_inbound_liveness_marks_other_users_online() {
    let rig = helpers::harness();
    let _status = rig.service.on_status_change(|_, _| {});
    helpers::settle().await;

    rig.service.start_heartbeat();
    helpers::settle().await;

    rig.transport.inject(
        "private-online",
        "client-heartbeat",
        serde_json::json!({"user_id": "friend"}),
    );
    helpers::settle().await;

    assert!(rig.service.is_user_online(&UserId::from("friend")));
    assert!(!rig.service.is_user_online(&UserId::from("stranger")));
}
