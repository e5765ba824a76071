//! Integration tests for the connection supervisor state machine.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::Duration;

use deskwire_realtime::channel::registry::ChannelRegistry;
use deskwire_realtime::connection::supervisor::ConnectionSupervisor;
use deskwire_realtime::metrics::CoreMetrics;
use deskwire_realtime::transport::{MemoryTransport, Transport};
use deskwire_realtime::{ChannelKind, ConnectionState, handler};

use crate::helpers;

struct Rig {
    supervisor: Arc<ConnectionSupervisor>,
    transport: Arc<MemoryTransport>,
    registry: Arc<ChannelRegistry>,
}

fn rig(manual: bool) -> Rig {
    let metrics = Arc::new(CoreMetrics::new());
    let (tx, rx) = mpsc::channel(64);
    let transport = Arc::new(if manual {
        MemoryTransport::manual(tx)
    } else {
        MemoryTransport::new(tx)
    });
    let registry = Arc::new(ChannelRegistry::new(metrics.clone()));
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let supervisor = ConnectionSupervisor::new(
        helpers::test_config().realtime,
        dyn_transport,
        None,
        registry.clone(),
        metrics,
    );
    supervisor.start(rx);
    Rig {
        supervisor,
        transport,
        registry,
    }
}

#[tokio::test]
async fn test_connect_while_connecting_is_noop() {
    let rig = rig(true);

    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Connecting);
    assert_eq!(rig.transport.connect_calls(), 1);

    // A second connect while the handshake is pending issues nothing.
    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.transport.connect_calls(), 1);

    rig.transport.complete_connect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Connected);

    // And a third connect while connected is equally a no-op.
    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.transport.connect_calls(), 1);
}

#[tokio::test]
async fn test_observers_notified_in_registration_order() {
    let rig = rig(false);
    let log: Arc<Mutex<Vec<(&'static str, ConnectionState)>>> = Arc::new(Mutex::new(Vec::new()));

    let log_a = log.clone();
    let _a = rig.supervisor.on_status_change(Arc::new(move |state, _| {
        log_a.lock().unwrap().push(("a", state));
    }));
    let log_b = log.clone();
    let _b = rig.supervisor.on_status_change(Arc::new(move |state, _| {
        log_b.lock().unwrap().push(("b", state));
    }));

    rig.supervisor.connect();
    helpers::settle().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            ("a", ConnectionState::Connecting),
            ("b", ConnectionState::Connecting),
            ("a", ConnectionState::Connected),
            ("b", ConnectionState::Connected),
        ]
    );
}

#[tokio::test]
async fn test_released_observer_gets_no_further_callbacks() {
    let rig = rig(false);
    let count = Arc::new(Mutex::new(0u32));

    let observed = count.clone();
    let registration = rig.supervisor.on_status_change(Arc::new(move |_, _| {
        *observed.lock().unwrap() += 1;
    }));

    rig.supervisor.connect();
    helpers::settle().await;
    let before = *count.lock().unwrap();
    assert!(before >= 2, "saw connecting and connected");

    registration.release();
    registration.release(); // double release is a no-op

    rig.transport.drop_connection("flap");
    helpers::settle().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*count.lock().unwrap(), before);
}

#[tokio::test]
async fn test_terminal_error_reaches_failed_with_message() {
    let rig = rig(false);
    let seen: Arc<Mutex<Vec<(ConnectionState, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let _reg = rig.supervisor.on_status_change(Arc::new(move |state, error| {
        sink.lock().unwrap().push((state, error.map(String::from)));
    }));

    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Connected);

    rig.transport
        .emit_error("Unauthorized: app key rejected", true);
    helpers::settle().await;

    assert_eq!(rig.supervisor.status(), ConnectionState::Failed);
    assert!(
        rig.supervisor
            .last_error()
            .unwrap()
            .contains("Unauthorized")
    );

    let last = seen.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.0, ConnectionState::Failed);
    assert!(last.1.unwrap().contains("Unauthorized"));
}

#[tokio::test]
async fn test_retries_exhausted_then_manual_reconnect() {
    let rig = rig(false);
    rig.transport.fail_next_connects(10);

    rig.supervisor.connect();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // max_reconnect_attempts is 3 in the test config.
    assert_eq!(rig.supervisor.status(), ConnectionState::Failed);
    assert_eq!(rig.transport.connect_calls(), 3);

    // Failed is terminal: no further attempts happen on their own.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rig.transport.connect_calls(), 3);

    rig.transport.fail_next_connects(0);
    rig.supervisor.reconnect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_explicit_disconnect_clears_pending_reconnect() {
    let rig = rig(false);

    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Connected);
    let calls_when_connected = rig.transport.connect_calls();

    // Drop the connection, then disconnect before the backoff retry fires.
    rig.transport.fail_next_connects(10);
    rig.transport.drop_connection("flap");
    rig.supervisor.disconnect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Disconnected);
    assert_eq!(rig.transport.connect_calls(), calls_when_connected);
}

#[tokio::test]
async fn test_disconnect_then_connect_replays_tracked_channels() {
    let rig = rig(false);
    rig.registry.subscribe(
        "codes",
        ChannelKind::Public,
        vec![(".tick".to_string(), handler(|_| {}))],
    );
    rig.registry.subscribe(
        "trades",
        ChannelKind::Public,
        vec![(".tick".to_string(), handler(|_| {}))],
    );

    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.transport.subscribe_calls(), vec!["codes", "trades"]);

    rig.supervisor.disconnect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Disconnected);
    // Desired subscriptions survive an explicit disconnect.
    assert_eq!(rig.registry.tracked_channels(), vec!["codes", "trades"]);

    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Connected);
    assert_eq!(
        rig.transport.subscribe_calls(),
        vec!["codes", "trades", "codes", "trades"]
    );
}

#[tokio::test]
async fn test_drop_while_connected_reconnects_automatically() {
    let rig = rig(false);

    rig.supervisor.connect();
    helpers::settle().await;
    assert_eq!(rig.supervisor.status(), ConnectionState::Connected);

    rig.transport.drop_connection("network blip");
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(rig.supervisor.status(), ConnectionState::Connected);
    assert_eq!(rig.transport.connect_calls(), 2);
}
