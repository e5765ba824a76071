//! Shared fixtures: a service wired over the in-process transport.

use std::sync::Arc;

use deskwire_core::config::AppConfig;
use deskwire_core::session::SharedSession;
use deskwire_core::types::UserId;
use deskwire_realtime::RealtimeService;
use deskwire_realtime::transport::{MemoryTransport, Transport};

/// A service plus the handles tests poke at.
pub struct TestHarness {
    pub service: Arc<RealtimeService>,
    pub transport: Arc<MemoryTransport>,
    pub session: Arc<SharedSession>,
}

/// Test configuration with short, bounded timings.
pub fn test_config() -> AppConfig {
    serde_json::from_value(serde_json::json!({
        "realtime": {
            "app_key": "test-key",
            "connect_timeout_seconds": 1,
            "reconnect_initial_ms": 5,
            "reconnect_multiplier": 2.0,
            "reconnect_max_ms": 20,
            "reconnect_stable_after_seconds": 30,
            "max_reconnect_attempts": 3,
            "event_buffer_size": 64
        },
        "presence": {
            "heartbeat_interval_seconds": 15,
            "ttl_seconds": 45
        }
    }))
    .expect("test config is valid")
}

/// Session already carrying a token for user `local`.
pub fn local_session() -> Arc<SharedSession> {
    Arc::new(SharedSession::with_session(
        "test-token",
        UserId::from("local"),
    ))
}

/// Builds a harness over a [`MemoryTransport`].
///
/// With `manual` set, the handshake only completes when the test calls
/// `complete_connect`.
pub fn build(session: Arc<SharedSession>, manual: bool) -> TestHarness {
    let mut slot: Option<Arc<MemoryTransport>> = None;
    let service = RealtimeService::with_transport(test_config(), session.clone(), None, |events| {
        let transport = Arc::new(if manual {
            MemoryTransport::manual(events)
        } else {
            MemoryTransport::new(events)
        });
        slot = Some(transport.clone());
        let dyn_transport: Arc<dyn Transport> = transport;
        dyn_transport
    });
    TestHarness {
        service,
        transport: slot.expect("factory ran"),
        session,
    }
}

/// Harness with an instantly-connecting transport and a live session.
pub fn harness() -> TestHarness {
    build(local_session(), false)
}

/// Harness whose handshake the test completes by hand.
pub fn manual_harness() -> TestHarness {
    build(local_session(), true)
}

/// Lets spawned tasks and the event pump drain.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
