//! Websocket transport speaking the Pusher Channels protocol.
//!
//! Owns the socket, a writer task draining an outbound queue, a reader task
//! translating wire frames into [`TransportEvent`]s, and a keepalive task
//! issuing protocol pings. Frame encoding and TLS are delegated to
//! `tokio-tungstenite`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use deskwire_core::config::realtime::RealtimeConfig;
use deskwire_core::{AppError, AppResult};

use crate::message::types::{
    ConnectionEstablished, ProtocolError, SubscribeRequest, WireMessage, events,
};

use super::{ChannelAuth, Transport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
struct ActiveSocket {
    outbound: mpsc::Sender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

/// Websocket-backed [`Transport`].
#[derive(Debug)]
pub struct WsTransport {
    config: RealtimeConfig,
    events: mpsc::Sender<TransportEvent>,
    active: Mutex<Option<ActiveSocket>>,
    socket_id: Arc<Mutex<Option<String>>>,
}

impl WsTransport {
    /// Creates a transport for the configured endpoint. Events are pushed
    /// into `events` as they arrive.
    pub fn new(config: RealtimeConfig, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            config,
            events,
            active: Mutex::new(None),
            socket_id: Arc::new(Mutex::new(None)),
        }
    }

    fn teardown_active(&self) {
        let previous = self
            .active
            .lock()
            .expect("transport lock poisoned")
            .take();
        if let Some(active) = previous {
            let _ = active.outbound.try_send(Message::Close(None));
            active.reader.abort();
            active.keepalive.abort();
            active.writer.abort();
        }
        self.socket_id
            .lock()
            .expect("socket id lock poisoned")
            .take();
    }

    async fn send_frame(&self, frame: WireMessage) -> AppResult<()> {
        let outbound = {
            let active = self.active.lock().expect("transport lock poisoned");
            match active.as_ref() {
                Some(socket) => socket.outbound.clone(),
                None => return Err(AppError::transport_unavailable("not connected")),
            }
        };
        outbound
            .send(Message::text(frame.encode()?))
            .await
            .map_err(|_| AppError::transport_unavailable("connection closed"))
    }
}

async fn handle_text(
    raw: &str,
    events: &mpsc::Sender<TransportEvent>,
    socket_id: &Arc<Mutex<Option<String>>>,
    last_pong: &Arc<Mutex<Instant>>,
) {
    let msg = match WireMessage::parse(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Unparseable frame from backend");
            return;
        }
    };

    match msg.event.as_str() {
        events::CONNECTION_ESTABLISHED => {
            match serde_json::from_value::<ConnectionEstablished>(msg.data_value()) {
                Ok(payload) => {
                    *socket_id.lock().expect("socket id lock poisoned") =
                        Some(payload.socket_id.clone());
                    let _ = events
                        .send(TransportEvent::Connected {
                            socket_id: Some(payload.socket_id),
                        })
                        .await;
                }
                Err(e) => {
                    warn!(error = %e, "Malformed connection_established payload");
                }
            }
        }
        events::ERROR => {
            let payload: ProtocolError =
                serde_json::from_value(msg.data_value()).unwrap_or(ProtocolError {
                    code: None,
                    message: "unknown protocol error".to_string(),
                });
            let _ = events
                .send(TransportEvent::Error {
                    terminal: payload.is_terminal(),
                    message: payload.message,
                })
                .await;
        }
        events::SUBSCRIPTION_SUCCEEDED => {
            if let Some(channel) = msg.channel.clone() {
                let _ = events
                    .send(TransportEvent::SubscriptionSucceeded { channel })
                    .await;
            }
        }
        events::SUBSCRIPTION_ERROR => {
            if let Some(channel) = msg.channel.clone() {
                let message = msg.data_value()["message"]
                    .as_str()
                    .unwrap_or("subscription rejected")
                    .to_string();
                let _ = events
                    .send(TransportEvent::SubscriptionError { channel, message })
                    .await;
            }
        }
        events::PONG => {
            *last_pong.lock().expect("pong lock poisoned") = Instant::now();
        }
        _ => {
            if let Some(channel) = msg.channel.clone() {
                let _ = events
                    .send(TransportEvent::Message {
                        channel,
                        event: msg.event.clone(),
                        payload: msg.data_value(),
                    })
                    .await;
            } else {
                debug!(event = %msg.event, "Ignoring channel-less frame");
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> AppResult<()> {
        self.teardown_active();

        let url = self.config.websocket_url();
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_seconds);

        let (stream, _response): (WsStream, _) =
            match time::timeout(connect_timeout, connect_async(url.as_str())).await {
                Ok(Ok(established)) => established,
                Ok(Err(e)) => {
                    return Err(AppError::transport_unavailable(format!(
                        "Websocket connect failed: {e}"
                    )));
                }
                Err(_) => {
                    return Err(AppError::transport_unavailable(format!(
                        "Websocket connect timed out after {connect_timeout:?}"
                    )));
                }
            };

        debug!(url = %url, "Websocket established, awaiting handshake");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(self.config.event_buffer_size);
        let last_pong = Arc::new(Mutex::new(Instant::now()));

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let reader = {
            let events = self.events.clone();
            let socket_id = self.socket_id.clone();
            let last_pong = last_pong.clone();
            tokio::spawn(async move {
                loop {
                    match source.next().await {
                        Some(Ok(Message::Text(text))) => {
                            handle_text(text.as_str(), &events, &socket_id, &last_pong).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame.map(|f| f.reason.to_string());
                            let _ = events.send(TransportEvent::Disconnected { reason }).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = events
                                .send(TransportEvent::Disconnected {
                                    reason: Some(e.to_string()),
                                })
                                .await;
                            break;
                        }
                        None => {
                            let _ = events
                                .send(TransportEvent::Disconnected { reason: None })
                                .await;
                            break;
                        }
                    }
                }
            })
        };

        let keepalive = {
            let events = self.events.clone();
            let outbound = out_tx.clone();
            let last_pong = last_pong.clone();
            let ping_interval = Duration::from_secs(self.config.ping_interval_seconds);
            let pong_deadline =
                ping_interval + Duration::from_secs(self.config.ping_timeout_seconds);
            tokio::spawn(async move {
                let mut ticker = time::interval(ping_interval);
                ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
                // First tick completes immediately; skip it so the deadline
                // check starts one full interval after connect.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let stale = last_pong.lock().expect("pong lock poisoned").elapsed()
                        > pong_deadline;
                    if stale {
                        warn!("Ping timeout, dropping connection");
                        let _ = outbound.try_send(Message::Close(None));
                        let _ = events
                            .send(TransportEvent::Disconnected {
                                reason: Some("ping timeout".to_string()),
                            })
                            .await;
                        break;
                    }
                    let ping = WireMessage::new(events::PING, Value::Null);
                    if let Ok(raw) = ping.encode() {
                        if outbound.send(Message::text(raw)).await.is_err() {
                            break;
                        }
                    }
                }
            })
        };

        *self.active.lock().expect("transport lock poisoned") = Some(ActiveSocket {
            outbound: out_tx,
            reader,
            writer,
            keepalive,
        });

        Ok(())
    }

    async fn disconnect(&self) {
        self.teardown_active();
    }

    async fn subscribe(&self, channel: &str, auth: Option<ChannelAuth>) -> AppResult<()> {
        let request = SubscribeRequest {
            channel: channel.to_string(),
            auth: auth.as_ref().map(|a| a.auth.clone()),
            channel_data: auth.and_then(|a| a.channel_data),
        };
        let frame = WireMessage::new(events::SUBSCRIBE, serde_json::to_value(&request)?);
        self.send_frame(frame).await
    }

    async fn unsubscribe(&self, channel: &str) -> AppResult<()> {
        let frame = WireMessage::new(
            events::UNSUBSCRIBE,
            serde_json::json!({ "channel": channel }),
        );
        self.send_frame(frame).await
    }

    async fn publish(&self, channel: &str, event: &str, payload: &Value) -> AppResult<()> {
        let frame = WireMessage::on_channel(event, channel, payload.clone());
        self.send_frame(frame).await
    }

    fn socket_id(&self) -> Option<String> {
        self.socket_id
            .lock()
            .expect("socket id lock poisoned")
            .clone()
    }
}
