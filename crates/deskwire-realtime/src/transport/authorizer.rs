//! Private-channel authorization against the application's auth endpoint.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use deskwire_core::session::Session;
use deskwire_core::{AppError, AppResult};

use super::ChannelAuth;

/// Signs private-channel subscription requests.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    /// Produce a signed authorization for subscribing `socket_id` to `channel`.
    async fn authorize(&self, socket_id: &str, channel: &str) -> AppResult<ChannelAuth>;
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    auth: String,
    #[serde(default)]
    channel_data: Option<String>,
}

/// Authorizer backed by the application's HTTP auth endpoint.
///
/// Posts the socket id and channel name with the current bearer token; the
/// endpoint returns the signed payload the backend expects in the
/// subscribe frame.
#[derive(Clone)]
pub struct HttpAuthorizer {
    endpoint: String,
    session: Arc<dyn Session>,
    client: reqwest::Client,
}

impl fmt::Debug for HttpAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAuthorizer")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpAuthorizer {
    /// Creates an authorizer for the given endpoint.
    pub fn new(endpoint: impl Into<String>, session: Arc<dyn Session>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelAuthorizer for HttpAuthorizer {
    async fn authorize(&self, socket_id: &str, channel: &str) -> AppResult<ChannelAuth> {
        let token = self
            .session
            .bearer_token()
            .ok_or_else(|| AppError::session("No active session token"))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "socket_id": socket_id,
                "channel_name": channel,
            }))
            .send()
            .await
            .map_err(|e| {
                AppError::transport_unavailable(format!("Auth endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::authorization_denied(format!(
                "Auth endpoint rejected subscription to '{channel}' ({status})"
            )));
        }
        if !status.is_success() {
            return Err(AppError::transport_unavailable(format!(
                "Auth endpoint returned {status} for '{channel}'"
            )));
        }

        let body: AuthResponse = response.json().await.map_err(|e| {
            AppError::transport_unavailable(format!("Invalid auth endpoint response: {e}"))
        })?;

        Ok(ChannelAuth {
            auth: body.auth,
            channel_data: body.channel_data,
        })
    }
}
