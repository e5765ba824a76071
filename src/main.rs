//! Deskwire Monitor
//!
//! Connectivity diagnostic binary: wires the realtime core together,
//! observes status transitions, runs the presence heartbeat, and reports
//! who is online until interrupted.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use deskwire_core::config::AppConfig;
use deskwire_core::error::AppError;
use deskwire_core::session::SharedSession;
use deskwire_core::types::UserId;
use deskwire_realtime::{RealtimeService, handler};

#[tokio::main]
async fn main() {
    let env = std::env::var("DESKWIRE_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Monitor error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main monitor run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Deskwire Monitor v{}", env!("CARGO_PKG_VERSION"));

    let session = Arc::new(build_session()?);
    let service = RealtimeService::new(config, session);

    // The observer handle keeps the connection alive until shutdown.
    let _status = service.on_status_change(|state, error| match error {
        Some(error) => tracing::warn!(state = %state, error = %error, "Connection status"),
        None => tracing::info!(state = %state, "Connection status"),
    });

    service.start_heartbeat();

    for (channel, event) in watched_channels() {
        tracing::info!(channel = %channel, event = %event, "Watching channel");
        service.subscribe(
            &channel,
            vec![(
                event.clone(),
                handler(move |payload| {
                    tracing::info!(payload = %payload, "Channel event");
                }),
            )],
        );
    }

    let report = {
        let service = service.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let online = service.online_users();
                tracing::info!(
                    online = online.len(),
                    users = ?online.iter().map(UserId::as_str).collect::<Vec<_>>(),
                    "Presence report"
                );
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Signal handler failed: {e}")))?;

    tracing::info!("Shutting down");
    report.abort();
    service.shutdown();
    Ok(())
}

/// Builds the session from environment variables. Token acquisition is
/// the surrounding application's job; the monitor just consumes one.
fn build_session() -> Result<SharedSession, AppError> {
    let token = std::env::var("DESKWIRE_TOKEN")
        .map_err(|_| AppError::session("DESKWIRE_TOKEN is not set"))?;
    let user = std::env::var("DESKWIRE_USER")
        .map_err(|_| AppError::session("DESKWIRE_USER is not set"))?;
    Ok(SharedSession::with_session(token, UserId::from(user)))
}

/// Channel/event pairs to watch, from `DESKWIRE_WATCH` as a
/// comma-separated list of `channel:event` entries.
fn watched_channels() -> Vec<(String, String)> {
    std::env::var("DESKWIRE_WATCH")
        .unwrap_or_default()
        .split(',')
        .filter_map(|entry| {
            let (channel, event) = entry.trim().split_once(':')?;
            Some((channel.to_string(), event.to_string()))
        })
        .collect()
}
