//! drive-guard-daemon: safety gate for the in-car assistant
//!
//! This daemon runs beside the assistant's orchestrator and provides:
//! - Vehicle state detection (PARKED / DRIVING / GARAGE) from telemetry polls
//! - Manual state override with the moving-vehicle safety lock
//! - Driving-mode response validation before text reaches the driver
//! - IPC server for the orchestrator and status displays
//!
//! It does NOT read the OBD port, call the language model or speak.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use drive_guard::clock::{Clock, MonotonicClock};
use drive_guard::config::Config;
use drive_guard::events::StateEvent;
use drive_guard::ipc::{Server, ServerContext};
use drive_guard::lifecycle::ShutdownSignal;
use drive_guard::state::{StateHandle, StateManager, StateService};
use drive_guard::validator::ResponseValidator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "drive-guard-daemon starting"
    );

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        speed_threshold_mph = config.state.speed_threshold_mph,
        hysteresis_secs = config.state.hysteresis_secs,
        max_len = config.validator.max_len,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new()?;

    // State manager -> IPC subscribers and the event logger
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);

    let clock = MonotonicClock::new();
    let manager = StateManager::new(config.state.clone(), event_tx.clone(), clock.now());
    let mut state_service = StateService::new(manager, clock);
    let (state_handle, command_rx) = StateHandle::channel(32);

    let validator = Arc::new(ResponseValidator::new(config.validator.clone())?);

    let context = ServerContext::new(state_handle, validator, event_tx.clone());
    let server = Server::new(&config.socket_path, context)?;

    let mut log_event_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the state service (serializes every state mutation)
        _ = state_service.run(command_rx) => {
            info!("state service exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log state events
        _ = async {
            loop {
                match log_event_rx.recv().await {
                    Ok(event) => info!(%event, "state event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("state event logger exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    server.shutdown().await;

    info!("drive-guard-daemon stopped");

    Ok(())
}
