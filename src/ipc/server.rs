//! Unix domain socket server for IPC
//!
//! Provides request-response communication for the orchestrator and push
//! notifications of state events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::{StateServiceError, TelemetryError};
use crate::events::StateEvent;
use crate::state::{StateHandle, VehicleState};
use crate::telemetry::{sample_from_frame, TelemetryFrame};
use crate::validator::ResponseValidator;

use super::protocol::{read_frame, write_message, DaemonStatus, Notification, Request, Response};

/// What every client handler needs
pub struct ServerContext {
    pub state: StateHandle,
    pub validator: Arc<ResponseValidator>,
    /// Sender side of the state event channel, for new subscriptions
    pub events: broadcast::Sender<StateEvent>,
    start_time: Instant,
}

impl ServerContext {
    pub fn new(
        state: StateHandle,
        validator: Arc<ResponseValidator>,
        events: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            state,
            validator,
            events,
            start_time: Instant::now(),
        }
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Parsed request, or why the frame could not be parsed
type Incoming = std::result::Result<Request, String>;

enum ClientInput {
    Request(Option<Incoming>),
    Event(std::result::Result<StateEvent, RecvError>),
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, context: ServerContext) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context: Arc::new(context),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Reads happen on their own task so a pushed event never interrupts
        // a partially read frame
        let (request_tx, mut request_rx) = mpsc::channel(8);
        let mut reader_task = tokio::spawn(Self::read_requests(reader, request_tx));

        let mut events: Option<broadcast::Receiver<StateEvent>> = None;

        let result = loop {
            let input = tokio::select! {
                request = request_rx.recv() => ClientInput::Request(request),
                event = next_event(&mut events) => ClientInput::Event(event),
            };

            match input {
                ClientInput::Request(None) => {
                    // Reader is done; a clean EOF and a read failure both land here
                    break match (&mut reader_task).await {
                        Ok(Ok(())) => {
                            debug!("client disconnected");
                            Ok(())
                        }
                        Ok(Err(e)) => Err(e.context("client read failed")),
                        Err(e) => Err(anyhow::Error::new(e).context("client reader task failed")),
                    };
                }
                ClientInput::Request(Some(Err(message))) => {
                    warn!(%message, "malformed request");
                    let response = Response::error("bad_request", message);
                    if let Err(e) = write_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                ClientInput::Request(Some(Ok(request))) => {
                    debug!(?request, "received request");
                    let (response, subscribe) = Self::process_request(request, &context).await;
                    if subscribe && events.is_none() {
                        events = Some(context.events.subscribe());
                        debug!("client subscribed to notifications");
                    }
                    if let Err(e) = write_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                ClientInput::Event(Ok(event)) => {
                    if let Err(e) = write_message(&mut writer, &Notification::StateEvent(event)).await {
                        break Err(e);
                    }
                }
                ClientInput::Event(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "subscriber lagged, events dropped");
                }
                ClientInput::Event(Err(RecvError::Closed)) => {
                    events = None;
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Parse frames from the client until it disconnects
    async fn read_requests(mut reader: OwnedReadHalf, request_tx: mpsc::Sender<Incoming>) -> Result<()> {
        while let Some(frame) = read_frame(&mut reader).await? {
            let parsed = serde_json::from_slice::<Request>(&frame).map_err(|e| e.to_string());
            if request_tx.send(parsed).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, context: &ServerContext) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let response = match context.state.diagnostics().await {
                    Ok(diagnostics) => {
                        let uptime_secs = context.start_time.elapsed().as_secs();
                        Response::Status(DaemonStatus::new(uptime_secs, diagnostics))
                    }
                    Err(e) => service_error(e),
                };
                (response, false)
            }

            Request::Evaluate { telemetry } => {
                let sample = telemetry_sample(telemetry);
                let response = match context.state.evaluate(sample).await {
                    Ok(state) => Response::State { state },
                    Err(e) => service_error(e),
                };
                (response, false)
            }

            Request::SetOverride { state } => {
                let response = match context.state.set_override(state).await {
                    Ok(state) => Response::OverrideApplied { state },
                    Err(e) => service_error(e),
                };
                (response, false)
            }

            Request::ClearOverride => {
                let response = match context.state.clear_override().await {
                    Ok(state) => Response::OverrideCleared { state },
                    Err(e) => service_error(e),
                };
                (response, false)
            }

            Request::Reset => {
                let response = match context.state.reset().await {
                    Ok(state) => Response::State { state },
                    Err(e) => service_error(e),
                };
                (response, false)
            }

            Request::Validate { text, state } => {
                let state = match state {
                    Some(state) => state,
                    None => current_state(context).await,
                };
                let result = context.validator.validate(&text, state);
                (Response::Validation { result }, false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Wait on the subscription if there is one, otherwise never resolve
async fn next_event(
    events: &mut Option<broadcast::Receiver<StateEvent>>,
) -> std::result::Result<StateEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Malformed telemetry is treated exactly like missing telemetry
fn telemetry_sample(frame: Option<TelemetryFrame>) -> Option<crate::telemetry::TelemetrySample> {
    match sample_from_frame(frame) {
        Ok(sample) => Some(sample),
        Err(TelemetryError::Unavailable) => None,
        Err(e) => {
            warn!(error = %e, "discarding invalid telemetry frame");
            None
        }
    }
}

/// State to validate against when the caller did not name one
async fn current_state(context: &ServerContext) -> VehicleState {
    match context.state.diagnostics().await {
        Ok(diagnostics) => diagnostics.state,
        Err(e) => {
            // Unknown state: apply the strictest policy
            warn!(error = %e, "state unavailable, validating as DRIVING");
            VehicleState::Driving
        }
    }
}

fn service_error(err: StateServiceError) -> Response {
    match err {
        StateServiceError::Closed => Response::error("unavailable", err),
        StateServiceError::Override(e) => Response::error(e.code(), e),
    }
}
