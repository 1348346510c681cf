//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::events::StateEvent;
use crate::state::{Diagnostics, VehicleState};
use crate::telemetry::TelemetryFrame;
use crate::validator::ValidationResult;

/// Upper bound on a single message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from the orchestrator to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current state and diagnostics
    GetStatus,

    /// Feed one telemetry poll; `null` means telemetry is unavailable
    Evaluate {
        #[serde(default)]
        telemetry: Option<TelemetryFrame>,
    },

    /// Pin the state by name
    SetOverride { state: String },

    /// Return to automatic detection
    ClearOverride,

    /// Back to the startup state: PARKED, no override, nothing pending
    Reset,

    /// Check a response before it is spoken; defaults to the current state
    Validate {
        text: String,
        #[serde(default)]
        state: Option<VehicleState>,
    },

    /// Subscribe to state event notifications
    Subscribe,
}

/// Responses from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Confirmed state after an evaluation or reset
    State { state: VehicleState },

    OverrideApplied { state: VehicleState },

    OverrideCleared { state: VehicleState },

    Validation { result: ValidationResult },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl std::fmt::Display) -> Self {
        Response::Error {
            code: code.to_owned(),
            message: message.to_string(),
        }
    }
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum Notification {
    StateEvent(StateEvent),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    pub diagnostics: Diagnostics,
}

impl DaemonStatus {
    pub fn new(uptime_secs: u64, diagnostics: Diagnostics) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            diagnostics,
        }
    }
}

/// Read one length-prefixed frame; `None` on a clean disconnect
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        bail!("message too large: {len} bytes");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
pub async fn write_message<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}
