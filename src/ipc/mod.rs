//! IPC module for orchestrator-daemon communication

mod protocol;
mod server;

pub use protocol::{read_frame, write_message, DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};
pub use server::{Server, ServerContext};
