//! Single owning task for the state manager
//!
//! Every mutation of the snapshot goes through one mpsc channel, so
//! telemetry polls and override commands from independent tasks never race.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{OverrideError, StateServiceError};
use crate::telemetry::TelemetrySample;

use super::machine::{Diagnostics, StateManager, VehicleState};

/// Requests accepted by [`StateService`]
#[derive(Debug)]
pub enum StateCommand {
    Evaluate {
        telemetry: Option<TelemetrySample>,
        reply: oneshot::Sender<VehicleState>,
    },
    SetOverride {
        name: String,
        reply: oneshot::Sender<Result<VehicleState, OverrideError>>,
    },
    ClearOverride {
        reply: oneshot::Sender<VehicleState>,
    },
    Diagnostics {
        reply: oneshot::Sender<Diagnostics>,
    },
    Reset {
        reply: oneshot::Sender<VehicleState>,
    },
}

/// Owns a [`StateManager`] and stamps every command with the clock
pub struct StateService<C: Clock> {
    manager: StateManager,
    clock: C,
}

impl<C: Clock> StateService<C> {
    pub fn new(manager: StateManager, clock: C) -> Self {
        Self { manager, clock }
    }

    /// Run until every [`StateHandle`] has been dropped
    pub async fn run(&mut self, mut command_rx: mpsc::Receiver<StateCommand>) {
        info!(state = %self.manager.state(), "state service started");

        while let Some(command) = command_rx.recv().await {
            self.handle(command);
        }

        info!("state service stopped");
    }

    fn handle(&mut self, command: StateCommand) {
        let now = self.clock.now();
        // A dropped reply means the requester gave up; nothing to do
        match command {
            StateCommand::Evaluate { telemetry, reply } => {
                let _ = reply.send(self.manager.evaluate(telemetry, now));
            }
            StateCommand::SetOverride { name, reply } => {
                debug!(%name, "override requested");
                let _ = reply.send(self.manager.set_override(Some(&name), now));
            }
            StateCommand::ClearOverride { reply } => {
                let _ = reply.send(self.manager.clear_override(now));
            }
            StateCommand::Diagnostics { reply } => {
                let _ = reply.send(self.manager.diagnostics(now));
            }
            StateCommand::Reset { reply } => {
                let _ = reply.send(self.manager.reset(now));
            }
        }
    }
}

/// Cloneable client side of the state service
#[derive(Debug, Clone)]
pub struct StateHandle {
    command_tx: mpsc::Sender<StateCommand>,
}

impl StateHandle {
    /// Create a handle and the receiver to pass to [`StateService::run`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StateCommand>) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        (Self { command_tx }, command_rx)
    }

    pub async fn evaluate(&self, telemetry: Option<TelemetrySample>) -> Result<VehicleState, StateServiceError> {
        self.request(|reply| StateCommand::Evaluate { telemetry, reply })
            .await
    }

    pub async fn set_override(&self, name: impl Into<String>) -> Result<VehicleState, StateServiceError> {
        let name = name.into();
        let result = self
            .request(|reply| StateCommand::SetOverride { name, reply })
            .await?;
        Ok(result?)
    }

    pub async fn clear_override(&self) -> Result<VehicleState, StateServiceError> {
        self.request(|reply| StateCommand::ClearOverride { reply })
            .await
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, StateServiceError> {
        self.request(|reply| StateCommand::Diagnostics { reply })
            .await
    }

    pub async fn reset(&self) -> Result<VehicleState, StateServiceError> {
        self.request(|reply| StateCommand::Reset { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StateCommand,
    ) -> Result<T, StateServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateServiceError::Closed)?;
        reply_rx.await.map_err(|_| StateServiceError::Closed)
    }
}
