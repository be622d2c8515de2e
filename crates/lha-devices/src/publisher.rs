//! The transport seam.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lha_core::EncodedCommand;

use crate::error::{TransportError, TransportResult};

/// Delivery confirmation for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub target: String,
    /// Transport-level detail (packet id, HTTP status line).
    pub detail: String,
    pub elapsed: Duration,
}

/// Bus connection state, for status reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Transports without a persistent connection.
    NotApplicable,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::NotApplicable => "n/a",
        }
    }
}

/// Sends encoded commands to actuators.
#[async_trait]
pub trait TransportPublisher: Send + Sync {
    /// Short name for logs ("mqtt", "http").
    fn name(&self) -> &str;

    /// Deliver the command and wait for its acknowledgment. May never
    /// return; callers go through [`TransportPublisher::send`].
    async fn publish(&self, command: &EncodedCommand) -> TransportResult<Ack>;

    /// [`publish`](TransportPublisher::publish) raced against `timeout`.
    /// Whichever settles first decides the result; the other is dropped.
    async fn send(&self, command: &EncodedCommand, timeout: Duration) -> TransportResult<Ack> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.publish(command)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    category = self.name(),
                    side = command.target(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "No acknowledgment before deadline"
                );
                Err(TransportError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    async fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::NotApplicable
    }

    /// Release long-lived resources. Default: nothing to release.
    async fn shutdown(&self) {}
}
