//! Turns an authorized toggle request into one transport command.
//!
//! The dispatcher validates the target before doing any I/O, encodes the
//! command for the active transport, and waits for the acknowledgment up to
//! the command's deadline. Nothing is retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lha_core::{CommandEncoder, TargetRegistry};
use lha_devices::TransportPublisher;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::models::ApiError;

/// Body of a successful toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub status: String,
    pub action: String,
    pub side: String,
}

impl ToggleResponse {
    pub fn toggled(side: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            action: "toggle".to_string(),
            side: side.into(),
        }
    }
}

/// Dispatch stages after the middleware pipeline has let the request through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Validating,
    Publishing,
    Responding,
}

impl DispatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStage::Validating => "validating",
            DispatchStage::Publishing => "publishing",
            DispatchStage::Responding => "responding",
        }
    }
}

/// Registry, encoder and publisher bound together.
pub struct CommandDispatcher {
    registry: TargetRegistry,
    encoder: CommandEncoder,
    publisher: Arc<dyn TransportPublisher>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        registry: TargetRegistry,
        encoder: CommandEncoder,
        publisher: Arc<dyn TransportPublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            encoder,
            publisher,
            timeout,
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn publisher(&self) -> &Arc<dyn TransportPublisher> {
        &self.publisher
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Toggle `target` once.
    pub async fn toggle(&self, target: &str) -> Result<ToggleResponse, ApiError> {
        debug!(category = "dispatch", stage = DispatchStage::Validating.as_str(), side = target, "Resolving target");
        let address = self.registry.resolve(target).map_err(|e| {
            warn!(category = "dispatch", side = target, "Rejected unknown target");
            ApiError::from(e)
        })?;

        let command = self.encoder.encode(target, address);
        let deadline = command.deadline(self.timeout);
        debug!(
            category = "dispatch",
            stage = DispatchStage::Publishing.as_str(),
            side = target,
            address = %address,
            transport = self.publisher.name(),
            deadline_ms = deadline.as_millis() as u64,
            "Publishing toggle"
        );

        let started = Instant::now();
        let ack = self.publisher.send(&command, deadline).await.map_err(|e| {
            error!(
                category = "dispatch",
                side = target,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Toggle failed"
            );
            ApiError::from(e)
        })?;

        info!(
            category = "dispatch",
            stage = DispatchStage::Responding.as_str(),
            side = target,
            detail = %ack.detail,
            elapsed_ms = ack.elapsed.as_millis() as u64,
            "Toggle acknowledged"
        );
        Ok(ToggleResponse::toggled(target))
    }
}
