//! Direct HTTP transport.
//!
//! Relay boards with level-set APIs (`/relay/0?turn=on|off`) have no toggle
//! call, so a toggle is an "on" request, a hold, then an "off" request. Each
//! request is bounded by the client timeout; "off" is only sent after "on"
//! succeeded.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lha_core::config::HttpMethod;
use lha_core::{EncodedCommand, HttpCall, PulseCommand};
use reqwest::Client;
use tracing::{debug, error, info};

use crate::error::{TransportError, TransportResult};
use crate::publisher::{Ack, TransportPublisher};

/// Sends pulse commands with `reqwest`.
pub struct HttpPublisher {
    client: Client,
    request_timeout: Duration,
}

impl HttpPublisher {
    /// Create a publisher whose individual requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn call(&self, call: &HttpCall) -> TransportResult<u16> {
        let request = match call.method {
            HttpMethod::Get => self.client.get(&call.url),
            HttpMethod::Post => self.client.post(&call.url),
        };

        let response = request.send().await.map_err(|e| self.classify(&call.url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: call.url.clone(),
                status: status.as_u16(),
            });
        }
        debug!(category = "http", url = %call.url, status = status.as_u16(), "Relay call succeeded");
        Ok(status.as_u16())
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.request_timeout.as_millis() as u64)
        } else if let Some(status) = e.status() {
            TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            TransportError::Connection(format!("{}: {}", url, e))
        }
    }

    async fn pulse(&self, target: &str, pulse: &PulseCommand) -> TransportResult<Ack> {
        let started = Instant::now();

        self.call(&pulse.on).await.inspect_err(|e| {
            error!(category = "http", side = target, error = %e, "Relay 'on' call failed, skipping 'off'");
        })?;

        tokio::time::sleep(pulse.hold).await;

        let status = self.call(&pulse.off).await.inspect_err(|e| {
            error!(
                category = "http",
                side = target,
                error = %e,
                "Relay 'off' call failed after 'on' succeeded; actuator may be left on"
            );
        })?;

        info!(category = "http", side = target, elapsed_ms = started.elapsed().as_millis() as u64, "Relay pulsed");
        Ok(Ack {
            target: target.to_string(),
            detail: format!("on/off HTTP {}", status),
            elapsed: started.elapsed(),
        })
    }
}

#[async_trait]
impl TransportPublisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, command: &EncodedCommand) -> TransportResult<Ack> {
        match command {
            EncodedCommand::Pulse { target, pulse } => self.pulse(target, pulse).await,
            EncodedCommand::Rpc { target, .. } => Err(TransportError::Unsupported(format!(
                "rpc command for '{}' on http transport",
                target
            ))),
        }
    }
}
