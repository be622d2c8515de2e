//! Transport errors.

use thiserror::Error;

/// Why a command was not confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No acknowledgment within the deadline; the command may still arrive.
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    /// Connection refused, reset, or the client is gone.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker client refused the publish.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Non-2xx answer from the actuator.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The command was meant for a different transport.
    #[error("Unsupported command: {0}")]
    Unsupported(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
