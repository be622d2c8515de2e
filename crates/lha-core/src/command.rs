//! Wire-level toggle commands.
//!
//! Bus mode sends one `Switch.Toggle` RPC document. Direct mode has no toggle
//! primitive, so a toggle is simulated as "on", a short hold, then "off".

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{HttpMethod, HttpSettings, TransportConfig};
use crate::registry::PhysicalAddress;

pub const TOGGLE_METHOD: &str = "Switch.Toggle";

/// Command id carried in every RPC document.
pub const RPC_COMMAND_ID: u64 = 1;

/// Switch channel on the device (not the command id).
pub const SWITCH_CHANNEL: u32 = 0;

/// `{"id":1,"src":"<service>","method":"Switch.Toggle","params":{"id":0}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCommand {
    pub id: u64,
    pub src: String,
    pub method: String,
    pub params: RpcParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcParams {
    pub id: u32,
}

impl RpcCommand {
    pub fn toggle(src: impl Into<String>) -> Self {
        Self {
            id: RPC_COMMAND_ID,
            src: src.into(),
            method: TOGGLE_METHOD.to_string(),
            params: RpcParams { id: SWITCH_CHANNEL },
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Plain struct of strings and integers; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// One outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCall {
    pub method: HttpMethod,
    pub url: String,
}

/// On, hold, off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseCommand {
    pub on: HttpCall,
    pub off: HttpCall,
    pub hold: Duration,
}

/// A toggle, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedCommand {
    Rpc {
        target: String,
        topic: String,
        payload: RpcCommand,
    },
    Pulse {
        target: String,
        pulse: PulseCommand,
    },
}

impl EncodedCommand {
    pub fn target(&self) -> &str {
        match self {
            EncodedCommand::Rpc { target, .. } | EncodedCommand::Pulse { target, .. } => target,
        }
    }

    /// Upper bound for the whole command given the per-step timeout.
    /// Saturates at `Duration::MAX`.
    pub fn deadline(&self, timeout: Duration) -> Duration {
        match self {
            EncodedCommand::Rpc { .. } => timeout,
            EncodedCommand::Pulse { pulse, .. } => timeout.saturating_mul(2).saturating_add(pulse.hold),
        }
    }
}

/// Builds [`EncodedCommand`]s for registered targets.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    service_name: String,
    http: HttpSettings,
}

impl CommandEncoder {
    pub fn new(service_name: impl Into<String>, http: HttpSettings) -> Self {
        Self {
            service_name: service_name.into(),
            http,
        }
    }

    pub fn from_config(transport: &TransportConfig) -> Self {
        Self::new(transport.service_name.clone(), transport.http.clone())
    }

    pub fn encode(&self, target: &str, address: &PhysicalAddress) -> EncodedCommand {
        match address {
            PhysicalAddress::Topic(topic) => EncodedCommand::Rpc {
                target: target.to_string(),
                topic: topic.clone(),
                payload: RpcCommand::toggle(&self.service_name),
            },
            PhysicalAddress::Http(base) => {
                let call = |path: &str| HttpCall {
                    method: self.http.method,
                    url: join_path(base.as_str(), path),
                };
                EncodedCommand::Pulse {
                    target: target.to_string(),
                    pulse: PulseCommand {
                        on: call(&self.http.on_path),
                        off: call(&self.http.off_path),
                        hold: self.http.hold(),
                    },
                }
            }
        }
    }
}

fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
