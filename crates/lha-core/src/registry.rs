//! Static mapping from logical target names to physical addresses.

use std::collections::BTreeMap;

use crate::config::{RelayConfig, TransportMode};
use crate::error::{ConfigError, RegistryError};

/// Where a target's commands go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhysicalAddress {
    /// Base URL of the actuator's HTTP API (direct mode).
    Http(url::Url),
    /// Bus topic the actuator listens on (MQTT mode).
    Topic(String),
}

impl PhysicalAddress {
    pub fn mode(&self) -> TransportMode {
        match self {
            PhysicalAddress::Http(_) => TransportMode::Http,
            PhysicalAddress::Topic(_) => TransportMode::Mqtt,
        }
    }
}

impl std::fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhysicalAddress::Http(url) => write!(f, "{}", url),
            PhysicalAddress::Topic(topic) => write!(f, "mqtt://{}", topic),
        }
    }
}

/// Immutable target registry, built once from configuration.
///
/// This is the only gate between a request path segment and a network
/// destination: anything not registered here is never contacted.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: BTreeMap<String, PhysicalAddress>,
}

impl TargetRegistry {
    /// Build the registry for the configured transport mode.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let mode = config.transport.mode;
        let mut targets = BTreeMap::new();

        for (name, settings) in &config.targets {
            let address = match mode {
                TransportMode::Mqtt => {
                    let topic = settings.topic.clone().ok_or_else(|| {
                        ConfigError::invalid(format!("targets.{}.topic", name), "required in mqtt mode")
                    })?;
                    PhysicalAddress::Topic(topic)
                }
                TransportMode::Http => {
                    let key = format!("targets.{}.url", name);
                    let raw = settings
                        .url
                        .as_deref()
                        .ok_or_else(|| ConfigError::invalid(key.clone(), "required in http mode"))?;
                    let url = url::Url::parse(raw)
                        .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
                    PhysicalAddress::Http(url)
                }
            };
            targets.insert(name.clone(), address);
        }

        Ok(Self { targets })
    }

    /// Build directly from pairs.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, PhysicalAddress)>,
        S: Into<String>,
    {
        Self {
            targets: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Look up a target.
    pub fn resolve(&self, target: &str) -> Result<&PhysicalAddress, RegistryError> {
        self.targets
            .get(target)
            .ok_or_else(|| RegistryError::UnknownTarget(target.to_string()))
    }

    pub fn contains(&self, target: &str) -> bool {
        self.targets.contains_key(target)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PhysicalAddress)> {
        self.targets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
