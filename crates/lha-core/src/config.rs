//! Relay configuration.
//!
//! A single [`RelayConfig`] is built once at startup: defaults (or a TOML
//! file), then environment overrides, then [`RelayConfig::validate`]. The
//! result is immutable and shared by reference.
//!
//! ```toml
//! [server]
//! port = 3000
//!
//! [transport]
//! mode = "mqtt"
//! timeout_ms = 3000
//!
//! [transport.mqtt]
//! host = "broker.local"
//!
//! [targets.left]
//! topic = "lha/left/rpc"
//! url = "http://192.168.1.50"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default values.
pub mod defaults {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 3000;
    pub const SERVICE_NAME: &str = "lha-server";
    pub const TIMEOUT_MS: u64 = 3000;
    pub const MQTT_HOST: &str = "localhost";
    pub const MQTT_PORT: u16 = 1883;
    pub const MQTT_KEEP_ALIVE_SECS: u64 = 60;
    pub const HTTP_ON_PATH: &str = "/relay/0?turn=on";
    pub const HTTP_OFF_PATH: &str = "/relay/0?turn=off";
    pub const HTTP_HOLD_MS: u64 = 500;
    pub const GLOBAL_MAX_REQUESTS: u32 = 20;
    pub const TOGGLE_MAX_REQUESTS: u32 = 10;
    pub const WINDOW_SECS: u64 = 60;
    /// Upper bound for `transport.timeout_ms`.
    pub const MAX_TIMEOUT_MS: u64 = 60_000;
    /// Upper bound for `transport.http.hold_ms`.
    pub const MAX_HOLD_MS: u64 = 60_000;
    pub const TARGETS: [&str; 3] = ["left", "right", "gate"];
}

/// Environment variable names.
pub mod env_vars {
    pub const JWT_SECRET: &str = "LHA_JWT_SECRET";
    pub const HOST: &str = "LHA_HOST";
    pub const PORT: &str = "LHA_PORT";
    pub const TRANSPORT: &str = "LHA_TRANSPORT";
    pub const MQTT_HOST: &str = "LHA_MQTT_HOST";
    pub const MQTT_PORT: &str = "LHA_MQTT_PORT";
    pub const MQTT_USERNAME: &str = "LHA_MQTT_USERNAME";
    pub const MQTT_PASSWORD: &str = "LHA_MQTT_PASSWORD";
    pub const SERVICE_NAME: &str = "LHA_SERVICE_NAME";
    pub const TIMEOUT_MS: &str = "LHA_TIMEOUT_MS";
    pub const TRUST_FORWARDED_FOR: &str = "LHA_TRUST_FORWARDED_FOR";
}

/// Default bus topic for a target.
pub fn default_topic(target: &str) -> String {
    format!("lha/{}/rpc", target)
}

/// How commands reach the actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Publish a `Switch.Toggle` RPC on the MQTT broker.
    #[default]
    Mqtt,
    /// Call the actuator's HTTP relay endpoint directly (on, hold, off).
    Http,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Mqtt => "mqtt",
            TransportMode::Http => "http",
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mqtt" | "bus" => Ok(TransportMode::Mqtt),
            "http" | "direct" => Ok(TransportMode::Http),
            other => Err(ConfigError::invalid(
                "transport.mode",
                format!("expected \"mqtt\" or \"http\", got \"{}\"", other),
            )),
        }
    }
}

/// HTTP method used for direct-mode relay calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Target name -> physical addresses. Replaces the defaults entirely when given.
    #[serde(default = "default_targets")]
    pub targets: BTreeMap<String, TargetSettings>,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use the first `X-Forwarded-For` entry as the client identity.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Credential verification settings.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Shared HS256 secret.
    #[serde(default)]
    pub jwt_secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// Both request budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_global_window")]
    pub global: WindowSettings,
    #[serde(default = "default_toggle_window")]
    pub toggle: WindowSettings,
}

/// One fixed-window budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSettings {
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl WindowSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Transport selection and per-mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub mode: TransportMode,
    /// Acknowledgment timeout (bus) or per-request timeout (HTTP).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// `src` label carried in bus commands.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Broker connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Generated per process when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl MqttSettings {
    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

/// Direct-mode relay endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_on_path")]
    pub on_path: String,
    #[serde(default = "default_off_path")]
    pub off_path: String,
    /// Delay between "on" and "off".
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

impl HttpSettings {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

/// Physical addresses for one target. Only the one matching the active mode is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSettings {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_host() -> String {
    defaults::HOST.to_string()
}
fn default_port() -> u16 {
    defaults::PORT
}
fn default_timeout_ms() -> u64 {
    defaults::TIMEOUT_MS
}
fn default_service_name() -> String {
    defaults::SERVICE_NAME.to_string()
}
fn default_mqtt_host() -> String {
    defaults::MQTT_HOST.to_string()
}
fn default_mqtt_port() -> u16 {
    defaults::MQTT_PORT
}
fn default_keep_alive() -> u64 {
    defaults::MQTT_KEEP_ALIVE_SECS
}
fn default_on_path() -> String {
    defaults::HTTP_ON_PATH.to_string()
}
fn default_off_path() -> String {
    defaults::HTTP_OFF_PATH.to_string()
}
fn default_hold_ms() -> u64 {
    defaults::HTTP_HOLD_MS
}
fn default_window_secs() -> u64 {
    defaults::WINDOW_SECS
}
fn default_global_window() -> WindowSettings {
    WindowSettings {
        max_requests: defaults::GLOBAL_MAX_REQUESTS,
        window_secs: defaults::WINDOW_SECS,
    }
}
fn default_toggle_window() -> WindowSettings {
    WindowSettings {
        max_requests: defaults::TOGGLE_MAX_REQUESTS,
        window_secs: defaults::WINDOW_SECS,
    }
}
fn default_targets() -> BTreeMap<String, TargetSettings> {
    defaults::TARGETS
        .iter()
        .map(|name| {
            (
                name.to_string(),
                TargetSettings {
                    topic: Some(default_topic(name)),
                    url: None,
                },
            )
        })
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global: default_global_window(),
            toggle: default_toggle_window(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::default(),
            timeout_ms: default_timeout_ms(),
            service_name: default_service_name(),
            mqtt: MqttSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            client_id: None,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            method: HttpMethod::default(),
            on_path: default_on_path(),
            off_path: default_off_path(),
            hold_ms: default_hold_ms(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitSettings::default(),
            transport: TransportConfig::default(),
            targets: default_targets(),
        }
    }
}

impl RelayConfig {
    /// Load from an optional TOML file plus the process environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        if let Err(e) = config.validate() {
            tracing::error!(category = "config", error = %e, "Configuration rejected");
            return Err(e);
        }
        tracing::debug!(
            category = "config",
            file = ?path,
            mode = config.transport.mode.as_str(),
            targets = config.targets.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse a TOML file without applying overrides or validating.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = get(env_vars::JWT_SECRET) {
            self.auth.jwt_secret = secret;
        }
        if let Some(host) = get(env_vars::HOST) {
            self.server.host = host;
        }
        if let Some(port) = get(env_vars::PORT) {
            self.server.port = parse_value(env_vars::PORT, &port)?;
        }
        if let Some(flag) = get(env_vars::TRUST_FORWARDED_FOR) {
            self.server.trust_forwarded_for = parse_value(env_vars::TRUST_FORWARDED_FOR, &flag)?;
        }
        if let Some(mode) = get(env_vars::TRANSPORT) {
            self.transport.mode = mode.parse()?;
        }
        if let Some(timeout) = get(env_vars::TIMEOUT_MS) {
            self.transport.timeout_ms = parse_value(env_vars::TIMEOUT_MS, &timeout)?;
        }
        if let Some(name) = get(env_vars::SERVICE_NAME) {
            self.transport.service_name = name;
        }
        if let Some(host) = get(env_vars::MQTT_HOST) {
            self.transport.mqtt.host = host;
        }
        if let Some(port) = get(env_vars::MQTT_PORT) {
            self.transport.mqtt.port = parse_value(env_vars::MQTT_PORT, &port)?;
        }
        if let Some(user) = get(env_vars::MQTT_USERNAME) {
            self.transport.mqtt.username = Some(user);
        }
        if let Some(pass) = get(env_vars::MQTT_PASSWORD) {
            self.transport.mqtt.password = Some(pass);
        }
        Ok(())
    }

    /// Check every invariant the rest of the relay relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Missing(env_vars::JWT_SECRET));
        }
        if self.transport.timeout_ms == 0 || self.transport.timeout_ms > defaults::MAX_TIMEOUT_MS {
            return Err(ConfigError::invalid(
                "transport.timeout_ms",
                format!("must be between 1 and {}", defaults::MAX_TIMEOUT_MS),
            ));
        }
        if self.transport.http.hold_ms > defaults::MAX_HOLD_MS {
            return Err(ConfigError::invalid(
                "transport.http.hold_ms",
                format!("must be at most {}", defaults::MAX_HOLD_MS),
            ));
        }
        if self.transport.service_name.trim().is_empty() {
            return Err(ConfigError::invalid("transport.service_name", "must not be empty"));
        }
        for (scope, window) in [
            ("rate_limit.global", &self.rate_limit.global),
            ("rate_limit.toggle", &self.rate_limit.toggle),
        ] {
            if window.max_requests == 0 || window.window_secs == 0 {
                return Err(ConfigError::invalid(
                    scope,
                    "max_requests and window_secs must be > 0",
                ));
            }
        }
        if self.targets.is_empty() {
            return Err(ConfigError::invalid("targets", "at least one target is required"));
        }
        for name in self.targets.keys() {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(ConfigError::invalid(
                    format!("targets.{}", name),
                    "names may only contain ASCII letters, digits, '-' and '_'",
                ));
            }
        }

        match self.transport.mode {
            TransportMode::Mqtt => self.validate_mqtt(),
            TransportMode::Http => self.validate_http(),
        }
    }

    fn validate_mqtt(&self) -> Result<(), ConfigError> {
        if self.transport.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Missing(env_vars::MQTT_HOST));
        }
        for (name, target) in &self.targets {
            match target.topic.as_deref() {
                Some(topic) if !topic.trim().is_empty() => {
                    if topic.contains(['+', '#']) {
                        return Err(ConfigError::invalid(
                            format!("targets.{}.topic", name),
                            "wildcards are not allowed in publish topics",
                        ));
                    }
                }
                _ => {
                    return Err(ConfigError::invalid(
                        format!("targets.{}.topic", name),
                        "required in mqtt mode",
                    ))
                }
            }
        }
        Ok(())
    }

    fn validate_http(&self) -> Result<(), ConfigError> {
        for (name, target) in &self.targets {
            let key = format!("targets.{}.url", name);
            let raw = target
                .url
                .as_deref()
                .ok_or_else(|| ConfigError::invalid(key.clone(), "required in http mode"))?;
            let parsed = url::Url::parse(raw)
                .map_err(|e| ConfigError::invalid(key.clone(), e.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(key, "scheme must be http or https"));
            }
        }
        Ok(())
    }

    /// `host:port` the HTTP server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}
