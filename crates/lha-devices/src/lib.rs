//! Actuator transports for the LHA relay.
//!
//! A [`TransportPublisher`] delivers an [`lha_core::EncodedCommand`] and
//! reports an [`Ack`] or a [`TransportError`]. Two implementations exist:
//! MQTT (`Switch.Toggle` RPC acknowledged by the broker) and direct HTTP
//! (on, hold, off).

pub mod error;
pub mod publisher;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use error::{TransportError, TransportResult};
pub use publisher::{Ack, ConnectionStatus, TransportPublisher};

#[cfg(feature = "http")]
pub use http::HttpPublisher;
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttPublisher, PublisherOptions};
