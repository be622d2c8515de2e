//! Core types for the LHA relay.
//!
//! Configuration, the target registry and the command encoder live here.
//! Nothing in this crate performs network I/O.

pub mod command;
pub mod config;
pub mod error;
pub mod registry;

pub use command::{CommandEncoder, EncodedCommand, HttpCall, PulseCommand, RpcCommand, RpcParams};
pub use config::{RelayConfig, TransportMode};
pub use error::{ConfigError, RegistryError};
pub use registry::{PhysicalAddress, TargetRegistry};
