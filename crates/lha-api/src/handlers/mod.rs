//! HTTP handlers.

pub mod basic;
pub mod toggle;

pub use crate::server::ServerState;
