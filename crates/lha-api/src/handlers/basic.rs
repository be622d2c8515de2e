//! Public greeting.

/// Greeting served at `/` (no credential required).
pub const GREETING: &str = "Hello from LHA relay";

pub async fn root_handler() -> &'static str {
    GREETING
}
