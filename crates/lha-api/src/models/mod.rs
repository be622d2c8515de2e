//! API data types.

pub mod error;

pub use error::{ApiError, ApiResult};
