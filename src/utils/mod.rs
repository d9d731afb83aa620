//! Small cross-cutting utilities shared by every layer of the gateway.

pub mod error;

pub use error::{GatewayError, Result};
