//! # Palisade Common
//!
//! Shared foundations for the Palisade tool gateway crates:
//!
//! - **Error taxonomy**: the [`GatewayError`] enum every gateway-facing
//!   failure converges to before it crosses a subsystem boundary
//! - **Identifiers**: newtype wrappers that keep run, node, and call ids
//!   from being mixed up at compile time
//!
//! Domain crates define their own error enums and convert into
//! [`GatewayError`] at the gateway boundary; see the `error` module docs
//! for the propagation policy.

/// Gateway-wide error taxonomy and result alias
pub mod error;

/// Strongly-typed identifier newtypes
pub mod types;

pub use error::{GatewayError, Result};
pub use types::{CallId, NodeId, RunId};
