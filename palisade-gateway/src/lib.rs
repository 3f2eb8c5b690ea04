//! # Palisade Gateway
//!
//! The per-run MCP surface of the Palisade tool gateway. A workflow run's
//! agent connects to one gateway session; the session's tool table is built
//! from the run's registrations in the Tool Registry and dispatches calls
//! to one of two backends:
//!
//! - **Component tools** execute inside the workflow engine; the
//!   [`bridge::ComponentBridge`] signals the engine and polls for the
//!   call's result.
//! - **External tools** live on MCP servers; the [`proxy::CallProxy`] opens
//!   a fresh session per call with bounded, linearly backed-off retries.
//!
//! Sessions are cached per `(run, scope)` in the
//! [`session::GatewaySessionCache`] and can be refreshed in place as late
//! tool sources register. [`http::serve_gateway`] exposes the whole thing
//! over streamable HTTP.

/// Component bridge: execute component tools through the workflow engine
pub mod bridge;

/// Durable tool catalog seam
pub mod catalog;

/// Gateway configuration (figment-layered)
pub mod config;

/// Axum HTTP front serving the MCP endpoint
pub mod http;

/// External call proxy with retry policy
pub mod proxy;

/// The tool registration pass
pub mod registration;

/// Per-run MCP server
pub mod server;

/// Gateway session cache
pub mod session;

/// Workflow engine seam
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{ComponentBridge, ComponentToolHandler};
pub use catalog::{CatalogTool, ToolCatalog};
pub use config::GatewayConfig;
pub use http::serve_gateway;
pub use proxy::{CallProxy, ProxiedToolHandler};
pub use registration::{RegistrationOutcome, ToolRegistrar};
pub use server::{GatewayServer, ToolHandler};
pub use session::GatewaySessionCache;
pub use workflow::{RunInfo, WorkflowEngine};
