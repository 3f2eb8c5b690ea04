//! # Palisade Discovery
//!
//! The Discovery Engine: given a tool source description, produce the list
//! of callable tool definitions behind it.
//!
//! HTTP-reachable MCP servers are asked directly: open a client session,
//! list tools, close. Stdio-transport servers first need an ephemeral
//! sandbox: a short-lived process that wraps the stdio server and exposes
//! it on a freshly allocated local port. The sandbox passes through
//! `spawning → waiting-for-health → ready` (or `failed`) and is torn down
//! unconditionally once discovery finishes, on every exit path. Sandboxes
//! are never part of steady-state serving.
//!
//! Seams: [`McpConnector`] abstracts the MCP client transport,
//! [`SandboxRunner`] the sandbox process lifecycle, and [`HealthProbe`] the
//! health endpoint poll. Production implementations live here; tests inject
//! scripted fakes.

/// MCP client session seam and the streamable-HTTP implementation
pub mod connector;

/// The discovery engine
pub mod engine;

/// Discovery error types
pub mod error;

/// Sandbox lifecycle: spawn, health polling, teardown
pub mod sandbox;

pub use connector::{McpConnector, McpSession, StreamableHttpConnector};
pub use engine::{DiscoveryConfig, DiscoveryEngine, GroupDiscoveryReport, GroupSource};
pub use error::{DiscoveryError, Result};
pub use sandbox::{
    HealthProbe, HealthReport, HttpHealthProbe, ProcessSandboxRunner, SandboxInstance,
    SandboxRunner, SandboxSpec, SandboxState, ServerHealth,
};
