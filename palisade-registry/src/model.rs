//! Registered tool data model
//!
//! One [`RegisteredTool`] exists per `(run, node)`; re-registration
//! overwrites in place. The wire names of [`ToolSourceKind`] match the
//! values tool-mode nodes send when they register (`component`,
//! `remote-mcp`, `mcp-server`, `local-mcp`).

use chrono::{DateTime, Utc};
use palisade_common::{NodeId, RunId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of source backing a registered tool.
///
/// A closed set, dispatched by exhaustive matching, so adding a source kind
/// is a compile-time-checked change across the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolSourceKind {
    /// In-process component executed by the workflow engine
    #[serde(rename = "component")]
    Component,
    /// Pre-registered external MCP server reachable over HTTP
    #[serde(rename = "remote-mcp")]
    RemoteMcp,
    /// Stdio-transport MCP server that required sandbox spawning
    #[serde(rename = "mcp-server")]
    McpServer,
    /// Locally-configured stdio-transport MCP server, also sandbox-backed
    #[serde(rename = "local-mcp")]
    LocalMcp,
}

impl ToolSourceKind {
    /// True for the stdio-transport kinds that live behind a sandbox.
    pub fn is_stdio(self) -> bool {
        matches!(self, ToolSourceKind::McpServer | ToolSourceKind::LocalMcp)
    }

    /// True for every kind that is proxied rather than bridged in-process.
    pub fn is_external(self) -> bool {
        !matches!(self, ToolSourceKind::Component)
    }
}

/// Lifecycle status of a registered tool source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Registered but not yet confirmed usable (e.g. sandbox still starting)
    Pending,
    /// Usable
    Ready,
    /// Registration or startup failed
    Failed,
}

/// One callable tool definition as discovered from a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name at the source
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Cached tool list for one `(run, node)`, stored separately from the
/// registered tool with its own expiry. Represents discovery that happened
/// once and should not be repeated for the life of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredToolSet {
    /// The discovered tools
    pub tools: Vec<ToolDefinition>,
    /// When discovery happened
    pub discovered_at: DateTime<Utc>,
}

/// Opaque encrypted credential payload: ciphertext plus cipher metadata,
/// both base64-encoded for JSON transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Base64-encoded ciphertext
    pub ciphertext: String,
    /// Base64-encoded cipher nonce/metadata
    pub nonce: String,
}

/// One registered tool source, keyed by `(run_id, node_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredTool {
    /// Run this registration belongs to
    pub run_id: RunId,
    /// Graph node that registered it; may be hierarchical (`group/child`)
    pub node_id: NodeId,
    /// Display/invocation name at the source level
    pub tool_name: String,
    /// Source kind
    pub kind: ToolSourceKind,
    /// Lifecycle status
    pub status: ToolStatus,
    /// Component identifier (component sources only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments (component sources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Encrypted credentials or auth headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_credentials: Option<EncryptedPayload>,
    /// Endpoint URL (HTTP-reachable sources, including a sandbox's local port)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Sandbox container reference (stdio sources only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// False marks provider-only nodes that resolve as dependencies but are
    /// never surfaced as agent-callable tools
    pub exposed_to_agent: bool,
    /// Static invocation overrides merged into component calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    /// When the registration was (last) written
    pub registered_at: DateTime<Utc>,
}

/// Input for registering a component tool.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterComponentTool {
    /// Run scope
    pub run_id: RunId,
    /// Registering node
    pub node_id: NodeId,
    /// Agent-visible tool name
    pub tool_name: String,
    /// Component to execute
    pub component_id: String,
    /// Description surfaced to the agent
    #[serde(default)]
    pub description: Option<String>,
    /// Argument schema surfaced to the agent
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// Plaintext credentials; encrypted before storage
    #[serde(default)]
    pub credentials: Option<Value>,
    /// Whether the agent may call this tool directly
    #[serde(default = "default_exposed")]
    pub exposed_to_agent: bool,
    /// Static invocation overrides
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Input for registering an MCP server source.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMcpServer {
    /// Run scope
    pub run_id: RunId,
    /// Registering node
    pub node_id: NodeId,
    /// Source-level server name; proxied tool names are prefixed with it
    pub tool_name: String,
    /// `remote-mcp`, `mcp-server`, or `local-mcp`
    pub kind: ToolSourceKind,
    /// Server endpoint; for sandbox-backed kinds, the sandbox's local port
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Plaintext auth headers; encrypted before storage
    #[serde(default)]
    pub headers: Option<Value>,
    /// Sandbox container id, recorded for later teardown
    #[serde(default)]
    pub container_id: Option<String>,
    /// Pre-discovered tool list; when present, later session builds skip
    /// live discovery entirely
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Initial status (defaults to ready)
    #[serde(default = "default_status")]
    pub status: ToolStatus,
}

fn default_exposed() -> bool {
    true
}

fn default_status() -> ToolStatus {
    ToolStatus::Ready
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ToolSourceKind::RemoteMcp).unwrap(),
            "\"remote-mcp\""
        );
        assert_eq!(
            serde_json::from_str::<ToolSourceKind>("\"mcp-server\"").unwrap(),
            ToolSourceKind::McpServer
        );
    }

    #[test]
    fn stdio_kinds() {
        assert!(ToolSourceKind::McpServer.is_stdio());
        assert!(ToolSourceKind::LocalMcp.is_stdio());
        assert!(!ToolSourceKind::RemoteMcp.is_stdio());
        assert!(!ToolSourceKind::Component.is_stdio());
    }

    #[test]
    fn register_component_defaults_to_exposed() {
        let input: RegisterComponentTool = serde_json::from_value(serde_json::json!({
            "run_id": "r1",
            "node_id": "scanner",
            "tool_name": "port_scan",
            "component_id": "core.port_scan",
        }))
        .unwrap();
        assert!(input.exposed_to_agent);
    }
}
