//! Per-run MCP server
//!
//! One [`GatewayServer`] exists per session-cache entry. Its tool table is
//! populated dynamically by the registration pass and can grow while the
//! server is live (`refresh_servers_for_run` re-runs registration against
//! the same instance). `call_tool` dispatches to the handler wired at
//! registration time; handler failures become error-flagged tool results,
//! not protocol faults, so one bad tool call never drops the agent's
//! session.

use async_trait::async_trait;
use dashmap::DashMap;
use palisade_common::{GatewayError, RunId};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use std::sync::Arc;

/// Executes one registered tool when the agent calls it.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the agent-supplied arguments.
    async fn call(
        &self,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> palisade_common::Result<CallToolResult>;
}

struct ToolEntry {
    tool: Tool,
    handler: Arc<dyn ToolHandler>,
}

/// The MCP server backing one gateway session.
#[derive(Clone)]
pub struct GatewayServer {
    run_id: RunId,
    tools: Arc<DashMap<String, ToolEntry>>,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("run_id", &self.run_id)
            .field("tools", &self.registered_names())
            .finish()
    }
}

impl GatewayServer {
    /// Create an empty server for a run.
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            tools: Arc::new(DashMap::new()),
        }
    }

    /// The run this server belongs to.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Register a callable tool.
    ///
    /// Returns `false` without touching the table when the name is already
    /// registered, which is what makes repeated registration passes safe.
    pub fn register_tool(
        &self,
        name: &str,
        description: Option<&str>,
        input_schema: Option<&Value>,
        handler: Arc<dyn ToolHandler>,
    ) -> bool {
        if self.tools.contains_key(name) {
            return false;
        }
        let schema_map = match input_schema {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        let tool = Tool::new_with_raw(
            name.to_string(),
            description.map(|d| d.to_string().into()),
            Arc::new(schema_map),
        );
        self.tools
            .insert(name.to_string(), ToolEntry { tool, handler });
        true
    }

    /// Whether a tool name is already wired.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Currently registered tool names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Build a success tool result carrying a text payload.
    pub fn success_result(text: impl Into<String>) -> CallToolResult {
        CallToolResult::success(vec![Content::text(text)])
    }

    /// Build an error-flagged tool result carrying a failure description.
    pub fn error_result(text: impl Into<String>) -> CallToolResult {
        CallToolResult::error(vec![Content::text(text)])
    }
}

fn server_implementation() -> Implementation {
    Implementation::new("palisade-gateway", env!("CARGO_PKG_VERSION"))
        .with_title("Palisade Tool Gateway")
}

fn server_capabilities() -> ServerCapabilities {
    let mut capabilities = ServerCapabilities::default();
    capabilities.tools = Some(ToolsCapability {
        list_changed: Some(true),
    });
    capabilities
}

impl ServerHandler for GatewayServer {
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|e| e.value().tool.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let handler = match self.tools.get(request.name.as_ref()) {
            Some(entry) => entry.value().handler.clone(),
            None => {
                tracing::warn!(
                    run_id = %self.run_id,
                    tool = %request.name,
                    "unknown tool requested"
                );
                return Err(McpError::invalid_request(
                    format!("Unknown tool: {}", request.name),
                    None,
                ));
            }
        };

        match handler.call(request.arguments).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_tool_recoverable() => {
                tracing::warn!(
                    run_id = %self.run_id,
                    tool = %request.name,
                    error = %e,
                    "tool call failed"
                );
                Ok(Self::error_result(e.to_string()))
            }
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.protocol_version = ProtocolVersion::default();
        info.capabilities = server_capabilities();
        info.server_info = server_implementation();
        info.instructions = Some(
            "Tools registered for this workflow run. Call them by name; \
             proxied tools are named '<server>__<tool>'."
                .into(),
        );
        info
    }
}
