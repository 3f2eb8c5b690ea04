//! MCP client session seam
//!
//! [`McpConnector`] opens one client-side MCP session against an endpoint;
//! [`McpSession`] is the narrow surface the engine and the call proxy use
//! (list tools, call one tool, close). The production implementation speaks
//! streamable HTTP via rmcp; tests inject scripted fakes through the same
//! traits.

use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use palisade_registry::ToolDefinition;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    ProtocolVersion,
};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, ServiceExt};
use serde_json::Value;

/// A live client-side MCP session.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Issue the protocol's tool-listing call.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Invoke one tool on the remote server.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult>;

    /// Close the session. Best-effort; errors are logged by implementations.
    async fn close(self: Box<Self>);
}

/// Opens MCP sessions for the discovery engine and the call proxy.
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Open a session against `endpoint`, sending `headers` (an object of
    /// string values) on every request when present.
    async fn connect(
        &self,
        endpoint: &str,
        headers: Option<&Value>,
    ) -> Result<Box<dyn McpSession>>;
}

/// Minimal client handler for gateway-side sessions.
#[derive(Clone, Debug)]
struct GatewayClientHandler;

impl ClientHandler for GatewayClientHandler {
    fn get_info(&self) -> ClientInfo {
        let mut info = ClientInfo::default();
        info.protocol_version = ProtocolVersion::default();
        info.capabilities = ClientCapabilities::default();
        info.client_info = Implementation::new("palisade-gateway", env!("CARGO_PKG_VERSION"))
            .with_title("Palisade Tool Gateway");
        info
    }
}

/// Production connector: streamable HTTP transport via rmcp.
#[derive(Debug, Default)]
pub struct StreamableHttpConnector;

impl StreamableHttpConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl McpConnector for StreamableHttpConnector {
    async fn connect(
        &self,
        endpoint: &str,
        headers: Option<&Value>,
    ) -> Result<Box<dyn McpSession>> {
        let service = match headers.and_then(Value::as_object) {
            Some(headers) if !headers.is_empty() => {
                let header_map = build_header_map(endpoint, headers)?;
                let client = reqwest::Client::builder()
                    .default_headers(header_map)
                    .build()
                    .map_err(|e| DiscoveryError::from_transport(endpoint, e))?;
                let transport = StreamableHttpClientTransport::with_client(
                    client,
                    StreamableHttpClientTransportConfig::with_uri(endpoint.to_string()),
                );
                GatewayClientHandler
                    .serve(transport)
                    .await
                    .map_err(|e| DiscoveryError::from_transport(endpoint, e))?
            }
            _ => {
                let transport = StreamableHttpClientTransport::from_uri(endpoint.to_string());
                GatewayClientHandler
                    .serve(transport)
                    .await
                    .map_err(|e| DiscoveryError::from_transport(endpoint, e))?
            }
        };

        Ok(Box::new(StreamableHttpSession {
            endpoint: endpoint.to_string(),
            service,
        }))
    }
}

fn build_header_map(
    endpoint: &str,
    headers: &serde_json::Map<String, Value>,
) -> Result<reqwest::header::HeaderMap> {
    let mut map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let Some(value) = value.as_str() else {
            continue;
        };
        let header_name: reqwest::header::HeaderName = name
            .parse()
            .map_err(|e| DiscoveryError::from_transport(endpoint, format!("bad header name: {e}")))?;
        let header_value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
            DiscoveryError::from_transport(endpoint, format!("bad header value: {e}"))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

struct StreamableHttpSession {
    endpoint: String,
    service: RunningService<RoleClient, GatewayClientHandler>,
}

#[async_trait]
impl McpSession for StreamableHttpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result = self
            .service
            .list_tools(None)
            .await
            .map_err(|e| DiscoveryError::from_transport(&self.endpoint, e))?;

        Ok(result
            .tools
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()),
                input_schema: Some(Value::Object((*tool.input_schema).clone())),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult> {
        let mut params = CallToolRequestParams::new(name.to_string());
        params.arguments = arguments;
        self.service
            .call_tool(params)
            .await
            .map_err(|e| DiscoveryError::from_transport(&self.endpoint, e))
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.service.cancel().await {
            tracing::debug!("MCP session close for '{}' failed: {e:?}", self.endpoint);
        }
    }
}
