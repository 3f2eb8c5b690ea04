//! External call proxy
//!
//! One agent-visible call to a proxied tool becomes a fresh MCP session
//! against the source server: connect, call, close. Sessions are never
//! reused across calls, so a wedged remote stream can only ever cost one
//! invocation. Attempts are bounded and linearly backed off; the final
//! attempt's error is what the agent sees.

use crate::config::GatewayConfig;
use crate::server::ToolHandler;
use async_trait::async_trait;
use palisade_common::{GatewayError, NodeId, Result, RunId};
use palisade_discovery::McpConnector;
use palisade_registry::ToolRegistry;
use rmcp::model::CallToolResult;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Retries proxied tool calls against external MCP servers.
pub struct CallProxy {
    connector: Arc<dyn McpConnector>,
    max_attempts: u32,
    base_delay: Duration,
    attempt_timeout: Duration,
}

impl CallProxy {
    /// Create a proxy with the configured retry policy.
    pub fn new(connector: Arc<dyn McpConnector>, config: &GatewayConfig) -> Self {
        Self {
            connector,
            max_attempts: config.proxy_max_attempts.max(1),
            base_delay: config.proxy_base_delay(),
            attempt_timeout: config.proxy_attempt_timeout(),
        }
    }

    /// Call `tool_name` on the server at `endpoint`.
    ///
    /// Each attempt runs on its own session with its own hard timeout; the
    /// delay before retry `n + 1` is `n * base_delay`.
    pub async fn call(
        &self,
        endpoint: &str,
        headers: Option<&Value>,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let session_id = ulid::Ulid::new();
            tracing::debug!(
                tool = tool_name,
                endpoint,
                attempt,
                session_id = %session_id,
                "proxying tool call"
            );
            match self
                .attempt(endpoint, headers, tool_name, arguments.clone())
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(
                        tool = tool_name,
                        endpoint,
                        attempt,
                        session_id = %session_id,
                        error = %e,
                        "proxied call attempt failed"
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.base_delay * attempt).await;
            }
        }
        Err(GatewayError::ProxyCallExhausted {
            tool_name: tool_name.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }

    async fn attempt(
        &self,
        endpoint: &str,
        headers: Option<&Value>,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult> {
        let timeout_secs = self.attempt_timeout.as_secs();
        let session = timeout(self.attempt_timeout, self.connector.connect(endpoint, headers))
            .await
            .map_err(|_| GatewayError::ProxyCallTimeout {
                tool_name: tool_name.to_string(),
                timeout_secs,
            })?
            .map_err(GatewayError::from)?;

        let outcome = timeout(self.attempt_timeout, session.call_tool(tool_name, arguments)).await;
        session.close().await;

        match outcome {
            Err(_) => Err(GatewayError::ProxyCallTimeout {
                tool_name: tool_name.to_string(),
                timeout_secs,
            }),
            Ok(result) => result.map_err(GatewayError::from),
        }
    }
}

/// Handler wired for every proxied tool: resolves the source registration
/// and its decrypted headers at call time, then delegates to [`CallProxy`].
pub struct ProxiedToolHandler {
    proxy: Arc<CallProxy>,
    registry: Arc<ToolRegistry>,
    run_id: RunId,
    node_id: NodeId,
    remote_tool: String,
    proxied_name: String,
}

impl ProxiedToolHandler {
    /// Wire a proxied tool to its source registration.
    pub fn new(
        proxy: Arc<CallProxy>,
        registry: Arc<ToolRegistry>,
        run_id: RunId,
        node_id: NodeId,
        remote_tool: String,
        proxied_name: String,
    ) -> Self {
        Self {
            proxy,
            registry,
            run_id,
            node_id,
            remote_tool,
            proxied_name,
        }
    }
}

#[async_trait]
impl ToolHandler for ProxiedToolHandler {
    async fn call(
        &self,
        arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult> {
        tracing::info!(
            run_id = %self.run_id,
            node_id = %self.node_id,
            tool = %self.proxied_name,
            "external tool call started"
        );

        let tool = self
            .registry
            .get_tool(&self.run_id, &self.node_id)
            .await
            .map_err(GatewayError::from)?
            .ok_or_else(|| {
                GatewayError::SourceUnavailable(format!(
                    "source '{}' is no longer registered for run '{}'",
                    self.node_id, self.run_id
                ))
            })?;
        let Some(endpoint) = tool.endpoint else {
            return Err(GatewayError::SourceUnavailable(format!(
                "source '{}' has no recorded endpoint",
                self.node_id
            )));
        };
        let headers = self
            .registry
            .get_tool_credentials(&self.run_id, &self.node_id)
            .await
            .map_err(GatewayError::from)?;

        let result = self
            .proxy
            .call(&endpoint, headers.as_ref(), &self.remote_tool, arguments)
            .await;

        match &result {
            Ok(_) => tracing::info!(
                run_id = %self.run_id,
                tool = %self.proxied_name,
                "external tool call completed"
            ),
            Err(e) => tracing::warn!(
                run_id = %self.run_id,
                tool = %self.proxied_name,
                error = %e,
                "external tool call failed"
            ),
        }
        result
    }
}
