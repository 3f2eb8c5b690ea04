//! The Tool Registry service
//!
//! Reads and writes the registry store, which is the source of truth for
//! which tools exist for which run. Everything here is an independent,
//! last-write-wins key; no multi-key transactions. Registration into the
//! store happens-before any later `get_tools_for_run` can observe it,
//! because both sides go through the same store.

use crate::cipher::CredentialCipher;
use crate::error::{RegistryError, Result};
use crate::model::{
    DiscoveredToolSet, RegisterComponentTool, RegisterMcpServer, RegisteredTool, ToolDefinition,
    ToolSourceKind, ToolStatus,
};
use chrono::Utc;
use palisade_common::{NodeId, RunId};
use palisade_store::RegistryStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Store key prefix for registered tools
const TOOL_KEY_PREFIX: &str = "palisade:tools";

/// Store key prefix for cached discovered tool sets
const SERVER_TOOLS_KEY_PREFIX: &str = "palisade:server-tools";

/// Default expiry for registry entries; abandoned runs age out of the store.
const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Tool Registry configuration.
#[derive(Debug, Clone)]
pub struct ToolRegistryConfig {
    /// Per-entry expiry; `None` keeps entries until run cleanup
    pub entry_ttl: Option<Duration>,
}

impl Default for ToolRegistryConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Some(DEFAULT_ENTRY_TTL),
        }
    }
}

/// The session-scoped tool registry.
pub struct ToolRegistry {
    store: Arc<dyn RegistryStore>,
    cipher: Arc<dyn CredentialCipher>,
    config: ToolRegistryConfig,
}

fn tool_key(run_id: &RunId, node_id: &NodeId) -> String {
    format!("{TOOL_KEY_PREFIX}:{run_id}:{node_id}")
}

fn server_tools_key(run_id: &RunId, node_id: &NodeId) -> String {
    format!("{SERVER_TOOLS_KEY_PREFIX}:{run_id}:{node_id}")
}

fn run_prefix(prefix: &str, run_id: &RunId) -> String {
    format!("{prefix}:{run_id}:")
}

impl ToolRegistry {
    /// Create a registry over a store and credential cipher.
    pub fn new(store: Arc<dyn RegistryStore>, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self::with_config(store, cipher, ToolRegistryConfig::default())
    }

    /// Create a registry with explicit configuration.
    pub fn with_config(
        store: Arc<dyn RegistryStore>,
        cipher: Arc<dyn CredentialCipher>,
        config: ToolRegistryConfig,
    ) -> Self {
        Self {
            store,
            cipher,
            config,
        }
    }

    /// Register (or re-register) a component tool.
    ///
    /// Upserts in place: registering the same `(run, node)` twice leaves
    /// exactly one entry carrying the latest fields. Supplied credentials
    /// are encrypted before they touch the store.
    pub async fn register_component_tool(
        &self,
        input: RegisterComponentTool,
    ) -> Result<RegisteredTool> {
        let encrypted_credentials = self.encrypt_value(input.credentials.as_ref())?;
        let tool = RegisteredTool {
            run_id: input.run_id,
            node_id: input.node_id,
            tool_name: input.tool_name,
            kind: ToolSourceKind::Component,
            status: ToolStatus::Ready,
            component_id: Some(input.component_id),
            description: input.description,
            input_schema: input.input_schema,
            encrypted_credentials,
            endpoint: None,
            container_id: None,
            exposed_to_agent: input.exposed_to_agent,
            parameters: input.parameters,
            registered_at: Utc::now(),
        };
        self.put_tool(&tool).await?;
        tracing::info!(
            run_id = %tool.run_id,
            node_id = %tool.node_id,
            tool_name = %tool.tool_name,
            "registered component tool"
        );
        Ok(tool)
    }

    /// Register (or re-register) an MCP server source.
    ///
    /// When the caller supplies a pre-discovered tool list it is persisted
    /// as the run's [`DiscoveredToolSet`], so later session builds skip
    /// live discovery for this source entirely.
    pub async fn register_mcp_server(&self, input: RegisterMcpServer) -> Result<RegisteredTool> {
        let encrypted_credentials = self.encrypt_value(input.headers.as_ref())?;
        let tool = RegisteredTool {
            run_id: input.run_id.clone(),
            node_id: input.node_id.clone(),
            tool_name: input.tool_name,
            kind: input.kind,
            status: input.status,
            component_id: None,
            description: None,
            input_schema: None,
            encrypted_credentials,
            endpoint: input.endpoint,
            container_id: input.container_id,
            exposed_to_agent: true,
            parameters: None,
            registered_at: Utc::now(),
        };
        self.put_tool(&tool).await?;

        if let Some(tools) = input.tools {
            self.cache_server_tools(&input.run_id, &input.node_id, tools)
                .await?;
        }
        tracing::info!(
            run_id = %tool.run_id,
            node_id = %tool.node_id,
            kind = ?tool.kind,
            "registered MCP server source"
        );
        Ok(tool)
    }

    /// Point lookup by `(run, node)`. Absent keys are `Ok(None)`.
    pub async fn get_tool(&self, run_id: &RunId, node_id: &NodeId) -> Result<Option<RegisteredTool>> {
        let key = tool_key(run_id, node_id);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(decode_tool(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Point lookup by source-level tool name within a run.
    pub async fn get_tool_by_name(
        &self,
        run_id: &RunId,
        tool_name: &str,
    ) -> Result<Option<RegisteredTool>> {
        let tools = self.get_tools_for_run(run_id, None).await?;
        Ok(tools.into_iter().find(|tool| tool.tool_name == tool_name))
    }

    /// All registered tools for a run, optionally scoped to a subtree set.
    ///
    /// With `allowed_node_ids`, a node is included when it exactly matches
    /// an allowed id or extends it past a `/` boundary. A bare string prefix
    /// (`parent-extra` under allowed `parent`) does not match.
    pub async fn get_tools_for_run(
        &self,
        run_id: &RunId,
        allowed_node_ids: Option<&[String]>,
    ) -> Result<Vec<RegisteredTool>> {
        let prefix = run_prefix(TOOL_KEY_PREFIX, run_id);
        let mut tools = Vec::new();
        for (key, raw) in self.store.scan(&prefix).await? {
            let tool = decode_tool(&key, &raw)?;
            let visible = match allowed_node_ids {
                None => true,
                Some(allowed) => allowed.iter().any(|root| tool.node_id.is_within(root)),
            };
            if visible {
                tools.push(tool);
            }
        }
        tools.sort_by(|a, b| a.node_id.as_str().cmp(b.node_id.as_str()));
        Ok(tools)
    }

    /// The cached discovered tool set for a source, if any.
    pub async fn get_server_tools(
        &self,
        run_id: &RunId,
        node_id: &NodeId,
    ) -> Result<Option<DiscoveredToolSet>> {
        let key = server_tools_key(run_id, node_id);
        match self.store.get(&key).await? {
            Some(raw) => {
                let set = serde_json::from_str(&raw)
                    .map_err(|source| RegistryError::MalformedPayload { key, source })?;
                Ok(Some(set))
            }
            None => Ok(None),
        }
    }

    /// Persist a discovered tool list so it is not re-discovered this run.
    pub async fn cache_server_tools(
        &self,
        run_id: &RunId,
        node_id: &NodeId,
        tools: Vec<ToolDefinition>,
    ) -> Result<()> {
        let set = DiscoveredToolSet {
            tools,
            discovered_at: Utc::now(),
        };
        let key = server_tools_key(run_id, node_id);
        let raw = serde_json::to_string(&set)?;
        self.store.set(&key, raw, self.config.entry_ttl).await?;
        Ok(())
    }

    /// Decrypt and return the stored credential/header payload for a node.
    pub async fn get_tool_credentials(
        &self,
        run_id: &RunId,
        node_id: &NodeId,
    ) -> Result<Option<Value>> {
        let Some(tool) = self.get_tool(run_id, node_id).await? else {
            return Ok(None);
        };
        let Some(payload) = tool.encrypted_credentials else {
            return Ok(None);
        };
        let plaintext = self
            .cipher
            .decrypt(&payload)
            .map_err(|e| RegistryError::CredentialDecryption(e.to_string()))?;
        let value = serde_json::from_slice(&plaintext)
            .map_err(|e| RegistryError::CredentialDecryption(format!("bad plaintext: {e}")))?;
        Ok(Some(value))
    }

    /// Flip a registration's lifecycle status in place.
    pub async fn set_tool_status(
        &self,
        run_id: &RunId,
        node_id: &NodeId,
        status: ToolStatus,
    ) -> Result<()> {
        if let Some(mut tool) = self.get_tool(run_id, node_id).await? {
            tool.status = status;
            self.put_tool(&tool).await?;
        }
        Ok(())
    }

    /// True only when every required node has a registration in this run.
    pub async fn are_all_tools_ready(
        &self,
        run_id: &RunId,
        required_node_ids: &[String],
    ) -> Result<bool> {
        for node_id in required_node_ids {
            let node = NodeId::new(node_id.clone());
            if self.get_tool(run_id, &node).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete every registration and cached tool set for a run.
    ///
    /// Returns the sandbox container ids that were recorded so the caller
    /// can tear down any still-running sandboxes.
    pub async fn cleanup_run(&self, run_id: &RunId) -> Result<Vec<String>> {
        let tool_prefix = run_prefix(TOOL_KEY_PREFIX, run_id);
        let server_prefix = run_prefix(SERVER_TOOLS_KEY_PREFIX, run_id);

        let mut keys = Vec::new();
        let mut container_ids = Vec::new();
        for (key, raw) in self.store.scan(&tool_prefix).await? {
            let tool = decode_tool(&key, &raw)?;
            if let Some(container_id) = tool.container_id {
                if !container_ids.contains(&container_id) {
                    container_ids.push(container_id);
                }
            }
            keys.push(key);
        }
        for (key, _) in self.store.scan(&server_prefix).await? {
            keys.push(key);
        }

        self.store.delete(&keys).await?;
        tracing::info!(
            run_id = %run_id,
            deleted = keys.len(),
            containers = container_ids.len(),
            "cleaned up run registrations"
        );
        Ok(container_ids)
    }

    async fn put_tool(&self, tool: &RegisteredTool) -> Result<()> {
        let key = tool_key(&tool.run_id, &tool.node_id);
        let raw = serde_json::to_string(tool)?;
        self.store.set(&key, raw, self.config.entry_ttl).await?;
        Ok(())
    }

    fn encrypt_value(&self, value: Option<&Value>) -> Result<Option<crate::model::EncryptedPayload>> {
        match value {
            None => Ok(None),
            Some(value) => {
                let plaintext = serde_json::to_vec(value)?;
                let payload = self
                    .cipher
                    .encrypt(&plaintext)
                    .map_err(|e| RegistryError::CredentialDecryption(e.to_string()))?;
                Ok(Some(payload))
            }
        }
    }
}

fn decode_tool(key: &str, raw: &str) -> Result<RegisteredTool> {
    serde_json::from_str(raw).map_err(|source| RegistryError::MalformedPayload {
        key: key.to_string(),
        source,
    })
}
