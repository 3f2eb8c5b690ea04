//! Tool registration pass
//!
//! Turns the registry's view of a run into callable tools on one
//! [`GatewayServer`]. The pass is idempotent by construction: it skips any
//! name the server already carries, so re-running it (session refresh)
//! only adds tools that registered since the session was built.
//!
//! One failing source never aborts the pass. Discovery or catalog failures
//! are logged against the source and the remaining sources still register.

use crate::bridge::{ComponentBridge, ComponentToolHandler};
use crate::catalog::ToolCatalog;
use crate::proxy::{CallProxy, ProxiedToolHandler};
use crate::server::GatewayServer;
use palisade_common::{GatewayError, Result};
use palisade_discovery::DiscoveryEngine;
use palisade_registry::{RegisteredTool, ToolDefinition, ToolRegistry, ToolSourceKind};
use std::sync::Arc;

/// Separator between a source's server name and its tool names.
const PROXIED_NAME_SEPARATOR: &str = "__";

/// What a registration pass did.
#[derive(Debug, Default)]
pub struct RegistrationOutcome {
    /// Names newly wired by this pass
    pub registered: Vec<String>,
    /// Sources whose tool lists could not be resolved
    pub failed_sources: Vec<String>,
}

/// Runs the registration algorithm against gateway servers.
pub struct ToolRegistrar {
    registry: Arc<ToolRegistry>,
    discovery: Arc<DiscoveryEngine>,
    catalog: Arc<dyn ToolCatalog>,
    bridge: Arc<ComponentBridge>,
    proxy: Arc<CallProxy>,
}

impl ToolRegistrar {
    /// Create a registrar over the gateway's collaborators.
    pub fn new(
        registry: Arc<ToolRegistry>,
        discovery: Arc<DiscoveryEngine>,
        catalog: Arc<dyn ToolCatalog>,
        bridge: Arc<ComponentBridge>,
        proxy: Arc<CallProxy>,
    ) -> Self {
        Self {
            registry,
            discovery,
            catalog,
            bridge,
            proxy,
        }
    }

    /// Register every visible tool for the server's run.
    ///
    /// `allowed_tools` filters by agent-visible name (the proxied name for
    /// external sources); `allowed_node_ids` scopes external sources to
    /// subtrees with the registry's hierarchical semantics.
    pub async fn register_run_tools(
        &self,
        server: &GatewayServer,
        allowed_tools: Option<&[String]>,
        allowed_node_ids: Option<&[String]>,
    ) -> Result<RegistrationOutcome> {
        let run_id = server.run_id().clone();
        let tools = self
            .registry
            .get_tools_for_run(&run_id, None)
            .await
            .map_err(GatewayError::from)?;

        let mut outcome = RegistrationOutcome::default();
        let (components, externals): (Vec<_>, Vec<_>) = tools
            .into_iter()
            .partition(|tool| tool.kind == ToolSourceKind::Component);

        for tool in components {
            if !tool.exposed_to_agent {
                tracing::debug!(
                    run_id = %run_id,
                    node_id = %tool.node_id,
                    "skipping provider-only component"
                );
                continue;
            }
            if !name_allowed(allowed_tools, &tool.tool_name) {
                continue;
            }
            let handler = Arc::new(ComponentToolHandler::new(
                self.bridge.clone(),
                run_id.clone(),
                tool.node_id.clone(),
            ));
            if server.register_tool(
                &tool.tool_name,
                tool.description.as_deref(),
                tool.input_schema.as_ref(),
                handler,
            ) {
                outcome.registered.push(tool.tool_name.clone());
            }
        }

        for source in externals {
            let in_scope = match allowed_node_ids {
                None => true,
                Some(allowed) => allowed.iter().any(|root| source.node_id.is_within(root)),
            };
            if !in_scope {
                continue;
            }
            let definitions = match self.resolve_source_tools(&source).await {
                Ok(definitions) => definitions,
                Err(e) => {
                    tracing::warn!(
                        run_id = %run_id,
                        node_id = %source.node_id,
                        error = %e,
                        "failed to resolve tools for external source"
                    );
                    outcome.failed_sources.push(source.node_id.to_string());
                    continue;
                }
            };

            for definition in definitions {
                let proxied_name = format!(
                    "{}{}{}",
                    source.tool_name, PROXIED_NAME_SEPARATOR, definition.name
                );
                if !name_allowed(allowed_tools, &proxied_name) {
                    continue;
                }
                let handler = Arc::new(ProxiedToolHandler::new(
                    self.proxy.clone(),
                    self.registry.clone(),
                    run_id.clone(),
                    source.node_id.clone(),
                    definition.name.clone(),
                    proxied_name.clone(),
                ));
                if server.register_tool(
                    &proxied_name,
                    definition.description.as_deref(),
                    definition.input_schema.as_ref(),
                    handler,
                ) {
                    outcome.registered.push(proxied_name);
                }
            }
        }

        tracing::info!(
            run_id = %run_id,
            registered = outcome.registered.len(),
            failed_sources = outcome.failed_sources.len(),
            "tool registration pass finished"
        );
        Ok(outcome)
    }

    /// Resolve a source's tool list: cached set, then live discovery for
    /// sandbox-backed kinds, then the durable catalog for remote servers.
    async fn resolve_source_tools(&self, source: &RegisteredTool) -> Result<Vec<ToolDefinition>> {
        if let Some(cached) = self
            .registry
            .get_server_tools(&source.run_id, &source.node_id)
            .await
            .map_err(GatewayError::from)?
        {
            return Ok(cached.tools);
        }

        match source.kind {
            ToolSourceKind::McpServer | ToolSourceKind::LocalMcp => {
                let Some(endpoint) = source.endpoint.as_deref() else {
                    return Err(GatewayError::SourceUnavailable(format!(
                        "source '{}' has no recorded endpoint",
                        source.node_id
                    )));
                };
                let headers = self
                    .registry
                    .get_tool_credentials(&source.run_id, &source.node_id)
                    .await
                    .map_err(GatewayError::from)?;
                let tools = self
                    .discovery
                    .discover(endpoint, headers.as_ref())
                    .await
                    .map_err(GatewayError::from)?;
                self.registry
                    .cache_server_tools(&source.run_id, &source.node_id, tools.clone())
                    .await
                    .map_err(GatewayError::from)?;
                Ok(tools)
            }
            ToolSourceKind::RemoteMcp => {
                let catalog_tools = self.catalog.list_tools(&source.tool_name).await?;
                Ok(catalog_tools
                    .into_iter()
                    .filter(|tool| tool.enabled)
                    .map(|tool| ToolDefinition {
                        name: tool.name,
                        description: tool.description,
                        input_schema: tool.input_schema,
                    })
                    .collect())
            }
            ToolSourceKind::Component => Ok(Vec::new()),
        }
    }
}

fn name_allowed(allow_list: Option<&[String]>, name: &str) -> bool {
    match allow_list {
        None => true,
        Some(list) => list.iter().any(|allowed| allowed == name),
    }
}
