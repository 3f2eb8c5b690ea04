//! Gateway session cache
//!
//! One live MCP server per `(run, scope)`; the cache is a process-local
//! projection of the registry and is never authoritative. Losing it only
//! costs a rebuild. Two callers racing on the same key may both run a
//! registration pass; the first insert wins and registration is idempotent,
//! so the losing build is discarded harmlessly.

use crate::registration::ToolRegistrar;
use crate::server::GatewayServer;
use crate::workflow::WorkflowEngine;
use dashmap::DashMap;
use palisade_common::{GatewayError, Result, RunId};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::StreamableHttpService;
use std::sync::Arc;

#[derive(Clone)]
struct CachedSession {
    run_id: RunId,
    allowed_tools: Option<Vec<String>>,
    allowed_node_ids: Option<Vec<String>>,
    server: GatewayServer,
    // Built together with `server` and evicted with it; the HTTP front must
    // never hold a service whose factory captured an evicted server.
    service: StreamableHttpService<GatewayServer, LocalSessionManager>,
}

fn mcp_service(server: &GatewayServer) -> StreamableHttpService<GatewayServer, LocalSessionManager> {
    let server = server.clone();
    StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        Default::default(),
    )
}

/// Cache of per-run gateway servers.
pub struct GatewaySessionCache {
    engine: Arc<dyn WorkflowEngine>,
    registrar: Arc<ToolRegistrar>,
    sessions: DashMap<String, CachedSession>,
}

/// Compose the cache key for a run and optional node scope.
///
/// Scoped keys join the sorted node ids with commas; a comma inside an id is
/// escaped so `["a,b"]` and `["a", "b"]` can never collide.
pub(crate) fn cache_key(run_id: &RunId, allowed_node_ids: Option<&[String]>) -> String {
    match allowed_node_ids {
        None => run_id.to_string(),
        Some(ids) => {
            let mut escaped: Vec<String> = ids.iter().map(|id| id.replace(',', "\\,")).collect();
            escaped.sort();
            format!("{run_id}:{}", escaped.join(","))
        }
    }
}

impl GatewaySessionCache {
    /// Create an empty cache.
    pub fn new(engine: Arc<dyn WorkflowEngine>, registrar: Arc<ToolRegistrar>) -> Self {
        Self {
            engine,
            registrar,
            sessions: DashMap::new(),
        }
    }

    /// Get or build the MCP server for a run and scope.
    ///
    /// Unknown runs are [`GatewayError::NotFound`]; a supplied organization
    /// that does not own the run is [`GatewayError::AccessDenied`]. Both are
    /// session-fatal and map to transport-level rejections.
    pub async fn server_for_run(
        &self,
        run_id: &RunId,
        organization_id: Option<&str>,
        allowed_tools: Option<&[String]>,
        allowed_node_ids: Option<&[String]>,
    ) -> Result<GatewayServer> {
        let session = self
            .session_for_run(run_id, organization_id, allowed_tools, allowed_node_ids)
            .await?;
        Ok(session.server)
    }

    /// Get or build the streamable-HTTP MCP service for a run and scope.
    ///
    /// The service always wraps the session's current server; evicting the
    /// session (`cleanup_run`) drops the service with it, so a rebuilt run
    /// is served by its rebuilt tool table.
    pub async fn service_for_run(
        &self,
        run_id: &RunId,
        organization_id: Option<&str>,
        allowed_tools: Option<&[String]>,
        allowed_node_ids: Option<&[String]>,
    ) -> Result<StreamableHttpService<GatewayServer, LocalSessionManager>> {
        let session = self
            .session_for_run(run_id, organization_id, allowed_tools, allowed_node_ids)
            .await?;
        Ok(session.service)
    }

    async fn session_for_run(
        &self,
        run_id: &RunId,
        organization_id: Option<&str>,
        allowed_tools: Option<&[String]>,
        allowed_node_ids: Option<&[String]>,
    ) -> Result<CachedSession> {
        let run = self
            .engine
            .find_run(run_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("run '{run_id}'")))?;
        if let Some(org) = organization_id {
            if run.organization_id.as_deref() != Some(org) {
                return Err(GatewayError::AccessDenied {
                    run_id: run_id.to_string(),
                    organization_id: org.to_string(),
                });
            }
        }

        let key = cache_key(run_id, allowed_node_ids);
        if let Some(existing) = self.sessions.get(&key) {
            tracing::debug!(run_id = %run_id, key = %key, "session cache hit");
            return Ok(existing.clone());
        }

        tracing::info!(run_id = %run_id, key = %key, "building gateway session");
        let server = GatewayServer::new(run_id.clone());
        self.registrar
            .register_run_tools(&server, allowed_tools, allowed_node_ids)
            .await?;

        // First insert wins; a racing builder's server is dropped.
        let entry = self.sessions.entry(key).or_insert_with(|| CachedSession {
            run_id: run_id.clone(),
            allowed_tools: allowed_tools.map(<[String]>::to_vec),
            allowed_node_ids: allowed_node_ids.map(<[String]>::to_vec),
            service: mcp_service(&server),
            server,
        });
        Ok(entry.clone())
    }

    /// Re-run registration against every cached session of a run.
    ///
    /// Lets tools that registered after a session was built (a slow sandbox,
    /// a late node) become callable without disconnecting the agent.
    pub async fn refresh_servers_for_run(&self, run_id: &RunId) -> Result<usize> {
        let sessions: Vec<CachedSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().run_id == *run_id)
            .map(|entry| entry.value().clone())
            .collect();

        for session in &sessions {
            self.registrar
                .register_run_tools(
                    &session.server,
                    session.allowed_tools.as_deref(),
                    session.allowed_node_ids.as_deref(),
                )
                .await?;
        }
        tracing::info!(
            run_id = %run_id,
            sessions = sessions.len(),
            "refreshed gateway sessions"
        );
        Ok(sessions.len())
    }

    /// Evict the bare-key session for a finished run.
    ///
    /// Scoped sessions are left for natural teardown: a run ending implies
    /// no further requests arrive for any of its scopes.
    pub fn cleanup_run(&self, run_id: &RunId) -> bool {
        let evicted = self.sessions.remove(run_id.as_str()).is_some();
        if evicted {
            tracing::info!(run_id = %run_id, "evicted gateway session");
        }
        evicted
    }

    /// Number of live cached sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
