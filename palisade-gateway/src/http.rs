//! HTTP front for the gateway
//!
//! Serves one MCP endpoint per run at `/mcp/:run_id`, plus `/health`. The
//! streamable-HTTP MCP plumbing is rmcp's; this layer only resolves the
//! gateway session for the path's run and scope, then hands the request to
//! the per-session MCP service. Session-build rejections map to transport
//! statuses: unknown run is 404, wrong organization is 403.

use crate::config::GatewayConfig;
use crate::session::GatewaySessionCache;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use palisade_common::{GatewayError, RunId};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// Scope parameters accepted on the MCP endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeParams {
    /// Organization asserting ownership of the run
    pub organization_id: Option<String>,
    /// Comma-separated allow-list of agent-visible tool names
    pub allowed_tools: Option<String>,
    /// Comma-separated node-id subtree scope
    pub allowed_node_ids: Option<String>,
}

fn split_list(raw: &Option<String>) -> Option<Vec<String>> {
    raw.as_deref().map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// Start the gateway's HTTP server.
///
/// Binds to the configured address (port 0 picks a free one) and returns
/// the bound address plus the server task handle; abort the handle to shut
/// down.
pub async fn serve_gateway(
    cache: Arc<GatewaySessionCache>,
    config: &GatewayConfig,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), GatewayError> {
    let router = Router::new()
        .route("/mcp/:run_id", any(handle_mcp))
        .route("/health", get(health_check))
        .with_state(cache);

    let bind_addr = format!("{}:{}", config.bind_address, config.bind_port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| GatewayError::Other(format!("failed to bind '{bind_addr}': {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| GatewayError::Other(format!("failed to read bound address: {e}")))?;

    tracing::info!("gateway listening on http://{local_addr}/mcp/:run_id");
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("gateway HTTP server error: {e}");
        }
    });
    Ok((local_addr, handle))
}

async fn handle_mcp(
    State(cache): State<Arc<GatewaySessionCache>>,
    Path(run_id): Path<String>,
    Query(scope): Query<ScopeParams>,
    request: Request,
) -> Response {
    let run_id = RunId::new(run_id);
    let allowed_tools = split_list(&scope.allowed_tools);
    let allowed_node_ids = split_list(&scope.allowed_node_ids);

    // The session cache owns one MCP service per session key; rmcp's session
    // manager tracks the protocol-level streams within it.
    let service = match cache
        .service_for_run(
            &run_id,
            scope.organization_id.as_deref(),
            allowed_tools.as_deref(),
            allowed_node_ids.as_deref(),
        )
        .await
    {
        Ok(service) => service,
        Err(e) => return error_response(&e),
    };

    match service.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn error_response(error: &GatewayError) -> Response {
    let status = match error {
        GatewayError::AccessDenied { .. } => StatusCode::FORBIDDEN,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(%status, error = %error, "rejected gateway session request");
    (status, error.to_string()).into_response()
}

/// Health check handler for the /health endpoint.
async fn health_check() -> &'static str {
    "OK"
}
