//! Workflow engine seam
//!
//! The gateway never executes workflow logic itself. It looks runs up to
//! authorize session builds, signals the engine to execute component tools,
//! and queries it for their results. The engine client is injected by the
//! host process; tests use scripted fakes.

use async_trait::async_trait;
use palisade_common::{Result, RunId};
use serde_json::Value;

/// What the gateway needs to know about a run to authorize a session.
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Owning organization, when the engine tracks one
    pub organization_id: Option<String>,
}

/// Client-side view of the workflow engine.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Look a run up. Unknown runs are `Ok(None)`.
    async fn find_run(&self, run_id: &RunId) -> Result<Option<RunInfo>>;

    /// Deliver a named signal to a running workflow.
    async fn signal(&self, run_id: &RunId, name: &str, payload: Value) -> Result<()>;

    /// Issue a named query against a running workflow.
    ///
    /// `Ok(None)` means the queried state does not exist yet.
    async fn query(&self, run_id: &RunId, name: &str, args: Value) -> Result<Option<Value>>;
}
