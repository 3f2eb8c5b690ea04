//! Durable tool catalog seam
//!
//! Pre-registered remote MCP servers have their tool lists discovered once,
//! out of band, and persisted in the platform's tool catalog. During session
//! builds the gateway reads that catalog instead of re-discovering.

use async_trait::async_trait;
use palisade_common::Result;
use serde_json::Value;

/// One tool as recorded in the durable catalog.
#[derive(Debug, Clone)]
pub struct CatalogTool {
    /// Tool name at the source server
    pub name: String,
    /// Human-readable description
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments
    pub input_schema: Option<Value>,
    /// Disabled tools stay in the catalog but are never registered
    pub enabled: bool,
}

/// Read-side of the platform's tool catalog.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Tools recorded for a registered server. Unknown servers are empty.
    async fn list_tools(&self, server_id: &str) -> Result<Vec<CatalogTool>>;
}
