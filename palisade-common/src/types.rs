//! Identifier newtypes used across the gateway crates
//!
//! Run and node ids arrive from the workflow engine and are opaque strings;
//! call ids are minted by the gateway itself and use ULIDs so they sort by
//! creation time in the engine's query logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator that makes a node id hierarchical (`group/child`).
pub const NODE_ID_SEPARATOR: char = '/';

/// Identifier of one workflow execution ("run").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Wrap an engine-supplied run id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a graph node within a workflow.
///
/// Node ids may be hierarchical, with `/` separating parent from child
/// (`group/child`). Hierarchy is meaningful to visibility scoping: a node is
/// inside a subtree when its id equals the subtree root or extends it past a
/// `/` boundary. A bare string prefix (`parent-extra` under `parent`) is not
/// containment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap an engine-supplied node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this node sits inside the subtree rooted at `root`,
    /// including the root itself.
    pub fn is_within(&self, root: &str) -> bool {
        self.0 == root
            || (self.0.len() > root.len()
                && self.0.starts_with(root)
                && self.0[root.len()..].starts_with(NODE_ID_SEPARATOR))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one component tool invocation, minted per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Mint a fresh call id.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
