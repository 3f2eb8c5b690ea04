//! # Palisade Registry
//!
//! The Tool Registry: the durable record of which tool sources exist for
//! which run. Tool-mode graph nodes register themselves here (components,
//! remote MCP servers, or sandboxed stdio servers); the gateway session
//! layer reads the registry back when it builds the per-run MCP server.
//!
//! The registry owns:
//!
//! - the [`RegisteredTool`] data model and its idempotent `(run, node)`
//!   upsert
//! - hierarchical visibility filtering over node ids
//! - the cached [`DiscoveredToolSet`] for sources whose tool list was
//!   resolved once and must not be re-discovered for the life of the run
//! - credential encryption-at-rest behind the [`CredentialCipher`] seam
//! - run cleanup, which reports any sandbox container ids that were
//!   recorded so the caller can tear them down
//!
//! Lookups on missing keys return `None`/empty collections. Only decoding
//! and decryption faults are errors.

/// Credential encryption seam
pub mod cipher;

/// Registry error types
pub mod error;

/// Registered tool data model
pub mod model;

/// The registry service
pub mod registry;

pub use cipher::{CredentialCipher, InMemoryCipher};
pub use error::{RegistryError, Result};
pub use model::{
    DiscoveredToolSet, EncryptedPayload, RegisterComponentTool, RegisterMcpServer,
    RegisteredTool, ToolDefinition, ToolSourceKind, ToolStatus,
};
pub use registry::{ToolRegistry, ToolRegistryConfig};
