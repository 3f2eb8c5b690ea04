//! # Palisade Store
//!
//! The Registry Store abstraction behind the Tool Registry: a shared,
//! low-latency key/value store with per-key expiry. The store is the single
//! source of truth for which tools exist for which run; everything the
//! gateway caches in-process is a rebuildable projection of it.
//!
//! Deployments that share registrations across gateway processes inject a
//! store backed by an external service. [`MemoryStore`] is the in-process
//! implementation used by tests and single-process deployments.
//!
//! Values are opaque strings; serialization belongs to the caller. All
//! writes are last-write-wins upserts. No multi-key transactions are
//! offered; each tool entry is independent.

/// In-process store implementation
pub mod memory;

/// The `RegistryStore` trait and store errors
pub mod store;

pub use memory::MemoryStore;
pub use store::{RegistryStore, StoreError};
