//! Registry error types

use palisade_common::GatewayError;
use palisade_store::StoreError;
use thiserror::Error as ThisError;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors the Tool Registry can report.
///
/// Absence is never an error: point lookups return `Ok(None)` and listings
/// return empty collections.
#[derive(Debug, ThisError)]
pub enum RegistryError {
    /// The backing registry store failed
    #[error("registry store error: {0}")]
    Store(#[from] StoreError),

    /// A stored payload could not be decoded
    #[error("malformed stored payload for key '{key}': {source}")]
    MalformedPayload {
        /// Store key holding the bad payload
        key: String,
        /// Decode failure
        #[source]
        source: serde_json::Error,
    },

    /// Input could not be serialized for storage
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored credentials failed to decrypt or decode
    #[error("credential decryption failed: {0}")]
    CredentialDecryption(String),
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::CredentialDecryption(msg) => GatewayError::CredentialDecryption(msg),
            RegistryError::Store(e) => GatewayError::Store(e.to_string()),
            RegistryError::Serialization(e) => GatewayError::Serde(e),
            RegistryError::MalformedPayload { .. } => GatewayError::Store(err.to_string()),
        }
    }
}
