//! Discovery error types

use palisade_common::GatewayError;
use thiserror::Error as ThisError;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors the Discovery Engine can report.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
    /// The discovery call did not complete within the configured timeout
    #[error("discovery timed out against '{endpoint}' after {timeout_secs}s")]
    Timeout {
        /// Endpoint the session targeted
        endpoint: String,
        /// Timeout that was exhausted
        timeout_secs: u64,
    },

    /// The endpoint refused the connection
    #[error("connection refused by '{endpoint}': {reason}")]
    ConnectionRefused {
        /// Endpoint the session targeted
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// The endpoint's host could not be resolved
    #[error("DNS resolution failed for '{endpoint}': {reason}")]
    DnsFailure {
        /// Endpoint the session targeted
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// The server answered with something that is not a valid tool listing
    #[error("malformed response from '{endpoint}': {reason}")]
    MalformedResponse {
        /// Endpoint the session targeted
        endpoint: String,
        /// Parse failure
        reason: String,
    },

    /// The sandbox process could not be spawned
    #[error("sandbox spawn failed: {0}")]
    SandboxSpawn(String),

    /// The sandbox never reported healthy within the polling budget
    #[error("sandbox '{container_id}' not ready after {attempts} health polls")]
    SandboxReadinessTimeout {
        /// Sandbox that was being polled
        container_id: String,
        /// Number of polls attempted
        attempts: u32,
    },

    /// Protocol-level session failure that fits no transport category
    #[error("MCP session error against '{endpoint}': {reason}")]
    Session {
        /// Endpoint the session targeted
        endpoint: String,
        /// Underlying failure
        reason: String,
    },
}

impl DiscoveryError {
    /// Classify a transport-level failure message into the right variant.
    ///
    /// MCP client errors arrive as opaque display strings wrapping reqwest
    /// and hyper causes; classification is best-effort on the message text.
    pub fn from_transport(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        let reason = reason.to_string();
        let lowered = reason.to_lowercase();
        if lowered.contains("dns") || lowered.contains("name resolution") {
            DiscoveryError::DnsFailure {
                endpoint: endpoint.to_string(),
                reason,
            }
        } else if lowered.contains("connection refused") || lowered.contains("connect error") {
            DiscoveryError::ConnectionRefused {
                endpoint: endpoint.to_string(),
                reason,
            }
        } else if lowered.contains("expected") || lowered.contains("parse") || lowered.contains("decod") {
            DiscoveryError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason,
            }
        } else {
            DiscoveryError::Session {
                endpoint: endpoint.to_string(),
                reason,
            }
        }
    }
}

impl From<DiscoveryError> for GatewayError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Timeout {
                endpoint,
                timeout_secs,
            } => GatewayError::DiscoveryTimeout {
                endpoint,
                timeout_secs,
            },
            DiscoveryError::ConnectionRefused { endpoint, reason }
            | DiscoveryError::DnsFailure { endpoint, reason }
            | DiscoveryError::MalformedResponse { endpoint, reason }
            | DiscoveryError::Session { endpoint, reason } => {
                GatewayError::DiscoveryConnection { endpoint, reason }
            }
            DiscoveryError::SandboxSpawn(msg) => GatewayError::SandboxSpawnFailure(msg),
            DiscoveryError::SandboxReadinessTimeout {
                container_id,
                attempts,
            } => GatewayError::SandboxReadinessTimeout {
                container_id,
                attempts,
            },
        }
    }
}
