//! Error types shared across the Palisade tool gateway
//!
//! The gateway distinguishes three propagation classes:
//!
//! - **Absence** (unknown key, no cached tool set) is `Ok(None)` or an empty
//!   collection, never an error.
//! - **Recoverable tool failures** (discovery faults, proxy exhaustion,
//!   component execution failures) become error-flagged tool results that
//!   the agent sees, without tearing down the session.
//! - **Session-fatal failures** (`AccessDenied`, `NotFound` during session
//!   construction) propagate to the transport layer, which maps them to
//!   403/404-equivalent rejections.

use thiserror::Error as ThisError;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Common error types for the Palisade tool gateway
///
/// Domain-specific errors (registry, discovery, proxy) are defined in their
/// respective crates and converted into these variants when they cross the
/// gateway boundary.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum GatewayError {
    /// The run exists but belongs to a different organization
    #[error("access denied: run '{run_id}' does not belong to organization '{organization_id}'")]
    AccessDenied {
        /// Run the caller asked for
        run_id: String,
        /// Organization scope the caller supplied
        organization_id: String,
    },

    /// A run, server, or tool the caller named does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Tool discovery did not complete within the configured timeout
    #[error("discovery timed out against '{endpoint}' after {timeout_secs}s")]
    DiscoveryTimeout {
        /// Endpoint the discovery session targeted
        endpoint: String,
        /// Timeout that was exhausted
        timeout_secs: u64,
    },

    /// Tool discovery failed at the transport level (refused, DNS, malformed)
    #[error("discovery connection error against '{endpoint}': {reason}")]
    DiscoveryConnection {
        /// Endpoint the discovery session targeted
        endpoint: String,
        /// Transport-level failure description
        reason: String,
    },

    /// The sandbox process could not be spawned
    #[error("sandbox spawn failed: {0}")]
    SandboxSpawnFailure(String),

    /// The sandbox never reported healthy within the polling budget
    #[error("sandbox '{container_id}' did not become ready within {attempts} health polls")]
    SandboxReadinessTimeout {
        /// Sandbox that was being polled
        container_id: String,
        /// Number of polls that were attempted
        attempts: u32,
    },

    /// A single proxied tool call attempt timed out
    #[error("proxied call to '{tool_name}' timed out after {timeout_secs}s")]
    ProxyCallTimeout {
        /// Proxied tool name
        tool_name: String,
        /// Per-attempt timeout that was exhausted
        timeout_secs: u64,
    },

    /// Every proxy retry attempt failed; carries the final attempt's error
    #[error("proxied call to '{tool_name}' failed after {attempts} attempts: {last_error}")]
    ProxyCallExhausted {
        /// Proxied tool name
        tool_name: String,
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: String,
    },

    /// A tool's backing registration is gone or incomplete at call time.
    /// Recoverable: the agent sees a tool failure, not a dropped session.
    #[error("tool source unavailable: {0}")]
    SourceUnavailable(String),

    /// Stored credentials could not be decrypted or decoded
    #[error("credential decryption failed: {0}")]
    CredentialDecryption(String),

    /// The workflow engine reported a failure, or the bridge poll timed out
    #[error("component execution failed: {0}")]
    ComponentExecutionFailure(String),

    /// Registry store operation failed
    #[error("store error: {0}")]
    Store(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Catch-all for errors that do not fit the taxonomy
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// True when this error should surface as an error-flagged tool result
    /// rather than a protocol fault.
    pub fn is_tool_recoverable(&self) -> bool {
        !matches!(
            self,
            GatewayError::AccessDenied { .. } | GatewayError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_is_session_fatal() {
        let err = GatewayError::AccessDenied {
            run_id: "run_1".into(),
            organization_id: "org_2".into(),
        };
        assert!(!err.is_tool_recoverable());
    }

    #[test]
    fn vanished_source_registration_is_tool_recoverable() {
        let err = GatewayError::SourceUnavailable(
            "source 'scanner' is no longer registered for run 'r1'".into(),
        );
        assert!(err.is_tool_recoverable());
    }

    #[test]
    fn discovery_errors_are_tool_recoverable() {
        let err = GatewayError::DiscoveryTimeout {
            endpoint: "http://localhost:9".into(),
            timeout_secs: 30,
        };
        assert!(err.is_tool_recoverable());
    }

    #[test]
    fn exhausted_proxy_error_reports_final_cause() {
        let err = GatewayError::ProxyCallExhausted {
            tool_name: "scanner__scan".into(),
            attempts: 3,
            last_error: "connection reset".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection reset"));
    }
}
