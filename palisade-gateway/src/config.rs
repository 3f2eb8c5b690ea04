//! Gateway configuration
//!
//! Figment-layered: compiled defaults, then an optional `palisade.toml`,
//! then `PALISADE_`-prefixed environment variables. All the gateway's timing
//! knobs live here so deployments can tune them without a rebuild.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use palisade_common::GatewayError;
use palisade_discovery::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "PALISADE_";

/// Default configuration file name, looked up in the working directory.
const CONFIG_FILE: &str = "palisade.toml";

/// Tunable settings for the tool gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP front binds to
    pub bind_address: String,
    /// Port the HTTP front binds to; 0 picks a free port
    pub bind_port: u16,

    /// Overall timeout for one discovery call, in seconds
    pub discovery_timeout_secs: u64,
    /// Interval between sandbox health polls, in milliseconds
    pub health_poll_interval_ms: u64,
    /// Number of sandbox health polls before giving up
    pub health_poll_attempts: u32,

    /// Maximum attempts for one proxied external call
    pub proxy_max_attempts: u32,
    /// Base backoff delay between proxy attempts, in milliseconds; the
    /// delay after attempt `n` is `n * base`
    pub proxy_base_delay_ms: u64,
    /// Hard timeout for a single proxy attempt, in seconds
    pub proxy_attempt_timeout_secs: u64,

    /// Interval between component-result polls, in milliseconds
    pub bridge_poll_interval_ms: u64,
    /// Overall deadline for a component call, in seconds
    pub bridge_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 9400,
            discovery_timeout_secs: 30,
            health_poll_interval_ms: 1_000,
            health_poll_attempts: 60,
            proxy_max_attempts: 3,
            proxy_base_delay_ms: 1_000,
            proxy_attempt_timeout_secs: 60,
            bridge_poll_interval_ms: 500,
            bridge_timeout_secs: 60,
        }
    }
}

impl GatewayConfig {
    /// Load configuration: defaults, then `palisade.toml`, then `PALISADE_`
    /// environment variables.
    pub fn load() -> Result<Self, GatewayError> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(GatewayConfig::default()))
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Extract a configuration from an already-composed figment.
    pub fn from_figment(figment: Figment) -> Result<Self, GatewayError> {
        figment
            .extract()
            .map_err(|e| GatewayError::Other(format!("configuration error: {e}")))
    }

    /// The discovery-engine view of these settings.
    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            health_poll_interval: Duration::from_millis(self.health_poll_interval_ms),
            health_poll_attempts: self.health_poll_attempts,
        }
    }

    /// Per-attempt proxy timeout.
    pub fn proxy_attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_attempt_timeout_secs)
    }

    /// Base proxy backoff delay.
    pub fn proxy_base_delay(&self) -> Duration {
        Duration::from_millis(self.proxy_base_delay_ms)
    }

    /// Component-result poll interval.
    pub fn bridge_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bridge_poll_interval_ms)
    }

    /// Overall component call deadline.
    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }
}
