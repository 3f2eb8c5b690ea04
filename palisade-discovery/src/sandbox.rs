//! Sandbox lifecycle
//!
//! A sandbox is an ephemeral, isolated process spawned solely to run a
//! stdio-transport MCP server long enough to discover its tools. The runner
//! injects the server's command and arguments as configuration, binds the
//! sandbox supervisor to a freshly allocated local port, and the engine
//! polls its health endpoint until the nested server reports ready.
//!
//! The health contract: `GET /health` returns
//! `{"status": "ok", "servers": [{"ready": true}, ...]}` and the sandbox
//! counts as ready only when the status is ok, at least one server entry
//! exists, and every entry is ready.

use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;

/// Description of the stdio server a sandbox should wrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSpec {
    /// Source-level server name, used for logging
    pub server_name: String,
    /// Command that starts the stdio MCP server inside the sandbox
    pub command: String,
    /// Arguments for the command
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the server process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Lifecycle states of a sandbox instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Process is being started
    Spawning,
    /// Process is up; waiting for the nested server to report ready
    WaitingForHealth,
    /// Health endpoint reports ready
    Ready,
    /// Spawn failed or readiness polling was exhausted
    Failed,
}

/// A spawned sandbox.
#[derive(Debug, Clone)]
pub struct SandboxInstance {
    /// Sandbox reference, usable for teardown
    pub container_id: String,
    /// Local port the sandbox supervisor is bound to
    pub port: u16,
    /// Current lifecycle state
    pub state: SandboxState,
}

/// Spawns and tears down sandbox processes.
///
/// Instances are exclusively owned by the discovery call that spawned them;
/// teardown must be safe to call exactly once on every exit path, and
/// tearing down an unknown id is a no-op.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Spawn a sandbox wrapping the given stdio server.
    async fn spawn(&self, spec: &SandboxSpec) -> Result<SandboxInstance>;

    /// Tear down a sandbox. Best-effort; failures are for the caller to log.
    async fn teardown(&self, container_id: &str) -> Result<()>;
}

/// Health endpoint response from a sandbox supervisor.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    /// Supervisor status; `"ok"` when the process is up
    pub status: String,
    /// One entry per nested MCP server
    #[serde(default)]
    pub servers: Vec<ServerHealth>,
}

/// Readiness of one nested server inside a sandbox.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerHealth {
    /// Whether the nested server finished initializing
    pub ready: bool,
}

impl HealthReport {
    /// The readiness gate: ok status, at least one server, all ready.
    pub fn is_ready(&self) -> bool {
        self.status == "ok" && !self.servers.is_empty() && self.servers.iter().all(|s| s.ready)
    }
}

/// Polls a sandbox's health endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// One poll. Any error means "not ready yet" to the caller.
    async fn check(&self, port: u16) -> std::result::Result<HealthReport, String>;
}

/// Production probe: HTTP GET against the sandbox's local port.
#[derive(Debug)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    /// Create a probe with a per-request timeout.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, port: u16) -> std::result::Result<HealthReport, String> {
        let url = format!("http://127.0.0.1:{port}/health");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("health endpoint returned {}", response.status()));
        }
        response.json().await.map_err(|e| e.to_string())
    }
}

/// Sandbox runner that spawns the sandbox supervisor as a local child
/// process, with the stdio server's command injected via environment.
pub struct ProcessSandboxRunner {
    supervisor: PathBuf,
    children: DashMap<String, tokio::process::Child>,
}

impl ProcessSandboxRunner {
    /// Create a runner that launches the given supervisor binary.
    pub fn new(supervisor: impl Into<PathBuf>) -> Self {
        Self {
            supervisor: supervisor.into(),
            children: DashMap::new(),
        }
    }

    async fn allocate_port() -> Result<u16> {
        // Bind to an OS-assigned port, then release it for the sandbox.
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| DiscoveryError::SandboxSpawn(format!("port allocation failed: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| DiscoveryError::SandboxSpawn(format!("port allocation failed: {e}")))?
            .port();
        drop(listener);
        Ok(port)
    }
}

#[async_trait]
impl SandboxRunner for ProcessSandboxRunner {
    async fn spawn(&self, spec: &SandboxSpec) -> Result<SandboxInstance> {
        let port = Self::allocate_port().await?;
        let container_id = format!("sbx-{}", ulid::Ulid::new().to_string().to_lowercase());
        let args_json = serde_json::to_string(&spec.args)
            .map_err(|e| DiscoveryError::SandboxSpawn(format!("bad args: {e}")))?;

        tracing::info!(
            container_id = %container_id,
            server = %spec.server_name,
            port,
            "spawning sandbox"
        );

        let child = tokio::process::Command::new(&self.supervisor)
            .env("PALISADE_SANDBOX_PORT", port.to_string())
            .env("PALISADE_SANDBOX_COMMAND", &spec.command)
            .env("PALISADE_SANDBOX_ARGS", args_json)
            .envs(&spec.env)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DiscoveryError::SandboxSpawn(format!(
                    "failed to spawn '{}': {e}",
                    self.supervisor.display()
                ))
            })?;

        self.children.insert(container_id.clone(), child);
        Ok(SandboxInstance {
            container_id,
            port,
            state: SandboxState::WaitingForHealth,
        })
    }

    async fn teardown(&self, container_id: &str) -> Result<()> {
        let Some((_, mut child)) = self.children.remove(container_id) else {
            return Ok(());
        };
        tracing::info!(container_id = %container_id, "tearing down sandbox");
        if let Err(e) = child.start_kill() {
            return Err(DiscoveryError::SandboxSpawn(format!(
                "failed to kill sandbox '{container_id}': {e}"
            )));
        }
        let _ = child.wait().await;
        Ok(())
    }
}
