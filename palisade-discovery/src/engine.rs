//! The discovery engine
//!
//! `discover` handles HTTP-reachable sources directly. `discover_stdio`
//! wraps discovery in a sandbox acquisition: spawn, poll health until the
//! nested server is ready, discover against the sandbox's local port, and
//! tear the sandbox down on every exit path, whether discovery succeeded,
//! returned zero tools, or failed. Teardown failures are logged and
//! swallowed; they never mask the discovery outcome.

use crate::connector::McpConnector;
use crate::error::{DiscoveryError, Result};
use crate::sandbox::{HealthProbe, SandboxInstance, SandboxRunner, SandboxSpec};
use futures::future::join_all;
use palisade_registry::ToolDefinition;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Discovery timing configuration.
///
/// The defaults match existing deployments; override through the gateway
/// configuration rather than editing constants.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Overall timeout for one protocol-level discovery call
    pub discovery_timeout: Duration,
    /// Interval between sandbox health polls
    pub health_poll_interval: Duration,
    /// Number of health polls before giving up on a sandbox
    pub health_poll_attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(30),
            health_poll_interval: Duration::from_secs(1),
            health_poll_attempts: 60,
        }
    }
}

/// One source inside a named collection, for group discovery.
#[derive(Debug, Clone)]
pub struct GroupSource {
    /// Source name, reported in the group outcome
    pub name: String,
    /// MCP endpoint
    pub endpoint: String,
    /// Optional auth headers
    pub headers: Option<Value>,
}

/// Aggregated result of a group discovery pass.
#[derive(Debug)]
pub struct GroupDiscoveryReport {
    /// Sources whose discovery succeeded
    pub succeeded: usize,
    /// Sources whose discovery failed
    pub failed: usize,
    /// Per-source outcomes, in input order
    pub outcomes: Vec<(String, std::result::Result<Vec<ToolDefinition>, String>)>,
}

/// The tool discovery engine.
pub struct DiscoveryEngine {
    connector: Arc<dyn McpConnector>,
    runner: Arc<dyn SandboxRunner>,
    probe: Arc<dyn HealthProbe>,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    /// Create an engine over the given seams.
    pub fn new(
        connector: Arc<dyn McpConnector>,
        runner: Arc<dyn SandboxRunner>,
        probe: Arc<dyn HealthProbe>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            connector,
            runner,
            probe,
            config,
        }
    }

    /// Discover the tool list behind an HTTP-reachable MCP endpoint.
    ///
    /// One `discovery_timeout` bounds the whole connect-and-list sequence.
    /// The session is closed whether listing succeeds or fails.
    pub async fn discover(
        &self,
        endpoint: &str,
        headers: Option<&Value>,
    ) -> Result<Vec<ToolDefinition>> {
        let timeout_secs = self.config.discovery_timeout.as_secs();
        tracing::debug!(endpoint, "discovering tools");

        let (session, listed) = timeout(self.config.discovery_timeout, async {
            let session = self.connector.connect(endpoint, headers).await?;
            let listed = session.list_tools().await;
            Ok::<_, DiscoveryError>((session, listed))
        })
        .await
        .map_err(|_| DiscoveryError::Timeout {
            endpoint: endpoint.to_string(),
            timeout_secs,
        })??;
        session.close().await;

        let tools = listed?;
        tracing::info!(endpoint, count = tools.len(), "discovery complete");
        Ok(tools)
    }

    /// Discover the tool list of a stdio-transport server.
    ///
    /// Scoped acquisition: the sandbox spawned here is torn down before this
    /// method returns, on every exit path.
    pub async fn discover_stdio(&self, spec: &SandboxSpec) -> Result<Vec<ToolDefinition>> {
        let instance = self.runner.spawn(spec).await?;
        let result = self.discover_in_sandbox(&instance).await;

        if let Err(e) = self.runner.teardown(&instance.container_id).await {
            // Best-effort: a leaked sandbox is logged, never escalated.
            tracing::warn!(
                container_id = %instance.container_id,
                error = %e,
                "sandbox teardown failed"
            );
        }
        result
    }

    async fn discover_in_sandbox(&self, instance: &SandboxInstance) -> Result<Vec<ToolDefinition>> {
        self.wait_until_ready(instance).await?;
        let endpoint = format!("http://127.0.0.1:{}/mcp", instance.port);
        self.discover(&endpoint, None).await
    }

    async fn wait_until_ready(&self, instance: &SandboxInstance) -> Result<()> {
        for attempt in 1..=self.config.health_poll_attempts {
            match self.probe.check(instance.port).await {
                Ok(report) if report.is_ready() => {
                    tracing::debug!(
                        container_id = %instance.container_id,
                        attempt,
                        "sandbox ready"
                    );
                    return Ok(());
                }
                Ok(_) => {
                    tracing::trace!(
                        container_id = %instance.container_id,
                        attempt,
                        "sandbox up, servers not ready"
                    );
                }
                Err(reason) => {
                    tracing::trace!(
                        container_id = %instance.container_id,
                        attempt,
                        %reason,
                        "health poll failed"
                    );
                }
            }
            if attempt < self.config.health_poll_attempts {
                tokio::time::sleep(self.config.health_poll_interval).await;
            }
        }
        Err(DiscoveryError::SandboxReadinessTimeout {
            container_id: instance.container_id.clone(),
            attempts: self.config.health_poll_attempts,
        })
    }

    /// Discover every source in a named collection concurrently.
    ///
    /// One failing source never aborts the others; the report carries
    /// per-source outcomes and aggregate counts.
    pub async fn discover_group(&self, sources: Vec<GroupSource>) -> GroupDiscoveryReport {
        let tasks = sources.into_iter().map(|source| async move {
            let outcome = self
                .discover(&source.endpoint, source.headers.as_ref())
                .await
                .map_err(|e| e.to_string());
            (source.name, outcome)
        });
        let outcomes: Vec<_> = join_all(tasks).await;

        let succeeded = outcomes.iter().filter(|(_, r)| r.is_ok()).count();
        let failed = outcomes.len() - succeeded;
        GroupDiscoveryReport {
            succeeded,
            failed,
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{McpConnector, McpSession};
    use crate::sandbox::{HealthReport, SandboxState, ServerHealth};
    use async_trait::async_trait;
    use rmcp::model::CallToolResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: None,
            input_schema: None,
        }
    }

    struct FakeSession {
        tools: std::result::Result<Vec<ToolDefinition>, String>,
        closed: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl McpSession for FakeSession {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.tools
                .clone()
                .map_err(|reason| DiscoveryError::from_transport("fake", reason))
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: Option<serde_json::Map<String, Value>>,
        ) -> Result<CallToolResult> {
            unimplemented!("discovery tests never call tools")
        }

        async fn close(self: Box<Self>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeConnector {
        tools: std::result::Result<Vec<ToolDefinition>, String>,
        connect_failure: Option<String>,
        closed: Arc<AtomicUsize>,
        connects: AtomicUsize,
        connect_delay: Option<Duration>,
        list_delay: Option<Duration>,
    }

    impl FakeConnector {
        fn listing(tools: Vec<ToolDefinition>) -> Self {
            Self {
                tools: Ok(tools),
                connect_failure: None,
                closed: Arc::new(AtomicUsize::new(0)),
                connects: AtomicUsize::new(0),
                connect_delay: None,
                list_delay: None,
            }
        }

        fn refusing(reason: &str) -> Self {
            Self {
                tools: Ok(vec![]),
                connect_failure: Some(reason.to_string()),
                closed: Arc::new(AtomicUsize::new(0)),
                connects: AtomicUsize::new(0),
                connect_delay: None,
                list_delay: None,
            }
        }
    }

    #[async_trait]
    impl McpConnector for FakeConnector {
        async fn connect(
            &self,
            endpoint: &str,
            _headers: Option<&Value>,
        ) -> Result<Box<dyn McpSession>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.connect_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(reason) = &self.connect_failure {
                return Err(DiscoveryError::from_transport(endpoint, reason));
            }
            Ok(Box::new(FakeSession {
                tools: self.tools.clone(),
                closed: self.closed.clone(),
                delay: self.list_delay,
            }))
        }
    }

    struct FakeRunner {
        spawns: AtomicUsize,
        teardowns: AtomicUsize,
        fail_spawn: bool,
    }

    impl FakeRunner {
        fn new() -> Self {
            Self {
                spawns: AtomicUsize::new(0),
                teardowns: AtomicUsize::new(0),
                fail_spawn: false,
            }
        }
    }

    #[async_trait]
    impl SandboxRunner for FakeRunner {
        async fn spawn(&self, _spec: &SandboxSpec) -> Result<SandboxInstance> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            if self.fail_spawn {
                return Err(DiscoveryError::SandboxSpawn("no such image".into()));
            }
            Ok(SandboxInstance {
                container_id: "sbx-test".into(),
                port: 45000,
                state: SandboxState::WaitingForHealth,
            })
        }

        async fn teardown(&self, _container_id: &str) -> Result<()> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedProbe {
        reports: Mutex<Vec<std::result::Result<HealthReport, String>>>,
    }

    impl ScriptedProbe {
        fn new(reports: Vec<std::result::Result<HealthReport, String>>) -> Self {
            Self {
                reports: Mutex::new(reports),
            }
        }

        fn always_ready() -> Self {
            Self::new(vec![])
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn check(&self, _port: u16) -> std::result::Result<HealthReport, String> {
            let mut reports = self.reports.lock().unwrap();
            if reports.is_empty() {
                return Ok(HealthReport {
                    status: "ok".into(),
                    servers: vec![ServerHealth { ready: true }],
                });
            }
            reports.remove(0)
        }
    }

    fn fast_config() -> DiscoveryConfig {
        DiscoveryConfig {
            discovery_timeout: Duration::from_millis(100),
            health_poll_interval: Duration::from_millis(1),
            health_poll_attempts: 3,
        }
    }

    fn engine_with(
        connector: Arc<FakeConnector>,
        runner: Arc<FakeRunner>,
        probe: Arc<dyn HealthProbe>,
    ) -> DiscoveryEngine {
        DiscoveryEngine::new(connector, runner, probe, fast_config())
    }

    fn spec() -> SandboxSpec {
        SandboxSpec {
            server_name: "nmap-mcp".into(),
            command: "uvx".into(),
            args: vec!["nmap-mcp-server".into()],
            env: BTreeMap::new(),
        }
    }

    use std::collections::BTreeMap;

    #[test_log::test(tokio::test)]
    async fn discover_lists_and_closes_session() {
        let connector = Arc::new(FakeConnector::listing(vec![tool("a"), tool("b")]));
        let runner = Arc::new(FakeRunner::new());
        let engine = engine_with(connector.clone(), runner, Arc::new(ScriptedProbe::always_ready()));

        let tools = engine.discover("http://feed:9400/mcp", None).await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn discover_closes_session_on_listing_failure() {
        let mut connector = FakeConnector::listing(vec![]);
        connector.tools = Err("stream closed".into());
        let connector = Arc::new(connector);
        let engine = engine_with(
            connector.clone(),
            Arc::new(FakeRunner::new()),
            Arc::new(ScriptedProbe::always_ready()),
        );

        let err = engine.discover("http://feed:9400/mcp", None).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Session { .. }));
        assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn discover_times_out_against_slow_listing() {
        let mut connector = FakeConnector::listing(vec![tool("slow")]);
        connector.list_delay = Some(Duration::from_millis(500));
        let engine = engine_with(
            Arc::new(connector),
            Arc::new(FakeRunner::new()),
            Arc::new(ScriptedProbe::always_ready()),
        );

        let err = engine.discover("http://slow:9400/mcp", None).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn discovery_timeout_bounds_connect_and_listing_together() {
        // Each phase fits inside the 100ms budget on its own; together they
        // must still be cut off at the overall bound.
        let mut connector = FakeConnector::listing(vec![tool("t")]);
        connector.connect_delay = Some(Duration::from_millis(60));
        connector.list_delay = Some(Duration::from_millis(60));
        let engine = engine_with(
            Arc::new(connector),
            Arc::new(FakeRunner::new()),
            Arc::new(ScriptedProbe::always_ready()),
        );

        let started = tokio::time::Instant::now();
        let err = engine.discover("http://slow:9400/mcp", None).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[test_log::test(tokio::test)]
    async fn stdio_discovery_tears_down_on_success() {
        let connector = Arc::new(FakeConnector::listing(vec![tool("scan")]));
        let runner = Arc::new(FakeRunner::new());
        let engine = engine_with(connector, runner.clone(), Arc::new(ScriptedProbe::always_ready()));

        let tools = engine.discover_stdio(&spec()).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(runner.spawns.load(Ordering::SeqCst), 1);
        assert_eq!(runner.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn stdio_discovery_tears_down_on_failure() {
        let connector = Arc::new(FakeConnector::refusing("tcp connect error: Connection refused"));
        let runner = Arc::new(FakeRunner::new());
        let engine = engine_with(connector, runner.clone(), Arc::new(ScriptedProbe::always_ready()));

        let err = engine.discover_stdio(&spec()).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ConnectionRefused { .. }));
        assert_eq!(runner.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn stdio_discovery_tears_down_on_readiness_timeout() {
        let never_ready = ScriptedProbe::new(vec![
            Err("connection refused".into()),
            Ok(HealthReport {
                status: "ok".into(),
                servers: vec![],
            }),
            Ok(HealthReport {
                status: "ok".into(),
                servers: vec![ServerHealth { ready: false }],
            }),
        ]);
        let runner = Arc::new(FakeRunner::new());
        let engine = engine_with(
            Arc::new(FakeConnector::listing(vec![])),
            runner.clone(),
            Arc::new(never_ready),
        );

        let err = engine.discover_stdio(&spec()).await.unwrap_err();
        match err {
            DiscoveryError::SandboxReadinessTimeout { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.teardowns.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn group_discovery_isolates_failures() {
        // One connector serves both sources: the fake distinguishes nothing
        // by endpoint, so run two engines and merge outcomes manually via a
        // connector that fails for a marked endpoint instead.
        struct SplitConnector {
            closed: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl McpConnector for SplitConnector {
            async fn connect(
                &self,
                endpoint: &str,
                _headers: Option<&Value>,
            ) -> Result<Box<dyn McpSession>> {
                if endpoint.contains("bad") {
                    return Err(DiscoveryError::from_transport(
                        endpoint,
                        "connection refused",
                    ));
                }
                Ok(Box::new(FakeSession {
                    tools: Ok(vec![tool("t")]),
                    closed: self.closed.clone(),
                    delay: None,
                }))
            }
        }

        let engine = DiscoveryEngine::new(
            Arc::new(SplitConnector {
                closed: Arc::new(AtomicUsize::new(0)),
            }),
            Arc::new(FakeRunner::new()),
            Arc::new(ScriptedProbe::always_ready()),
            fast_config(),
        );

        let report = engine
            .discover_group(vec![
                GroupSource {
                    name: "good".into(),
                    endpoint: "http://good:1/mcp".into(),
                    headers: None,
                },
                GroupSource {
                    name: "bad".into(),
                    endpoint: "http://bad:1/mcp".into(),
                    headers: None,
                },
            ])
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes[0].0, "good");
        assert!(report.outcomes[0].1.is_ok());
        assert!(report.outcomes[1].1.is_err());
    }
}
