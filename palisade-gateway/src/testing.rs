//! Shared test fixtures for the gateway crate.

use crate::bridge::ComponentBridge;
use crate::catalog::{CatalogTool, ToolCatalog};
use crate::config::GatewayConfig;
use crate::proxy::CallProxy;
use crate::registration::ToolRegistrar;
use crate::server::{GatewayServer, ToolHandler};
use crate::workflow::{RunInfo, WorkflowEngine};
use async_trait::async_trait;
use palisade_common::{Result, RunId};
use palisade_discovery::{
    DiscoveryConfig, DiscoveryEngine, DiscoveryError, HealthProbe, HealthReport, McpConnector,
    McpSession, SandboxInstance, SandboxRunner, SandboxSpec, ServerHealth,
};
use palisade_registry::{
    InMemoryCipher, RegisterComponentTool, RegisterMcpServer, ToolDefinition, ToolRegistry,
    ToolSourceKind, ToolStatus,
};
use palisade_store::MemoryStore;
use rmcp::model::CallToolResult;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Workflow engine stub: scripted run lookups, recorded signals, no queries.
pub(crate) struct StubEngine {
    allow_all: bool,
    runs: HashMap<String, RunInfo>,
    pub(crate) signals: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl WorkflowEngine for StubEngine {
    async fn find_run(&self, run_id: &RunId) -> Result<Option<RunInfo>> {
        if self.allow_all {
            return Ok(Some(RunInfo {
                organization_id: None,
            }));
        }
        Ok(self.runs.get(run_id.as_str()).cloned())
    }

    async fn signal(&self, _run_id: &RunId, name: &str, payload: Value) -> Result<()> {
        self.signals
            .lock()
            .unwrap()
            .push((name.to_string(), payload));
        Ok(())
    }

    async fn query(&self, _run_id: &RunId, _name: &str, _args: Value) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Engine that knows every run.
pub(crate) fn engine_ok() -> Arc<StubEngine> {
    Arc::new(StubEngine {
        allow_all: true,
        runs: HashMap::new(),
        signals: Mutex::new(Vec::new()),
    })
}

/// Engine that knows exactly one run with the given owning organization.
pub(crate) fn engine_with_run(run_id: &str, organization_id: Option<&str>) -> Arc<StubEngine> {
    let mut runs = HashMap::new();
    runs.insert(
        run_id.to_string(),
        RunInfo {
            organization_id: organization_id.map(str::to_string),
        },
    );
    Arc::new(StubEngine {
        allow_all: false,
        runs,
        signals: Mutex::new(Vec::new()),
    })
}

/// Catalog stub that answers every server id with the same tool list.
pub(crate) struct StaticCatalog {
    tools: Vec<CatalogTool>,
}

#[async_trait]
impl ToolCatalog for StaticCatalog {
    async fn list_tools(&self, _server_id: &str) -> Result<Vec<CatalogTool>> {
        Ok(self.tools.clone())
    }
}

pub(crate) fn catalog_with(tools: Vec<CatalogTool>) -> Arc<StaticCatalog> {
    Arc::new(StaticCatalog { tools })
}

struct CountingSession;

#[async_trait]
impl McpSession for CountingSession {
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDefinition>, DiscoveryError> {
        Ok(vec![ToolDefinition {
            name: "discovered_tool".to_string(),
            description: Some("From live discovery".to_string()),
            input_schema: None,
        }])
    }

    async fn call_tool(
        &self,
        _name: &str,
        _arguments: Option<serde_json::Map<String, Value>>,
    ) -> std::result::Result<CallToolResult, DiscoveryError> {
        Ok(GatewayServer::success_result("ok"))
    }

    async fn close(self: Box<Self>) {}
}

/// Connector that counts how often a session was opened.
pub(crate) struct CountingConnector {
    pub(crate) connects: Arc<AtomicU32>,
}

#[async_trait]
impl McpConnector for CountingConnector {
    async fn connect(
        &self,
        _endpoint: &str,
        _headers: Option<&Value>,
    ) -> std::result::Result<Box<dyn McpSession>, DiscoveryError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSession))
    }
}

struct UnusedRunner;

#[async_trait]
impl SandboxRunner for UnusedRunner {
    async fn spawn(
        &self,
        _spec: &SandboxSpec,
    ) -> std::result::Result<SandboxInstance, DiscoveryError> {
        Err(DiscoveryError::SandboxSpawn(
            "no sandbox in gateway tests".to_string(),
        ))
    }

    async fn teardown(&self, _container_id: &str) -> std::result::Result<(), DiscoveryError> {
        Ok(())
    }
}

struct AlwaysReadyProbe;

#[async_trait]
impl HealthProbe for AlwaysReadyProbe {
    async fn check(&self, _port: u16) -> std::result::Result<HealthReport, String> {
        Ok(HealthReport {
            status: "ok".to_string(),
            servers: vec![ServerHealth { ready: true }],
        })
    }
}

/// Everything a registrar-level test needs, wired over in-memory fakes.
pub(crate) struct RegistrarFixture {
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) registrar: Arc<ToolRegistrar>,
    pub(crate) engine: Arc<StubEngine>,
    pub(crate) connects: Arc<AtomicU32>,
}

pub(crate) async fn registrar_fixture(
    engine: Arc<StubEngine>,
    catalog: Arc<StaticCatalog>,
) -> RegistrarFixture {
    let registry = Arc::new(ToolRegistry::new(
        Arc::new(MemoryStore::new()),
        Arc::new(InMemoryCipher::default()),
    ));
    let connects = Arc::new(AtomicU32::new(0));
    let connector = Arc::new(CountingConnector {
        connects: connects.clone(),
    });
    let discovery = Arc::new(DiscoveryEngine::new(
        connector.clone(),
        Arc::new(UnusedRunner),
        Arc::new(AlwaysReadyProbe),
        DiscoveryConfig {
            discovery_timeout: Duration::from_secs(5),
            health_poll_interval: Duration::from_millis(1),
            health_poll_attempts: 3,
        },
    ));
    let config = GatewayConfig {
        proxy_base_delay_ms: 1,
        bridge_poll_interval_ms: 10,
        bridge_timeout_secs: 1,
        ..GatewayConfig::default()
    };
    let bridge = Arc::new(ComponentBridge::new(
        engine.clone(),
        registry.clone(),
        &config,
    ));
    let proxy = Arc::new(CallProxy::new(connector, &config));
    let registrar = Arc::new(ToolRegistrar::new(
        registry.clone(),
        discovery,
        catalog,
        bridge,
        proxy,
    ));
    RegistrarFixture {
        registry,
        registrar,
        engine,
        connects,
    }
}

pub(crate) fn component_input(run: &str, node: &str, name: &str) -> RegisterComponentTool {
    RegisterComponentTool {
        run_id: run.into(),
        node_id: node.into(),
        tool_name: name.to_string(),
        component_id: format!("core.{name}"),
        description: None,
        input_schema: None,
        credentials: None,
        exposed_to_agent: true,
        parameters: None,
    }
}

pub(crate) fn server_input(run: &str, node: &str, kind: ToolSourceKind) -> RegisterMcpServer {
    RegisterMcpServer {
        run_id: run.into(),
        node_id: node.into(),
        tool_name: node.to_string(),
        kind,
        endpoint: Some("http://127.0.0.1:9400/mcp".to_string()),
        headers: None,
        container_id: None,
        tools: None,
        status: ToolStatus::Ready,
    }
}

struct NoopHandler;

#[async_trait]
impl ToolHandler for NoopHandler {
    async fn call(
        &self,
        _arguments: Option<serde_json::Map<String, Value>>,
    ) -> Result<CallToolResult> {
        Ok(GatewayServer::success_result("noop"))
    }
}

pub(crate) fn noop_handler() -> Arc<dyn ToolHandler> {
    Arc::new(NoopHandler)
}
