//! Component bridge
//!
//! Component tools execute inside the workflow engine, not in the gateway.
//! The bridge signals the engine to start the call, then polls an engine
//! query until the result for this call id appears. A poll deadline that
//! expires produces an error-flagged tool result, never an `Err`; the
//! component may still complete later, and the agent should see a normal
//! tool failure it can react to.

use crate::config::GatewayConfig;
use crate::server::{GatewayServer, ToolHandler};
use crate::workflow::WorkflowEngine;
use async_trait::async_trait;
use chrono::Utc;
use palisade_common::{CallId, GatewayError, NodeId, Result, RunId};
use palisade_registry::ToolRegistry;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Signal name the engine listens on for component tool calls.
const EXECUTE_SIGNAL: &str = "executeToolCall";

/// Query name that exposes finished call results.
const RESULT_QUERY: &str = "getToolCallResult";

/// Result shape the engine's query returns for one call id.
#[derive(Debug, Deserialize)]
struct ToolCallOutcome {
    success: bool,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Executes component tools through the workflow engine.
pub struct ComponentBridge {
    engine: Arc<dyn WorkflowEngine>,
    registry: Arc<ToolRegistry>,
    poll_interval: Duration,
    call_timeout: Duration,
}

impl ComponentBridge {
    /// Create a bridge with the configured polling policy.
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        registry: Arc<ToolRegistry>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            poll_interval: config.bridge_poll_interval(),
            call_timeout: config.bridge_timeout(),
        }
    }

    /// Execute the component tool registered at `(run, node)`.
    pub async fn execute(
        &self,
        run_id: &RunId,
        node_id: &NodeId,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult> {
        let tool = self
            .registry
            .get_tool(run_id, node_id)
            .await
            .map_err(GatewayError::from)?
            .ok_or_else(|| {
                GatewayError::SourceUnavailable(format!(
                    "component '{node_id}' is no longer registered for run '{run_id}'"
                ))
            })?;
        let component_id = tool.component_id.clone().ok_or_else(|| {
            GatewayError::SourceUnavailable(format!(
                "'{node_id}' is not a component registration"
            ))
        })?;

        let (call_arguments, parameters) = split_arguments(
            arguments.unwrap_or_default(),
            tool.input_schema.as_ref(),
            tool.parameters.as_ref(),
        );
        let credentials = self
            .registry
            .get_tool_credentials(run_id, node_id)
            .await
            .map_err(GatewayError::from)?;

        let call_id = CallId::generate();
        let payload = json!({
            "callId": call_id,
            "nodeId": node_id,
            "componentId": component_id,
            "arguments": call_arguments,
            "parameters": parameters,
            "credentials": credentials,
            "requestedAt": Utc::now(),
        });

        tracing::info!(
            run_id = %run_id,
            node_id = %node_id,
            call_id = %call_id,
            component_id = %component_id,
            "component tool call started"
        );
        self.engine
            .signal(run_id, EXECUTE_SIGNAL, payload)
            .await
            .map_err(|e| GatewayError::ComponentExecutionFailure(e.to_string()))?;

        self.poll_for_result(run_id, node_id, &call_id).await
    }

    async fn poll_for_result(
        &self,
        run_id: &RunId,
        node_id: &NodeId,
        call_id: &CallId,
    ) -> Result<CallToolResult> {
        let deadline = Instant::now() + self.call_timeout;
        loop {
            let answer = self
                .engine
                .query(run_id, RESULT_QUERY, json!({ "callId": call_id }))
                .await
                .map_err(|e| GatewayError::ComponentExecutionFailure(e.to_string()))?;

            if let Some(value) = answer {
                let outcome: ToolCallOutcome = serde_json::from_value(value).map_err(|e| {
                    GatewayError::ComponentExecutionFailure(format!("malformed call result: {e}"))
                })?;
                return Ok(self.finish(run_id, node_id, call_id, outcome));
            }

            if Instant::now() + self.poll_interval > deadline {
                tracing::warn!(
                    run_id = %run_id,
                    node_id = %node_id,
                    call_id = %call_id,
                    timeout_secs = self.call_timeout.as_secs(),
                    "component tool call timed out"
                );
                return Ok(GatewayServer::error_result(format!(
                    "component call '{call_id}' timed out after {}s",
                    self.call_timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn finish(
        &self,
        run_id: &RunId,
        node_id: &NodeId,
        call_id: &CallId,
        outcome: ToolCallOutcome,
    ) -> CallToolResult {
        if outcome.success {
            tracing::info!(
                run_id = %run_id,
                node_id = %node_id,
                call_id = %call_id,
                "component tool call completed"
            );
            let text = outcome
                .output
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            GatewayServer::success_result(text)
        } else {
            let reason = outcome
                .error
                .unwrap_or_else(|| "component reported failure without detail".to_string());
            tracing::warn!(
                run_id = %run_id,
                node_id = %node_id,
                call_id = %call_id,
                error = %reason,
                "component tool call failed"
            );
            GatewayServer::error_result(reason)
        }
    }
}

/// Partition call-time arguments into action inputs and parameter overrides.
///
/// Keys declared in the component's input schema are passed through as the
/// call's arguments; anything else overrides the statically registered
/// parameters.
fn split_arguments(
    arguments: Map<String, Value>,
    input_schema: Option<&Value>,
    static_parameters: Option<&Value>,
) -> (Map<String, Value>, Map<String, Value>) {
    let declared = input_schema
        .and_then(|schema| schema.get("properties"))
        .and_then(Value::as_object);

    let mut parameters = match static_parameters {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    let mut call_arguments = Map::new();
    for (key, value) in arguments {
        let is_declared = declared.is_some_and(|props| props.contains_key(&key));
        if is_declared {
            call_arguments.insert(key, value);
        } else {
            parameters.insert(key, value);
        }
    }
    (call_arguments, parameters)
}

/// Handler wired for every component tool.
pub struct ComponentToolHandler {
    bridge: Arc<ComponentBridge>,
    run_id: RunId,
    node_id: NodeId,
}

impl ComponentToolHandler {
    /// Wire a component tool to the bridge.
    pub fn new(bridge: Arc<ComponentBridge>, run_id: RunId, node_id: NodeId) -> Self {
        Self {
            bridge,
            run_id,
            node_id,
        }
    }
}

#[async_trait]
impl ToolHandler for ComponentToolHandler {
    async fn call(&self, arguments: Option<Map<String, Value>>) -> Result<CallToolResult> {
        self.bridge
            .execute(&self.run_id, &self.node_id, arguments)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::RunInfo;
    use palisade_registry::{InMemoryCipher, RegisterComponentTool};
    use palisade_store::MemoryStore;
    use std::sync::Mutex;

    /// Engine fake: records signals, answers the result query from a script.
    struct FakeEngine {
        signals: Mutex<Vec<(String, Value)>>,
        // Pops from the front on each query; empty means keep answering None.
        answers: Mutex<Vec<Option<Value>>>,
    }

    impl FakeEngine {
        fn answering(answers: Vec<Option<Value>>) -> Arc<Self> {
            Arc::new(Self {
                signals: Mutex::new(Vec::new()),
                answers: Mutex::new(answers),
            })
        }
    }

    #[async_trait]
    impl WorkflowEngine for FakeEngine {
        async fn find_run(&self, _run_id: &RunId) -> Result<Option<RunInfo>> {
            Ok(Some(RunInfo {
                organization_id: None,
            }))
        }

        async fn signal(&self, _run_id: &RunId, name: &str, payload: Value) -> Result<()> {
            self.signals
                .lock()
                .unwrap()
                .push((name.to_string(), payload));
            Ok(())
        }

        async fn query(&self, _run_id: &RunId, _name: &str, _args: Value) -> Result<Option<Value>> {
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Ok(None)
            } else {
                Ok(answers.remove(0))
            }
        }
    }

    async fn registry_with_component() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new(
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryCipher::default()),
        ));
        registry
            .register_component_tool(RegisterComponentTool {
                run_id: "r1".into(),
                node_id: "slack".into(),
                tool_name: "post_message".to_string(),
                component_id: "core.slack.post".to_string(),
                description: None,
                input_schema: Some(json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } }
                })),
                credentials: None,
                exposed_to_agent: true,
                parameters: Some(json!({ "channel": "#alerts" })),
            })
            .await
            .unwrap();
        registry
    }

    fn bridge_config() -> GatewayConfig {
        GatewayConfig {
            bridge_poll_interval_ms: 10,
            bridge_timeout_secs: 1,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn signal_payload_splits_arguments_from_overrides() {
        let engine = FakeEngine::answering(vec![Some(json!({ "success": true, "output": "ok" }))]);
        let bridge = ComponentBridge::new(engine.clone(), registry_with_component().await, &bridge_config());

        let mut args = Map::new();
        args.insert("text".to_string(), json!("hi"));
        args.insert("channel".to_string(), json!("#override"));
        let result = bridge
            .execute(&"r1".into(), &"slack".into(), Some(args))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));

        let signals = engine.signals.lock().unwrap();
        let (name, payload) = &signals[0];
        assert_eq!(name, "executeToolCall");
        assert_eq!(payload["componentId"], "core.slack.post");
        assert_eq!(payload["arguments"], json!({ "text": "hi" }));
        assert_eq!(payload["parameters"], json!({ "channel": "#override" }));
        assert!(payload["callId"].as_str().is_some());
    }

    #[tokio::test]
    async fn polls_until_the_result_appears() {
        let engine = FakeEngine::answering(vec![
            None,
            None,
            Some(json!({ "success": false, "error": "bad webhook" })),
        ]);
        let bridge = ComponentBridge::new(engine, registry_with_component().await, &bridge_config());

        let result = bridge
            .execute(&"r1".into(), &"slack".into(), None)
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_timeout_is_a_structured_failure_not_an_error() {
        let engine = FakeEngine::answering(vec![]);
        let bridge = ComponentBridge::new(engine, registry_with_component().await, &bridge_config());

        let result = bridge
            .execute(&"r1".into(), &"slack".into(), None)
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn unknown_component_is_an_error() {
        let engine = FakeEngine::answering(vec![]);
        let bridge = ComponentBridge::new(engine, registry_with_component().await, &bridge_config());

        let err = bridge
            .execute(&"r1".into(), &"ghost".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SourceUnavailable(_)));
        // Surfaces to the agent as a tool failure, not a dropped session.
        assert!(err.is_tool_recoverable());
        assert!(err.to_string().contains("no longer registered"));
    }
}
