use crate::validator::ExecutionPlan;
use crate::{registry::ActionRegistry, ExecutionResult, WorkflowExecutor};
use serde::{Deserialize, Serialize};
use stagecore::{ContextStore, EventBus, Flow, FlowSpec, RunError, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Main runtime for executing flows, one run per invocation
pub struct FlowRuntime {
    registry: Arc<ActionRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    flows: Arc<RwLock<HashMap<String, Flow>>>,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(ActionRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<ActionRegistry>, config: RuntimeConfig) -> Self {
        let executor = WorkflowExecutor::new(config.max_parallel_stages)
            .with_stage_timeout(config.stage_timeout_ms.map(Duration::from_millis))
            .with_run_timeout(config.run_timeout_ms.map(Duration::from_millis));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor: Arc::new(executor),
            event_bus,
            flows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get access to the action registry
    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// Build a flow from a serializable definition
    pub fn build(&self, spec: &FlowSpec) -> Result<Flow, ValidationError> {
        self.registry.build_flow(spec)
    }

    /// Load a flow definition from JSON and build it
    pub fn load_json(&self, json: &str) -> Result<Flow, RunError> {
        let spec = FlowSpec::from_json(json)?;
        Ok(self.build(&spec)?)
    }

    /// Register a flow under its id
    pub async fn register_flow(&self, flow: Flow) {
        let mut flows = self.flows.write().await;
        flows.insert(flow.id().to_string(), flow);
    }

    /// Validate a flow without running it
    pub fn plan(&self, flow: &Flow, initial: &ContextStore) -> Result<ExecutionPlan, RunError> {
        self.executor.plan(flow, initial)
    }

    /// Run a flow and return the full execution result
    pub async fn execute(
        &self,
        flow: &Flow,
        initial: ContextStore,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        self.executor
            .execute(flow, initial, &self.event_bus, cancel)
            .await
    }

    /// Run a flow and return the final context
    pub async fn run(&self, flow: &Flow, initial: ContextStore) -> Result<ContextStore, RunError> {
        self.run_with_cancel(flow, initial, CancellationToken::new()).await
    }

    /// Run a flow that the caller may abandon through `cancel`
    pub async fn run_with_cancel(
        &self,
        flow: &Flow,
        initial: ContextStore,
        cancel: CancellationToken,
    ) -> Result<ContextStore, RunError> {
        self.execute(flow, initial, cancel)
            .await
            .map(|result| result.context)
    }

    /// Run a registered flow by id
    pub async fn run_registered(
        &self,
        flow_id: &str,
        initial: ContextStore,
    ) -> Result<ContextStore, RunError> {
        let flow = self
            .flows
            .read()
            .await
            .get(flow_id)
            .cloned()
            .ok_or_else(|| RunError::FlowNotFound(flow_id.to_string()))?;

        self.run(&flow, initial).await
    }

    /// Answer a single request: seed it into a fresh context, run the flow
    /// and return the text under the flow's terminal key.
    pub async fn invoke(
        &self,
        flow: &Flow,
        request: impl Into<String>,
    ) -> Result<String, RunError> {
        let key = flow
            .terminal_key()
            .ok_or_else(|| {
                ValidationError::InvalidDefinition(format!(
                    "Flow '{}' has no terminal output",
                    flow.id()
                ))
            })?
            .to_string();

        let context = self.run(flow, ContextStore::with_request(request)).await?;
        Ok(context.get(&key)?.to_text())
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<stagecore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on stage actions executing at the same time
    pub max_parallel_stages: usize,
    pub event_buffer_size: usize,
    pub stage_timeout_ms: Option<u64>,
    /// Whole-run deadline; expiry cancels the run
    pub run_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_stages: 10,
            event_buffer_size: 1000,
            stage_timeout_ms: None,
            run_timeout_ms: None,
        }
    }
}
