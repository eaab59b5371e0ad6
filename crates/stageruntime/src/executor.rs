use crate::validator::{self, ExecutionPlan};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use stagecore::{
    Composite, CompositeKind, ContextStore, EventBus, ExecutionEvent, ExecutionId, Flow, RunError,
    Stage, StageContext, StageError,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Executes flow trees: sequential children in order, parallel children as
/// a joined task group
pub struct WorkflowExecutor {
    max_parallel: usize,
    stage_timeout: Option<Duration>,
    run_timeout: Option<Duration>,
}

/// Per-run state shared with spawned parallel children
#[derive(Clone)]
struct RunState {
    execution_id: ExecutionId,
    event_bus: Arc<EventBus>,
    permits: Arc<Semaphore>,
    stage_timeout: Option<Duration>,
}

impl WorkflowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            stage_timeout: None,
            run_timeout: None,
        }
    }

    pub fn with_stage_timeout(mut self, stage_timeout: Option<Duration>) -> Self {
        self.stage_timeout = stage_timeout;
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Validate a flow against the keys of the initial context
    pub fn plan(&self, flow: &Flow, initial: &ContextStore) -> Result<ExecutionPlan, RunError> {
        let initial_keys: BTreeSet<String> = initial.keys().map(str::to_string).collect();
        Ok(validator::validate(flow, &initial_keys)?)
    }

    /// Validate and run a flow, returning the final context
    pub async fn execute(
        &self,
        flow: &Flow,
        initial: ContextStore,
        event_bus: &Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            flow_id: flow.id().to_string(),
            timestamp: Utc::now(),
        });

        tracing::info!(%execution_id, flow_id = %flow.id(), "Starting run");

        let result = self
            .execute_validated(flow, initial, event_bus, execution_id, cancel)
            .await;

        let duration_ms = start_time.elapsed().as_millis() as u64;

        event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match &result {
            Ok(_) => tracing::info!(%execution_id, duration_ms, "Run completed"),
            Err(e) => tracing::error!(%execution_id, duration_ms, error = %e, "Run failed"),
        }

        result.map(|context| ExecutionResult {
            execution_id,
            context,
            stage_count: flow.stage_count(),
            duration_ms,
        })
    }

    async fn execute_validated(
        &self,
        flow: &Flow,
        initial: ContextStore,
        event_bus: &Arc<EventBus>,
        execution_id: ExecutionId,
        cancel: CancellationToken,
    ) -> Result<ContextStore, RunError> {
        let plan = self.plan(flow, &initial)?;
        tracing::debug!(%execution_id, order = ?plan.stage_order, "Flow validated");

        let run_token = cancel.child_token();
        let _deadline = self.run_timeout.map(|limit| {
            let token = run_token.clone();
            DeadlineGuard(tokio::spawn(async move {
                sleep(limit).await;
                tracing::warn!(
                    %execution_id,
                    timeout_ms = limit.as_millis() as u64,
                    "Run timed out"
                );
                token.cancel();
            }))
        });

        let state = RunState {
            execution_id,
            event_bus: Arc::clone(event_bus),
            permits: Arc::new(Semaphore::new(self.max_parallel)),
            stage_timeout: self.stage_timeout,
        };

        let mut store = initial;
        run_flow(&state, flow, &mut store, &run_token).await?;

        for key in flow.writes() {
            if !store.contains(&key) {
                return Err(RunError::MissingOutput(key));
            }
        }

        Ok(store)
    }
}

/// Aborts the run deadline timer once the run finishes
struct DeadlineGuard(tokio::task::JoinHandle<()>);

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn run_flow<'a>(
    state: &'a RunState,
    flow: &'a Flow,
    store: &'a mut ContextStore,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<(), RunError>> {
    async move {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        match flow {
            Flow::Stage(stage) => run_stage(state, stage, store, cancel).await,
            Flow::Composite(composite) => match composite.kind() {
                CompositeKind::Sequential => run_sequential(state, composite, store, cancel).await,
                CompositeKind::Parallel => run_parallel(state, composite, store, cancel).await,
            },
        }
    }
    .boxed()
}

async fn run_sequential(
    state: &RunState,
    composite: &Composite,
    store: &mut ContextStore,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    tracing::debug!(
        execution_id = %state.execution_id,
        composite_id = %composite.id(),
        children = composite.children().len(),
        "Running sequential composite"
    );

    for child in composite.children() {
        run_flow(state, child, store, cancel).await?;
    }
    Ok(())
}

/// Fan out every child against the same snapshot, fan in once all finish.
///
/// Outputs are merged only if every child succeeds. On the first failure the
/// group token is cancelled, remaining children are drained and the whole
/// group's outputs are discarded.
async fn run_parallel(
    state: &RunState,
    composite: &Composite,
    store: &mut ContextStore,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    let snapshot = store.snapshot();
    let group = cancel.child_token();
    let mut running = JoinSet::new();

    tracing::debug!(
        execution_id = %state.execution_id,
        composite_id = %composite.id(),
        children = composite.children().len(),
        "Fanning out parallel composite"
    );

    for child in composite.children() {
        let state = state.clone();
        let child = child.clone();
        let group = group.clone();
        let snapshot = snapshot.clone();

        running.spawn(async move {
            let mut local = snapshot.to_store();
            let result = run_flow(&state, &child, &mut local, &group).await;
            (child.writes(), result.map(|_| local))
        });
    }

    let mut outputs = Vec::new();
    let mut failure: Option<RunError> = None;

    while let Some(joined) = running.join_next().await {
        let outcome = joined
            .map_err(|e| {
                RunError::Execution(format!("Task join error in '{}': {}", composite.id(), e))
            })
            .and_then(|(writes, result)| result.map(|local| (writes, local)));

        match outcome {
            Ok(output) => outputs.push(output),
            Err(e) => {
                if failure.is_none() {
                    group.cancel();
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = failure {
        let discarded_keys: Vec<String> = outputs
            .iter()
            .flat_map(|(writes, _)| writes.iter().cloned())
            .collect();

        tracing::warn!(
            execution_id = %state.execution_id,
            composite_id = %composite.id(),
            discarded = ?discarded_keys,
            error = %e,
            "Parallel composite failed, discarding group outputs"
        );

        state.event_bus.emit(ExecutionEvent::GroupDiscarded {
            execution_id: state.execution_id,
            composite_id: composite.id().to_string(),
            discarded_keys,
            timestamp: Utc::now(),
        });

        return Err(e);
    }

    for (writes, local) in &outputs {
        store.merge_keys(local, writes)?;
    }
    Ok(())
}

async fn run_stage(
    state: &RunState,
    stage: &Stage,
    store: &mut ContextStore,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    // Validation guarantees the reads exist; a miss here is a store error,
    // never a reason to invoke the action.
    let inputs = store.view(stage.reads())?;

    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(RunError::Cancelled),
        permit = state.permits.acquire() => permit
            .map_err(|e| RunError::Execution(format!("Stage permits closed: {}", e)))?,
    };

    let ctx = StageContext {
        stage_id: stage.id().to_string(),
        execution_id: state.execution_id,
        inputs,
        events: state.event_bus.create_emitter(state.execution_id, stage.id()),
        cancellation: cancel.clone(),
    };

    state.event_bus.emit(ExecutionEvent::StageStarted {
        execution_id: state.execution_id,
        stage_id: stage.id().to_string(),
        action_type: stage.action().action_type().to_string(),
        timestamp: Utc::now(),
    });
    tracing::info!(
        execution_id = %state.execution_id,
        stage_id = %stage.id(),
        action = %stage.action().action_type(),
        "Starting stage"
    );

    let start = Instant::now();
    let action = Arc::clone(stage.action());
    let stage_timeout = state.stage_timeout;
    let invocation = async move {
        let execution = AssertUnwindSafe(action.execute(ctx)).catch_unwind();
        let outcome = match stage_timeout {
            Some(limit) => match timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(StageError::Timeout {
                        millis: limit.as_millis() as u64,
                    })
                }
            },
            None => execution.await,
        };
        outcome.unwrap_or_else(|panic| Err(StageError::ExecutionFailed(panic_message(panic))))
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StageError::Cancelled),
        result = invocation => result,
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(value) => {
            store.set(stage.writes(), value)?;

            tracing::info!(
                execution_id = %state.execution_id,
                stage_id = %stage.id(),
                key = %stage.writes(),
                duration_ms,
                "Stage completed"
            );
            state.event_bus.emit(ExecutionEvent::StageCompleted {
                execution_id: state.execution_id,
                stage_id: stage.id().to_string(),
                key: stage.writes().to_string(),
                duration_ms,
                timestamp: Utc::now(),
            });
            Ok(())
        }
        Err(_) if cancel.is_cancelled() => {
            state.event_bus.emit(ExecutionEvent::StageCancelled {
                execution_id: state.execution_id,
                stage_id: stage.id().to_string(),
                timestamp: Utc::now(),
            });
            tracing::warn!(
                execution_id = %state.execution_id,
                stage_id = %stage.id(),
                "Stage abandoned after cancellation"
            );
            Err(RunError::Cancelled)
        }
        Err(e) => {
            state.event_bus.emit(ExecutionEvent::StageFailed {
                execution_id: state.execution_id,
                stage_id: stage.id().to_string(),
                error: e.to_string(),
                timestamp: Utc::now(),
            });

            tracing::error!(
                execution_id = %state.execution_id,
                stage_id = %stage.id(),
                duration_ms,
                error = %e,
                "Stage failed"
            );
            Err(RunError::Stage {
                stage_id: stage.id().to_string(),
                key: stage.writes().to_string(),
                source: e,
            })
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("Action panicked: {}", detail)
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    /// Final context, containing every key the flow declares
    pub context: ContextStore,
    pub stage_count: usize,
    pub duration_ms: u64,
}
