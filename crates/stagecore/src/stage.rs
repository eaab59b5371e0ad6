use crate::context::InputView;
use crate::events::{EventEmitter, ExecutionId};
use crate::{StageError, ValidationError, Value};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Opaque executable behind a stage
#[async_trait]
pub trait Action: Send + Sync {
    /// Type identifier (e.g., "generate", "document.search")
    fn action_type(&self) -> &str;

    /// Produce the stage's single output from its input view
    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError>;

    /// Input keys the action dereferences; checked against the stage's
    /// declared reads at validation time
    fn required_inputs(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Execution context passed to each action
#[derive(Clone)]
pub struct StageContext {
    pub stage_id: String,

    pub execution_id: ExecutionId,

    /// Values of the stage's declared reads, nothing else
    pub inputs: InputView,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Fires when the run or the enclosing parallel group is abandoned
    pub cancellation: CancellationToken,
}

impl StageContext {
    pub fn new(stage_id: impl Into<String>, inputs: InputView, events: EventEmitter) -> Self {
        Self {
            stage_id: stage_id.into(),
            execution_id: events.execution_id(),
            inputs,
            events,
            cancellation: CancellationToken::new(),
        }
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, StageError> {
        self.inputs.require(name)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, StageError> {
        self.inputs.require_str(name)
    }
}

/// Atomic unit of work: reads some keys, writes exactly one
#[derive(Clone)]
pub struct Stage {
    id: String,
    reads: BTreeSet<String>,
    writes: String,
    action: Arc<dyn Action>,
}

impl Stage {
    pub fn new<I, S>(
        id: impl Into<String>,
        reads: I,
        writes: impl Into<String>,
        action: Arc<dyn Action>,
    ) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let writes = writes.into();
        let reads: BTreeSet<String> = reads.into_iter().map(Into::into).collect();

        if reads.contains(&writes) {
            return Err(ValidationError::SelfDependency { stage: id, key: writes });
        }

        Ok(Self { id, reads, writes, action })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn reads(&self) -> &BTreeSet<String> {
        &self.reads
    }

    pub fn writes(&self) -> &str {
        &self.writes
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("action", &self.action.action_type())
            .finish()
    }
}

impl fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("action_type", &self.action_type())
            .finish()
    }
}

/// Action backed by an async closure
pub struct FnAction<F> {
    action_type: String,
    f: F,
}

impl<F> FnAction<F> {
    pub fn new(action_type: impl Into<String>, f: F) -> Self {
        Self {
            action_type: action_type.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, StageError>> + Send,
{
    fn action_type(&self) -> &str {
        &self.action_type
    }

    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        (self.f)(ctx).await
    }
}

/// Wrap an async closure as a shareable action
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn Action>
where
    F: Fn(StageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StageError>> + Send + 'static,
{
    Arc::new(FnAction::new("fn", f))
}
