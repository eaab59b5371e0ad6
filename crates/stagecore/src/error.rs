use thiserror::Error;

/// Top-level error for a single run, surfaced to the caller
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Stage '{stage_id}' failed (output '{key}' not written): {source}")]
    Stage {
        stage_id: String,
        key: String,
        #[source]
        source: StageError,
    },

    #[error("Context error: {0}")]
    Store(#[from] StoreError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    #[error("Run finished without declared output: {0}")]
    MissingOutput(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RunError {
    /// Id of the stage that failed, if the run failed inside a stage
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            RunError::Stage { stage_id, .. } => Some(stage_id),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Key already written: {0}")]
    DuplicateKey(String),
}

#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

/// Structural problems in a flow tree, detected before any stage runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Stage '{stage}' reads its own output '{key}'")]
    SelfDependency { stage: String, key: String },

    #[error("Output '{key}' written by both '{first}' and '{second}'")]
    DuplicateWrite {
        key: String,
        first: String,
        second: String,
    },

    #[error("Stage '{stage}' reads '{key}' which no earlier stage produces")]
    UnresolvedDependency { stage: String, key: String },

    #[error("Parallel composite '{composite}': '{stage}' reads '{key}' written by a sibling")]
    SiblingDependency {
        composite: String,
        stage: String,
        key: String,
    },

    #[error("Stage '{stage}' action requires undeclared input '{key}'")]
    UndeclaredInput { stage: String, key: String },

    #[error("Stage id used more than once: {0}")]
    DuplicateStageId(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Composite '{0}' has no children")]
    EmptyComposite(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}
