use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: ExecutionId,
        flow_id: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        execution_id: ExecutionId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StageStarted {
        execution_id: ExecutionId,
        stage_id: String,
        action_type: String,
        timestamp: DateTime<Utc>,
    },
    StageCompleted {
        execution_id: ExecutionId,
        stage_id: String,
        key: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StageFailed {
        execution_id: ExecutionId,
        stage_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The stage was abandoned because its run or group was cancelled
    StageCancelled {
        execution_id: ExecutionId,
        stage_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A parallel group failed and its siblings' outputs were dropped
    GroupDiscarded {
        execution_id: ExecutionId,
        composite_id: String,
        discarded_keys: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    StageEvent {
        execution_id: ExecutionId,
        stage_id: String,
        event: StageEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events reported by an action while it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StageEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter for actions to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    stage_id: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        stage_id: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            stage_id: stage_id.into(),
            sender,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    /// Emit a stage-specific event
    pub fn emit(&self, event: StageEvent) {
        let _ = self.sender.send(ExecutionEvent::StageEvent {
            execution_id: self.execution_id,
            stage_id: self.stage_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(StageEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(StageEvent::Warning {
            message: message.into(),
        });
    }
}

/// Broadcast bus shared by every run of a runtime
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn create_emitter(
        &self,
        execution_id: ExecutionId,
        stage_id: impl Into<String>,
    ) -> EventEmitter {
        EventEmitter::new(execution_id, stage_id, self.sender.clone())
    }
}
