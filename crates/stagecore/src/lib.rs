//! Core abstractions for staged workflows
//!
//! This crate provides the context store, the stage/action contract and the
//! sequential/parallel flow tree that the runtime executes. It does not run
//! anything itself.

pub mod context;
mod error;
pub mod events;
mod stage;
mod value;
mod workflow;

pub use context::{ContextSnapshot, ContextStore, InputView, REQUEST_KEY};
pub use error::{RunError, StageError, StoreError, ValidationError};
pub use events::*;
pub use stage::{action_fn, Action, FnAction, Stage, StageContext};
pub use value::Value;
pub use workflow::{Composite, CompositeKind, Flow, FlowSpec, StageSpec};

/// Result type for run operations
pub type Result<T> = std::result::Result<T, RunError>;
