//! Flow execution runtime
//!
//! This crate validates flow trees, runs them (sequential children in
//! order, parallel children as a joined task group) and resolves
//! serializable definitions through the action registry.

mod executor;
mod registry;
mod runtime;
mod validator;

pub use executor::{ExecutionResult, WorkflowExecutor};
pub use registry::{ActionFactory, ActionMetadata, ActionRegistry};
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use validator::{validate, DependencyEdge, ExecutionPlan};
