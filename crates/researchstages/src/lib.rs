//! Stage library for research workflows
//!
//! Prompt-driven text generation, document and web search tools, and the
//! reference read → (summarize ‖ analyze) → report workflow.

mod document;
mod generation;
mod http;
mod prompt;
pub mod research;
mod template;
mod tools;

pub use document::{
    mock_lookup, search_document, search_text, DocumentSearchAction, DocumentSearchTool,
    MOCK_DOCUMENT, MOCK_NOT_FOUND, NO_MATCHES,
};
pub use generation::{GenerateAction, GenerationError, GenerationRequest, TextGenerator};
pub use http::{HttpGenerator, HttpGeneratorConfig, WebSearchTool};
pub use prompt::{raw_text, PromptTemplate};
pub use research::{reference_workflow_spec, research_workflow, ResearchConfig};
pub use template::TemplateAction;
pub use tools::{Tool, ToolError};
use stageruntime::ActionRegistry;

use std::sync::Arc;

/// Register all standard actions with a registry. `generate` stages may name
/// any of `tools`.
pub fn register_all(
    registry: &mut ActionRegistry,
    generator: Arc<dyn TextGenerator>,
    tools: Vec<Arc<dyn Tool>>,
) {
    registry.register(Arc::new(generation::GenerateActionFactory::new(generator, tools)));
    registry.register(Arc::new(template::TemplateActionFactory));
    registry.register(Arc::new(document::DocumentSearchActionFactory));
}
