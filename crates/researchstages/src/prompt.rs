//! Instruction templates rendered with minijinja.
//!
//! `{{ key }}` inserts the stage input `key` as prompt text. Every top-level
//! variable a template references is a required input of its stage, and
//! rendering is strict: an unknown variable is an error, never blank text.

use minijinja::{Environment, UndefinedBehavior};
use stagecore::{InputView, StageError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    variables: Vec<String>,
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env
}

impl PromptTemplate {
    /// Compile `source` once to reject syntax errors and collect its variables
    pub fn parse(source: &str) -> Result<Self, StageError> {
        let env = environment();
        let template = env
            .template_from_str(source)
            .map_err(|e| StageError::Configuration(format!("Invalid template: {}", e)))?;

        let mut variables: Vec<String> = template.undeclared_variables(false).into_iter().collect();
        variables.sort();

        Ok(Self {
            source: source.to_string(),
            variables,
        })
    }

    /// Variable names the template reads, sorted
    pub fn placeholders(&self) -> Vec<String> {
        self.variables.clone()
    }

    pub fn render(&self, inputs: &InputView) -> Result<String, StageError> {
        let mut context = BTreeMap::new();
        for name in &self.variables {
            context.insert(name.as_str(), inputs.require(name)?.to_text());
        }

        environment()
            .render_str(&self.source, context)
            .map_err(|e| StageError::ExecutionFailed(format!("Template rendering failed: {}", e)))
    }
}

/// Wrap literal text so the template engine emits it unchanged
pub fn raw_text(text: &str) -> String {
    format!("{{% raw %}}{}{{% endraw %}}", text)
}
