use async_trait::async_trait;
use thiserror::Error;

/// Capability a text generator may call while producing a stage's output
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Invoke the tool with a JSON object of named arguments
    async fn call(&self, args: serde_json::Value) -> Result<String, ToolError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool failed: {0}")]
    Failed(String),
}

/// Read a required string argument
pub(crate) fn string_arg<'a>(
    args: &'a serde_json::Value,
    name: &str,
) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument '{}'", name)))
}
