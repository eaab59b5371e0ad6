//! Keyword search over a document's text.
//!
//! When the document does not exist the search answers from a small fixed
//! table so workflows can be exercised without a real document. That
//! fallback is deterministic: the same query always yields the same text.

use crate::tools::{string_arg, Tool, ToolError};
use async_trait::async_trait;
use stagecore::{Action, StageContext, StageError, Value};
use stageruntime::{ActionFactory, ActionMetadata};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fixed lookup used when the document cannot be found. Scanned in order;
/// the first key contained in the lowercased query wins.
pub const MOCK_DOCUMENT: &[(&str, &str)] = &[
    (
        "quantum",
        "Quantum computing uses qubits to perform calculations exponentially faster than classical bits.",
    ),
    (
        "ai",
        "Artificial Intelligence agents can perceive their environment and take actions to achieve goals.",
    ),
    (
        "climate",
        "Climate change mitigation requires a transition to renewable energy sources.",
    ),
];

pub const MOCK_NOT_FOUND: &str = "No information found in the mock document.";
pub const NO_MATCHES: &str = "No specific matches found in the document.";

const MAX_SNIPPETS: usize = 3;
const SNIPPET_SEPARATOR: &str = "\n---\n";

/// Search `path` for paragraphs mentioning `query` (case-insensitive)
pub async fn search_document(path: &Path, query: &str) -> String {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        tracing::warn!(path = %path.display(), "Document not found, using mock document");
        return mock_lookup(query);
    }

    match tokio::fs::read_to_string(path).await {
        Ok(text) => search_text(&text, query),
        Err(e) => format!("Error reading document: {}", e),
    }
}

/// Paragraphs are separated by a blank line
pub fn search_text(text: &str, query: &str) -> String {
    let needle = query.to_lowercase();
    let matches: Vec<&str> = text
        .split("\n\n")
        .filter(|paragraph| paragraph.to_lowercase().contains(&needle))
        .take(MAX_SNIPPETS)
        .collect();

    if matches.is_empty() {
        NO_MATCHES.to_string()
    } else {
        matches.join(SNIPPET_SEPARATOR)
    }
}

pub fn mock_lookup(query: &str) -> String {
    let needle = query.to_lowercase();
    MOCK_DOCUMENT
        .iter()
        .find(|(key, _)| needle.contains(*key))
        .map(|(_, text)| format!("Found in mock document: {}", text))
        .unwrap_or_else(|| MOCK_NOT_FOUND.to_string())
}

/// Tool form of [`search_document`], callable by a text generator.
///
/// Arguments: `query` (required) and `file_path` (falls back to the
/// document the tool was created with).
pub struct DocumentSearchTool {
    default_path: Option<PathBuf>,
}

impl DocumentSearchTool {
    pub const NAME: &'static str = "search_document";

    pub fn new() -> Self {
        Self { default_path: None }
    }

    pub fn for_document(path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: Some(path.into()),
        }
    }
}

impl Default for DocumentSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Searches a document for keywords and returns the matching text snippets"
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let query = string_arg(&args, "query")?;
        let path = match args.get("file_path").and_then(|v| v.as_str()) {
            Some(path) => PathBuf::from(path),
            None => self.default_path.clone().ok_or_else(|| {
                ToolError::InvalidArguments("missing string argument 'file_path'".to_string())
            })?,
        };

        tracing::debug!(path = %path.display(), query, "Searching document");
        Ok(search_document(&path, query).await)
    }
}

/// Stage action that searches a fixed document with a query read from the
/// context, without involving a text generator
pub struct DocumentSearchAction {
    path: PathBuf,
    query_key: String,
}

impl DocumentSearchAction {
    pub fn new(path: impl Into<PathBuf>, query_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query_key: query_key.into(),
        }
    }
}

#[async_trait]
impl Action for DocumentSearchAction {
    fn action_type(&self) -> &str {
        "document.search"
    }

    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        let query = ctx.require_str(&self.query_key)?;
        ctx.events.info(format!("Searching '{}' for: '{}'", self.path.display(), query));

        let result = search_document(&self.path, query).await;
        if result == NO_MATCHES || result == MOCK_NOT_FOUND {
            ctx.events.warn(format!("Nothing found for '{}'", query));
        }
        Ok(Value::String(result))
    }

    fn required_inputs(&self) -> Vec<String> {
        vec![self.query_key.clone()]
    }
}

pub struct DocumentSearchActionFactory;

impl ActionFactory for DocumentSearchActionFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Action>, StageError> {
        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StageError::Configuration("Missing config: path".to_string()))?;
        let query_key = config
            .get("query_key")
            .and_then(|v| v.as_str())
            .unwrap_or(stagecore::REQUEST_KEY);

        Ok(Arc::new(DocumentSearchAction::new(path, query_key)))
    }

    fn action_type(&self) -> &str {
        "document.search"
    }

    fn metadata(&self) -> ActionMetadata {
        ActionMetadata {
            description: "Search a document for paragraphs matching a query".to_string(),
            category: "document".to_string(),
        }
    }
}
