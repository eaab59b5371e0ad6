// crates/researchstages/tests/document_test.rs

use researchstages::{
    mock_lookup, search_document, search_text, DocumentSearchAction, DocumentSearchTool, Tool, ToolError,
    MOCK_NOT_FOUND, NO_MATCHES,
};
use serde_json::json;
use stagecore::{
    Action, EventBus, ExecutionEvent, ExecutionId, InputView, StageContext, StageEvent, Value,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

fn missing_document(dir: &TempDir) -> PathBuf {
    dir.path().join("no_such_document.txt")
}

fn document_with(paragraphs: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", paragraphs.join("\n\n")).unwrap();
    file
}

#[tokio::test]
async fn test_missing_document_falls_back_to_mock() {
    let dir = TempDir::new().unwrap();
    let result = search_document(&missing_document(&dir), "quantum").await;

    assert!(result.starts_with("Found in mock document: "));
    assert!(result.to_lowercase().contains("quantum"));
}

#[tokio::test]
async fn test_mock_fallback_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = missing_document(&dir);

    let first = search_document(&path, "Tell me about Quantum error correction").await;
    let second = search_document(&path, "Tell me about Quantum error correction").await;
    assert_eq!(first, second);
}

#[test]
fn test_mock_lookup_is_case_insensitive_substring_match() {
    assert!(mock_lookup("CLIMATE policy").contains("renewable energy"));
    assert!(mock_lookup("what are ai agents?").contains("Artificial Intelligence"));
    assert_eq!(mock_lookup("medieval poetry"), MOCK_NOT_FOUND);
}

#[test]
fn test_mock_lookup_first_entry_wins() {
    // "ai" is scanned before "climate", and "maintain" contains "ai"
    let result = mock_lookup("how to maintain climate targets");
    assert!(result.contains("Artificial Intelligence"));

    let result = mock_lookup("quantum ai");
    assert!(result.contains("qubits"));
}

#[tokio::test]
async fn test_real_document_returns_matching_paragraphs() {
    let file = document_with(&[
        "Introduction to transformers.",
        "Attention is computed over all tokens.",
        "Results show sparse ATTENTION helps.",
        "Unrelated closing remarks.",
    ]);

    let result = search_document(file.path(), "attention").await;
    assert_eq!(
        result,
        "Attention is computed over all tokens.\n---\nResults show sparse ATTENTION helps."
    );
}

#[test]
fn test_search_text_caps_snippets() {
    let text = ["graph one", "graph two", "graph three", "graph four"].join("\n\n");
    let result = search_text(&text, "GRAPH");

    assert_eq!(result.split("\n---\n").count(), 3);
    assert!(!result.contains("graph four"));
}

#[test]
fn test_search_text_without_matches() {
    assert_eq!(search_text("nothing relevant here", "quantum"), NO_MATCHES);
}

#[tokio::test]
async fn test_tool_uses_default_document() {
    let file = document_with(&["Qubits decohere.", "Classical bits do not."]);
    let tool = DocumentSearchTool::for_document(file.path());

    assert_eq!(tool.name(), "search_document");
    let result = tool.call(json!({ "query": "qubits" })).await.unwrap();
    assert_eq!(result, "Qubits decohere.");
}

#[tokio::test]
async fn test_tool_argument_errors() {
    let tool = DocumentSearchTool::new();

    let err = tool.call(json!({ "file_path": "doc.txt" })).await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidArguments(_)));

    let err = tool.call(json!({ "query": "quantum" })).await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidArguments(ref msg) if msg.contains("file_path")));
}

#[tokio::test]
async fn test_search_action_reads_query_from_inputs() {
    let dir = TempDir::new().unwrap();
    let action = DocumentSearchAction::new(missing_document(&dir), "request");
    assert_eq!(action.required_inputs(), vec!["request".to_string()]);

    let mut inputs = BTreeMap::new();
    inputs.insert("request".to_string(), Value::from("climate"));
    let bus = EventBus::new(8);
    let ctx = StageContext::new(
        "reader",
        InputView::new(inputs),
        bus.create_emitter(ExecutionId::new_v4(), "reader"),
    );

    let value = action.execute(ctx).await.unwrap();
    assert_eq!(
        value.as_str(),
        Some("Found in mock document: Climate change mitigation requires a transition to renewable energy sources.")
    );
}

#[tokio::test]
async fn test_search_action_warns_when_nothing_found() {
    let dir = TempDir::new().unwrap();
    let action = DocumentSearchAction::new(missing_document(&dir), "request");

    let mut inputs = BTreeMap::new();
    inputs.insert("request".to_string(), Value::from("medieval poetry"));
    let bus = EventBus::new(8);
    let mut events = bus.subscribe();
    let ctx = StageContext::new(
        "reader",
        InputView::new(inputs),
        bus.create_emitter(ExecutionId::new_v4(), "reader"),
    );

    let value = action.execute(ctx).await.unwrap();
    assert_eq!(value.as_str(), Some(MOCK_NOT_FOUND));

    let mut warnings = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::StageEvent {
            event: StageEvent::Warning { message },
            ..
        } = event
        {
            warnings.push(message);
        }
    }
    assert_eq!(warnings, vec!["Nothing found for 'medieval poetry'".to_string()]);
}
