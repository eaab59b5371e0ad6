// crates/stagecore/tests/flow_test.rs

use async_trait::async_trait;
use stagecore::{
    action_fn, Action, Composite, CompositeKind, ContextStore, EventBus, ExecutionId, Flow, FlowSpec, InputView,
    Stage, StageContext, StageError, StoreError, ValidationError, Value, REQUEST_KEY,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Returns its fixed text
struct Constant(&'static str);

#[async_trait]
impl Action for Constant {
    fn action_type(&self) -> &str {
        "test.constant"
    }

    async fn execute(&self, _ctx: StageContext) -> Result<Value, StageError> {
        Ok(Value::from(self.0))
    }
}

fn stage(id: &str, reads: &[&str], writes: &str) -> Flow {
    Flow::Stage(Stage::new(id, reads.iter().copied(), writes, Arc::new(Constant("ok"))).unwrap())
}

fn keys(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_store_rejects_second_write() {
    let mut store = ContextStore::new();
    store.set("findings", "first").unwrap();

    let err = store.set("findings", "second").unwrap_err();
    assert_eq!(err, StoreError::DuplicateKey("findings".to_string()));
    assert_eq!(store.get("findings").unwrap().as_str(), Some("first"));
}

#[test]
fn test_store_missing_key() {
    let store = ContextStore::with_request("what is new in quantum computing?");

    assert!(store.contains(REQUEST_KEY));
    assert_eq!(
        store.get("summary").unwrap_err(),
        StoreError::MissingKey("summary".to_string())
    );
}

#[test]
fn test_snapshot_is_frozen() {
    let mut store = ContextStore::new();
    store.set("findings", "X").unwrap();

    let snapshot = store.snapshot();
    store.set("summary", "S").unwrap();

    assert!(snapshot.contains("findings"));
    assert!(!snapshot.contains("summary"));
    assert_eq!(snapshot.len(), 1);

    let mut copy = snapshot.to_store();
    copy.set("analysis", "A").unwrap();
    assert!(!store.contains("analysis"));
}

#[test]
fn test_view_is_restricted_to_declared_keys() {
    let mut store = ContextStore::new();
    store.set("findings", "X").unwrap();
    store.set("secret", "not for you").unwrap();

    let view = store.view(&keys(&["findings"])).unwrap();
    assert_eq!(view.len(), 1);
    assert!(view.get("secret").is_none());
    assert_eq!(view.require_str("findings").unwrap(), "X");

    let err = store.view(&keys(&["findings", "summary"])).unwrap_err();
    assert_eq!(err, StoreError::MissingKey("summary".to_string()));
}

#[test]
fn test_input_view_type_mismatch() {
    let mut values = BTreeMap::new();
    values.insert("count".to_string(), Value::Number(3.0));
    let view = InputView::new(values);

    match view.require_str("count") {
        Err(StageError::InvalidInputType { field, expected, actual }) => {
            assert_eq!(field, "count");
            assert_eq!(expected, "string");
            assert_eq!(actual, "number");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(matches!(view.require("missing"), Err(StageError::MissingInput(_))));
}

#[test]
fn test_merge_keys_copies_only_requested_keys() {
    let mut parent = ContextStore::new();
    parent.set("findings", "X").unwrap();

    let mut child = parent.snapshot().to_store();
    child.set("summary", "S").unwrap();

    parent.merge_keys(&child, &keys(&["summary"])).unwrap();
    assert_eq!(parent.len(), 2);

    let err = parent.merge_keys(&child, &keys(&["summary"])).unwrap_err();
    assert_eq!(err, StoreError::DuplicateKey("summary".to_string()));
}

#[test]
fn test_stage_cannot_read_its_own_output() {
    let err = Stage::new("loop", ["summary"], "summary", Arc::new(Constant("x"))).unwrap_err();
    assert_eq!(
        err,
        ValidationError::SelfDependency {
            stage: "loop".to_string(),
            key: "summary".to_string()
        }
    );
}

#[test]
fn test_parallel_siblings_with_same_write_rejected() {
    let err = Composite::parallel(
        "team",
        vec![
            stage("summarizer", &["findings"], "summary"),
            stage("tech_researcher", &["findings"], "summary"),
        ],
    )
    .unwrap_err();

    assert_eq!(
        err,
        ValidationError::DuplicateWrite {
            key: "summary".to_string(),
            first: "summarizer".to_string(),
            second: "tech_researcher".to_string(),
        }
    );
}

#[test]
fn test_parallel_sibling_dependency_rejected() {
    let err = Composite::parallel(
        "team",
        vec![
            stage("summarizer", &["findings"], "summary"),
            stage("critic", &["summary"], "critique"),
        ],
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ValidationError::SiblingDependency { ref stage, ref key, .. } if stage == "critic" && key == "summary"
    ));
}

#[test]
fn test_nested_duplicate_write_rejected() {
    let inner = Composite::sequential("inner", vec![stage("a", &[], "report")]).unwrap();
    let err = Composite::sequential("outer", vec![inner.into(), stage("b", &[], "report")]).unwrap_err();

    assert!(matches!(err, ValidationError::DuplicateWrite { ref key, .. } if key == "report"));
}

#[test]
fn test_empty_composite_rejected() {
    let err = Composite::parallel("nobody", Vec::new()).unwrap_err();
    assert_eq!(err, ValidationError::EmptyComposite("nobody".to_string()));
}

#[test]
fn test_composite_reads_and_writes() {
    let team = Composite::parallel(
        "team",
        vec![
            stage("summarizer", &["findings"], "summary"),
            stage("tech_researcher", &["findings"], "analysis"),
        ],
    )
    .unwrap();
    let workflow = Flow::from(
        Composite::sequential(
            "workflow",
            vec![
                stage("reader", &["request"], "findings"),
                team.into(),
                stage("aggregator", &["summary", "analysis"], "report"),
            ],
        )
        .unwrap(),
    );

    assert_eq!(workflow.reads(), keys(&["request"]));
    assert_eq!(
        workflow.writes(),
        keys(&["findings", "summary", "analysis", "report"])
    );
    assert_eq!(workflow.stage_count(), 4);
    assert_eq!(workflow.terminal_key(), Some("report"));

    let ids: Vec<&str> = workflow.stages().iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec!["reader", "summarizer", "tech_researcher", "aggregator"]);

    let Flow::Composite(top) = &workflow else {
        panic!("expected composite");
    };
    assert_eq!(top.kind(), CompositeKind::Sequential);
    assert_eq!(top.children()[1].id(), "team");
}

#[test]
fn test_parallel_group_has_no_terminal_key() {
    let team = Flow::from(
        Composite::parallel(
            "team",
            vec![stage("a", &[], "left"), stage("b", &[], "right")],
        )
        .unwrap(),
    );
    assert_eq!(team.terminal_key(), None);
}

#[test]
fn test_describe_outlines_tree() {
    let team = Composite::parallel(
        "team",
        vec![
            stage("summarizer", &["findings"], "summary"),
            stage("tech_researcher", &["findings"], "analysis"),
        ],
    )
    .unwrap();
    let workflow = Flow::from(
        Composite::sequential("workflow", vec![stage("reader", &["request"], "findings"), team.into()])
            .unwrap(),
    );

    assert_eq!(
        workflow.describe(),
        vec![
            "workflow (sequential)",
            "  reader [request] -> findings",
            "  team (parallel)",
            "    summarizer [findings] -> summary",
            "    tech_researcher [findings] -> analysis",
        ]
    );
}

#[test]
fn test_flow_spec_from_json() {
    let json = r#"{
        "kind": "sequential",
        "id": "workflow",
        "children": [
            { "kind": "stage", "id": "reader", "reads": ["request"], "writes": "findings", "action": "template",
              "config": { "template": { "type": "String", "value": "{request}" } } },
            { "kind": "parallel", "id": "team", "children": [
                { "kind": "stage", "id": "summarizer", "reads": ["findings"], "writes": "summary", "action": "template" }
            ] }
        ]
    }"#;

    let spec = FlowSpec::from_json(json).unwrap();
    assert_eq!(spec.id(), "workflow");

    let FlowSpec::Sequential { children, .. } = &spec else {
        panic!("expected sequential spec");
    };
    let FlowSpec::Stage(reader) = &children[0] else {
        panic!("expected stage spec");
    };
    assert_eq!(reader.writes, "findings");
    assert_eq!(reader.config["template"].as_str(), Some("{request}"));
    assert!(matches!(children[1], FlowSpec::Parallel { .. }));
}

#[test]
fn test_value_renders_as_prompt_text() {
    assert_eq!(Value::from("plain").to_text(), "plain");
    assert_eq!(Value::Null.to_text(), "");
    assert_eq!(
        Value::Array(vec![Value::from("a"), Value::from("b")]).to_text(),
        "a\nb"
    );
}

#[tokio::test]
async fn test_emitter_reports_stage_events() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let execution_id = ExecutionId::new_v4();

    let ctx = StageContext::new("reader", InputView::default(), bus.create_emitter(execution_id, "reader"));
    assert_eq!(ctx.execution_id, execution_id);
    ctx.events.info("searching");

    match events.recv().await.unwrap() {
        stagecore::ExecutionEvent::StageEvent { stage_id, event, .. } => {
            assert_eq!(stage_id, "reader");
            assert!(matches!(event, stagecore::StageEvent::Info { ref message } if message == "searching"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_closure_action() {
    let action = action_fn(|ctx: StageContext| async move {
        let request = ctx.require_str(REQUEST_KEY)?.to_uppercase();
        Ok::<Value, StageError>(Value::from(request))
    });
    assert_eq!(action.action_type(), "fn");
    assert!(action.required_inputs().is_empty());

    let mut values = BTreeMap::new();
    values.insert(REQUEST_KEY.to_string(), Value::from("qubits"));
    let bus = EventBus::new(4);
    let ctx = StageContext::new("shout", InputView::new(values), bus.create_emitter(ExecutionId::new_v4(), "shout"));
    assert_eq!(action.execute(ctx).await.unwrap().as_str(), Some("QUBITS"));

    let ctx = StageContext::new("shout", InputView::default(), bus.create_emitter(ExecutionId::new_v4(), "shout"));
    assert!(matches!(action.execute(ctx).await, Err(StageError::MissingInput(_))));
}

#[test]
fn test_store_seeded_from_json() {
    let seed: std::collections::HashMap<String, Value> = serde_json::from_str(
        r#"{
            "request": { "type": "String", "value": "quantum" },
            "filters": { "type": "Json", "value": { "year": 2024 } }
        }"#,
    )
    .unwrap();
    let store = ContextStore::from(seed);

    let mut entries: Vec<(&str, String)> = store.iter().map(|(k, v)| (k, v.to_text())).collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![("filters", r#"{"year":2024}"#.to_string()), ("request", "quantum".to_string())]
    );
    assert_eq!(
        store.get("filters").unwrap(),
        &Value::from(serde_json::json!({ "year": 2024 }))
    );
}
