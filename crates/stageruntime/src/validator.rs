use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use stagecore::{CompositeKind, Flow, Stage, ValidationError};
use std::collections::{BTreeSet, HashMap};

/// Writer name recorded for keys already present before the run starts
const INITIAL_CONTEXT: &str = "<initial context>";

/// Dependency edge between two stages through a context key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub key: String,
}

/// Outcome of validating a flow against the keys of an initial context
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Stage ids in an order that respects every data dependency
    pub stage_order: Vec<String>,
    pub edges: Vec<DependencyEdge>,
}

/// Validate a whole flow tree before anything runs.
///
/// Checks that no key is written twice (nor overwrites an initial key),
/// that every stage's reads are produced by the initial context or an
/// earlier step in scope, that each action only requires declared reads,
/// and that the stage dependency graph is acyclic.
pub fn validate(
    flow: &Flow,
    initial_keys: &BTreeSet<String>,
) -> Result<ExecutionPlan, ValidationError> {
    let mut writers: HashMap<String, String> = initial_keys
        .iter()
        .map(|key| (key.clone(), INITIAL_CONTEXT.to_string()))
        .collect();
    let mut available = initial_keys.clone();

    let mut seen = BTreeSet::new();
    for stage in flow.stages() {
        if !seen.insert(stage.id()) {
            return Err(ValidationError::DuplicateStageId(stage.id().to_string()));
        }
    }

    check_scope(flow, &mut available, &mut writers)?;

    let graph = build_graph(flow, &writers);
    let order = toposort(&graph, None).map_err(|_| ValidationError::CyclicDependency)?;

    let edges = graph
        .edge_indices()
        .filter_map(|edge| {
            let (from, to) = graph.edge_endpoints(edge)?;
            Some(DependencyEdge {
                from: graph[from].clone(),
                to: graph[to].clone(),
                key: graph[edge].clone(),
            })
        })
        .collect();

    Ok(ExecutionPlan {
        stage_order: order.into_iter().map(|idx| graph[idx].clone()).collect(),
        edges,
    })
}

/// Walk the tree in execution order, threading the set of keys that will be
/// available at each point.
fn check_scope(
    flow: &Flow,
    available: &mut BTreeSet<String>,
    writers: &mut HashMap<String, String>,
) -> Result<(), ValidationError> {
    match flow {
        Flow::Stage(stage) => {
            check_stage(stage, available, writers)?;
            available.insert(stage.writes().to_string());
            Ok(())
        }
        Flow::Composite(composite) => match composite.kind() {
            CompositeKind::Sequential => {
                for child in composite.children() {
                    check_scope(child, available, writers)?;
                }
                Ok(())
            }
            CompositeKind::Parallel => {
                let before_fan_out = available.clone();
                for child in composite.children() {
                    let mut child_scope = before_fan_out.clone();
                    check_scope(child, &mut child_scope, writers)?;
                    available.extend(child_scope);
                }
                Ok(())
            }
        },
    }
}

fn check_stage(
    stage: &Stage,
    available: &BTreeSet<String>,
    writers: &mut HashMap<String, String>,
) -> Result<(), ValidationError> {
    for key in stage.reads() {
        if !available.contains(key) {
            return Err(ValidationError::UnresolvedDependency {
                stage: stage.id().to_string(),
                key: key.clone(),
            });
        }
    }

    for key in stage.action().required_inputs() {
        if !stage.reads().contains(&key) {
            return Err(ValidationError::UndeclaredInput {
                stage: stage.id().to_string(),
                key,
            });
        }
    }

    if let Some(first) = writers.get(stage.writes()) {
        return Err(ValidationError::DuplicateWrite {
            key: stage.writes().to_string(),
            first: first.clone(),
            second: stage.id().to_string(),
        });
    }
    writers.insert(stage.writes().to_string(), stage.id().to_string());

    Ok(())
}

/// Stage-level graph: an edge from the producer of a key to each consumer
fn build_graph(flow: &Flow, writers: &HashMap<String, String>) -> DiGraph<String, String> {
    let mut graph = DiGraph::new();
    let mut stage_to_index: HashMap<String, NodeIndex> = HashMap::new();

    let stages = flow.stages();
    for stage in &stages {
        let idx = graph.add_node(stage.id().to_string());
        stage_to_index.insert(stage.id().to_string(), idx);
    }

    for stage in &stages {
        for key in stage.reads() {
            let producer = writers
                .get(key)
                .and_then(|writer| stage_to_index.get(writer));
            if let (Some(from), Some(to)) = (producer, stage_to_index.get(stage.id())) {
                graph.add_edge(*from, *to, key.clone());
            }
        }
    }

    graph
}
