use crate::{Stage, ValidationError, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeKind {
    Sequential,
    Parallel,
}

impl CompositeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeKind::Sequential => "sequential",
            CompositeKind::Parallel => "parallel",
        }
    }
}

/// Ordered group of flows run one after another or concurrently
#[derive(Debug, Clone)]
pub struct Composite {
    id: String,
    kind: CompositeKind,
    children: Vec<Flow>,
}

impl Composite {
    pub fn sequential(id: impl Into<String>, children: Vec<Flow>) -> Result<Self, ValidationError> {
        Self::new(id, CompositeKind::Sequential, children)
    }

    /// Parallel children must write disjoint keys and must not read each
    /// other's outputs.
    pub fn parallel(id: impl Into<String>, children: Vec<Flow>) -> Result<Self, ValidationError> {
        Self::new(id, CompositeKind::Parallel, children)
    }

    pub fn new(
        id: impl Into<String>,
        kind: CompositeKind,
        children: Vec<Flow>,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if children.is_empty() {
            return Err(ValidationError::EmptyComposite(id));
        }

        let mut writers: HashMap<String, String> = HashMap::new();
        for child in &children {
            for (key, stage) in child.writers() {
                if let Some(first) = writers.get(&key) {
                    return Err(ValidationError::DuplicateWrite {
                        key,
                        first: first.clone(),
                        second: stage,
                    });
                }
                writers.insert(key, stage);
            }
        }

        if kind == CompositeKind::Parallel {
            for (i, child) in children.iter().enumerate() {
                let sibling_writes: BTreeSet<String> = children
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .flat_map(|(_, sibling)| sibling.writes())
                    .collect();

                if let Some(key) = child.reads().intersection(&sibling_writes).next() {
                    return Err(ValidationError::SiblingDependency {
                        composite: id,
                        stage: child.id().to_string(),
                        key: key.clone(),
                    });
                }
            }
        }

        Ok(Self { id, kind, children })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CompositeKind {
        self.kind
    }

    pub fn children(&self) -> &[Flow] {
        &self.children
    }
}

/// Uniform node of a workflow tree
#[derive(Debug, Clone)]
pub enum Flow {
    Stage(Stage),
    Composite(Composite),
}

impl Flow {
    pub fn id(&self) -> &str {
        match self {
            Flow::Stage(stage) => stage.id(),
            Flow::Composite(composite) => composite.id(),
        }
    }

    /// Keys this flow needs from outside itself.
    ///
    /// For a sequential composite, reads satisfied by an earlier sibling
    /// are not part of the composite's own reads.
    pub fn reads(&self) -> BTreeSet<String> {
        match self {
            Flow::Stage(stage) => stage.reads().clone(),
            Flow::Composite(composite) => match composite.kind {
                CompositeKind::Parallel => composite
                    .children
                    .iter()
                    .flat_map(|child| child.reads())
                    .collect(),
                CompositeKind::Sequential => {
                    let mut produced = BTreeSet::new();
                    let mut reads = BTreeSet::new();
                    for child in &composite.children {
                        reads.extend(child.reads().difference(&produced).cloned());
                        produced.extend(child.writes());
                    }
                    reads
                }
            },
        }
    }

    /// Every key written by this flow or its descendants
    pub fn writes(&self) -> BTreeSet<String> {
        self.writers().into_iter().map(|(key, _)| key).collect()
    }

    /// `(key, stage id)` for every descendant stage, in declared order
    pub fn writers(&self) -> Vec<(String, String)> {
        self.stages()
            .into_iter()
            .map(|stage| (stage.writes().to_string(), stage.id().to_string()))
            .collect()
    }

    /// Descendant stages in declared order
    pub fn stages(&self) -> Vec<&Stage> {
        match self {
            Flow::Stage(stage) => vec![stage],
            Flow::Composite(composite) => composite
                .children
                .iter()
                .flat_map(|child| child.stages())
                .collect(),
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages().len()
    }

    /// Key holding the flow's final result: the output of the last step.
    /// A parallel group with several children has no single terminal key.
    pub fn terminal_key(&self) -> Option<&str> {
        match self {
            Flow::Stage(stage) => Some(stage.writes()),
            Flow::Composite(composite) => match (composite.kind, composite.children.as_slice()) {
                (_, [only]) => only.terminal_key(),
                (CompositeKind::Sequential, [.., last]) => last.terminal_key(),
                _ => None,
            },
        }
    }

    /// Human-readable outline of the tree, one line per node
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.describe_into(0, &mut lines);
        lines
    }

    fn describe_into(&self, depth: usize, lines: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        match self {
            Flow::Stage(stage) => {
                let reads: Vec<&str> = stage.reads().iter().map(String::as_str).collect();
                lines.push(format!(
                    "{}{} [{}] -> {}",
                    indent,
                    stage.id(),
                    reads.join(", "),
                    stage.writes()
                ));
            }
            Flow::Composite(composite) => {
                lines.push(format!("{}{} ({})", indent, composite.id, composite.kind.as_str()));
                for child in &composite.children {
                    child.describe_into(depth + 1, lines);
                }
            }
        }
    }
}

impl From<Stage> for Flow {
    fn from(stage: Stage) -> Self {
        Flow::Stage(stage)
    }
}

impl From<Composite> for Flow {
    fn from(composite: Composite) -> Self {
        Flow::Composite(composite)
    }
}

/// Serializable flow definition; stages name an action type that a
/// registry turns into an executable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowSpec {
    Stage(StageSpec),
    Sequential { id: String, children: Vec<FlowSpec> },
    Parallel { id: String, children: Vec<FlowSpec> },
}

impl FlowSpec {
    pub fn id(&self) -> &str {
        match self {
            FlowSpec::Stage(stage) => &stage.id,
            FlowSpec::Sequential { id, .. } | FlowSpec::Parallel { id, .. } => id,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSpec {
    pub id: String,
    #[serde(default)]
    pub reads: Vec<String>,
    pub writes: String,
    pub action: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl StageSpec {
    pub fn new(
        id: impl Into<String>,
        action: impl Into<String>,
        writes: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            reads: Vec::new(),
            writes: writes.into(),
            action: action.into(),
            config: HashMap::new(),
        }
    }

    pub fn with_reads<I, S>(mut self, reads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads = reads.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}
