use stagecore::{
    Action, Composite, Flow, FlowSpec, Stage, StageError, StageSpec, ValidationError, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating actions from stage configuration
pub trait ActionFactory: Send + Sync {
    /// Create a new action with given configuration
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Action>, StageError>;

    /// Get action type identifier
    fn action_type(&self) -> &str;

    /// Optional: Get action metadata (description, category)
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::default()
    }
}

/// Metadata about an action type
#[derive(Debug, Clone)]
pub struct ActionMetadata {
    pub description: String,
    pub category: String,
}

impl Default for ActionMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available action types
pub struct ActionRegistry {
    factories: HashMap<String, Arc<dyn ActionFactory>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register an action factory
    pub fn register(&mut self, factory: Arc<dyn ActionFactory>) {
        let action_type = factory.action_type().to_string();
        tracing::info!("Registering action type: {}", action_type);
        self.factories.insert(action_type, factory);
    }

    /// Create an action from an action type and config
    pub fn create_action(
        &self,
        action_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn Action>, ValidationError> {
        let factory = self
            .factories
            .get(action_type)
            .ok_or_else(|| ValidationError::UnknownActionType(action_type.to_string()))?;

        factory.create(config).map_err(|e| {
            ValidationError::InvalidDefinition(format!(
                "Failed to create '{}' action: {}",
                action_type, e
            ))
        })
    }

    /// Turn a serializable definition into an executable flow tree.
    /// Composite construction checks run here, so a bad definition fails
    /// before any runtime sees it.
    pub fn build_flow(&self, spec: &FlowSpec) -> Result<Flow, ValidationError> {
        match spec {
            FlowSpec::Stage(stage) => Ok(Flow::Stage(self.build_stage(stage)?)),
            FlowSpec::Sequential { id, children } => {
                let children = self.build_children(children)?;
                Ok(Flow::Composite(Composite::sequential(id.clone(), children)?))
            }
            FlowSpec::Parallel { id, children } => {
                let children = self.build_children(children)?;
                Ok(Flow::Composite(Composite::parallel(id.clone(), children)?))
            }
        }
    }

    fn build_children(&self, children: &[FlowSpec]) -> Result<Vec<Flow>, ValidationError> {
        children.iter().map(|child| self.build_flow(child)).collect()
    }

    fn build_stage(&self, spec: &StageSpec) -> Result<Stage, ValidationError> {
        let action = self.create_action(&spec.action, &spec.config)?;
        Stage::new(spec.id.clone(), spec.reads.iter().cloned(), spec.writes.clone(), action)
    }

    /// Get all registered action types, sorted
    pub fn list_action_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for an action type
    pub fn get_metadata(&self, action_type: &str) -> Option<ActionMetadata> {
        self.factories.get(action_type).map(|f| f.metadata())
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
