use crate::prompt::PromptTemplate;
use crate::tools::Tool;
use async_trait::async_trait;
use stagecore::{Action, StageContext, StageError, Value};
use stageruntime::{ActionFactory, ActionMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Backend that turns a prompt into text. Retries, model choice and the
/// tool-calling protocol are the backend's business.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// One prompt execution on behalf of a stage
#[derive(Clone)]
pub struct GenerationRequest {
    pub stage_id: String,
    pub prompt: String,
    pub tools: Vec<Arc<dyn Tool>>,
}

impl GenerationRequest {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Stage action that renders an instruction from its inputs and asks the
/// generator for the output text
pub struct GenerateAction {
    template: PromptTemplate,
    generator: Arc<dyn TextGenerator>,
    tools: Vec<Arc<dyn Tool>>,
}

impl GenerateAction {
    pub fn new(
        instruction: &str,
        generator: Arc<dyn TextGenerator>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<Self, StageError> {
        Ok(Self {
            template: PromptTemplate::parse(instruction)?,
            generator,
            tools,
        })
    }
}

#[async_trait]
impl Action for GenerateAction {
    fn action_type(&self) -> &str {
        "generate"
    }

    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        let prompt = self.template.render(&ctx.inputs)?;
        ctx.events.info(format!(
            "Generating with {} prompt chars and {} tool(s)",
            prompt.len(),
            self.tools.len()
        ));

        let request = GenerationRequest {
            stage_id: ctx.stage_id.clone(),
            prompt,
            tools: self.tools.clone(),
        };

        let text = self
            .generator
            .generate(request)
            .await
            .map_err(|e| StageError::Generation(e.to_string()))?;

        Ok(Value::String(text))
    }

    fn required_inputs(&self) -> Vec<String> {
        self.template.placeholders()
    }
}

/// Builds `generate` actions. Config: `instruction` (string, required) and
/// `tools` (array of tool names known to the factory).
pub struct GenerateActionFactory {
    generator: Arc<dyn TextGenerator>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl GenerateActionFactory {
    pub fn new(generator: Arc<dyn TextGenerator>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            generator,
            tools: tools
                .into_iter()
                .map(|tool| (tool.name().to_string(), tool))
                .collect(),
        }
    }
}

impl ActionFactory for GenerateActionFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Action>, StageError> {
        let instruction = config
            .get("instruction")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StageError::Configuration("Missing config: instruction".to_string()))?;

        let mut tools = Vec::new();
        if let Some(names) = config.get("tools") {
            let names = names.as_array().ok_or_else(|| StageError::InvalidInputType {
                field: "tools".to_string(),
                expected: "array".to_string(),
                actual: names.type_name().to_string(),
            })?;
            for name in names {
                let name = name.as_str().ok_or_else(|| {
                    StageError::Configuration("Tool names must be strings".to_string())
                })?;
                let tool = self
                    .tools
                    .get(name)
                    .ok_or_else(|| StageError::Configuration(format!("Unknown tool: {}", name)))?;
                tools.push(Arc::clone(tool));
            }
        }

        Ok(Arc::new(GenerateAction::new(
            instruction,
            Arc::clone(&self.generator),
            tools,
        )?))
    }

    fn action_type(&self) -> &str {
        "generate"
    }

    fn metadata(&self) -> ActionMetadata {
        ActionMetadata {
            description: "Render an instruction from inputs and generate text".to_string(),
            category: "generation".to_string(),
        }
    }
}
