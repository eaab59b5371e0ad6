use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use stagecore::{Action, StageContext, StageError, Value};
use stageruntime::{ActionFactory, ActionMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Render a template from inputs and emit the text as-is
pub struct TemplateAction {
    template: PromptTemplate,
}

impl TemplateAction {
    pub fn new(template: &str) -> Result<Self, StageError> {
        Ok(Self {
            template: PromptTemplate::parse(template)?,
        })
    }
}

#[async_trait]
impl Action for TemplateAction {
    fn action_type(&self) -> &str {
        "template"
    }

    async fn execute(&self, ctx: StageContext) -> Result<Value, StageError> {
        let text = self.template.render(&ctx.inputs)?;
        Ok(Value::String(text))
    }

    fn required_inputs(&self) -> Vec<String> {
        self.template.placeholders()
    }
}

pub struct TemplateActionFactory;

impl ActionFactory for TemplateActionFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Action>, StageError> {
        let template = config
            .get("template")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StageError::Configuration("Missing config: template".to_string()))?;

        Ok(Arc::new(TemplateAction::new(template)?))
    }

    fn action_type(&self) -> &str {
        "template"
    }

    fn metadata(&self) -> ActionMetadata {
        ActionMetadata {
            description: "Fill a text template from inputs".to_string(),
            category: "transform".to_string(),
        }
    }
}
