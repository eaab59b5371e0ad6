use crate::generation::{GenerationError, GenerationRequest, TextGenerator};
use crate::tools::{string_arg, Tool, ToolError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGeneratorConfig {
    /// URL receiving `POST {"stage", "prompt", "tools"}` and answering `{"text"}`
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl HttpGeneratorConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    stage: &'a str,
    prompt: &'a str,
    tools: Vec<ToolDescriptor<'a>>,
}

#[derive(Debug, Serialize)]
struct ToolDescriptor<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Text generator backed by a JSON HTTP endpoint. No retries.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GenerationError::Request(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let body = GenerateBody {
            stage: &request.stage_id,
            prompt: &request.prompt,
            tools: request
                .tools
                .iter()
                .map(|tool| ToolDescriptor {
                    name: tool.name(),
                    description: tool.description(),
                })
                .collect(),
        };

        tracing::debug!(
            stage_id = %request.stage_id,
            endpoint = %self.endpoint,
            "POST generation request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            GenerationError::InvalidResponse(format!("Failed to read response: {}", e))
        })?;

        Ok(parsed.text)
    }
}

/// Web search over HTTP: `GET <endpoint>?q=<query>`, answering with the body text
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    pub const NAME: &'static str = "web_search";

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Searches the web and returns result text"
    }

    async fn call(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let query = string_arg(&args, "query")?;

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ToolError::Failed(format!(
                "Search returned status {}",
                status.as_u16()
            )));
        }
        Ok(body)
    }
}
