//! The reference research workflow.
//!
//! ```text
//! research_workflow (sequential)
//!   document_reader [request] -> doc_findings
//!   research_team (parallel)
//!     summarizer [doc_findings] -> summary
//!     tech_researcher [doc_findings] -> analysis
//!   aggregator [analysis, summary] -> report
//! ```

use crate::document::DocumentSearchTool;
use crate::generation::TextGenerator;
use crate::http::WebSearchTool;
use crate::prompt::raw_text;
use crate::tools::Tool;
use serde::{Deserialize, Serialize};
use stagecore::{Flow, FlowSpec, StageSpec, ValidationError, Value, REQUEST_KEY};
use stageruntime::ActionRegistry;
use std::path::PathBuf;
use std::sync::Arc;

pub const DOC_FINDINGS_KEY: &str = "doc_findings";
pub const SUMMARY_KEY: &str = "summary";
pub const ANALYSIS_KEY: &str = "analysis";
pub const REPORT_KEY: &str = "report";

pub const WORKFLOW_ID: &str = "research_workflow";
pub const RESEARCH_TEAM_ID: &str = "research_team";
pub const DOCUMENT_READER_ID: &str = "document_reader";
pub const SUMMARIZER_ID: &str = "summarizer";
pub const TECH_RESEARCHER_ID: &str = "tech_researcher";
pub const AGGREGATOR_ID: &str = "aggregator";

const SUMMARIZER_INSTRUCTION: &str = "You are an expert scientific paper analyst.
Read the research paper content provided: {{ doc_findings }}

Create a comprehensive summary that includes:
1. **Main Topic**: What is the paper about?
2. **Key Contributions**: What are the novel contributions and innovations?
3. **Methodology**: What approaches or methods were used?
4. **Results/Findings**: What were the main outcomes?

Keep the summary clear, structured, and under 200 words.
If the findings are empty, state that no information was found.";

const TECH_RESEARCHER_INSTRUCTION: &str = "You are a senior research analyst.
Input: {{ doc_findings }}

1. Extract the paper's **main technical focus**, research problem, and method.
2. Evaluate the paper technically:
   - What is innovative?
   - What is weak or missing?
   - What assumptions does it make?
   - Possible real-world applications?
3. If a web search tool is available, find recent work, breakthroughs, or criticisms on the same topic.
   Prefer scholarly or technical sources.
4. Produce a concise synthesis (max 100 words):
   - Technical evaluation of the paper
   - How recent research trends compare with, validate or challenge it
   - Missing gaps or future directions

Your output must be factual, technical, and short.";

const AGGREGATOR_INSTRUCTION: &str = "You are a research synthesis expert.
Input:
1. Summary of the document: {{ summary }}
2. Technical analysis of the document: {{ analysis }}

Combine these inputs into a single, coherent research report. Ensure the report is clear, concise, and well-structured.";

/// Settings for the reference workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Document the reader stage searches
    pub document_path: PathBuf,
    /// Web search endpoint for the technical researcher; no web search if unset
    pub search_endpoint: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("document.txt"),
            search_endpoint: None,
        }
    }
}

fn document_reader_instruction(config: &ResearchConfig) -> String {
    format!(
        "You are an expert document researcher.
Your job is to use the `{tool}` tool to find specific information in the document `{path}` based on the user's request.
Always cite the specific text segments you found.

User request: {{{{ {request} }}}}",
        tool = DocumentSearchTool::NAME,
        path = raw_text(&config.document_path.display().to_string()),
        request = REQUEST_KEY,
    )
}

fn generate_stage(
    id: &str,
    reads: &[&str],
    writes: &str,
    instruction: String,
    tools: &[&str],
) -> FlowSpec {
    let mut stage = StageSpec::new(id, "generate", writes)
        .with_reads(reads.iter().copied())
        .with_config("instruction", instruction);

    if !tools.is_empty() {
        let names: Vec<Value> = tools.iter().map(|name| Value::from(*name)).collect();
        stage = stage.with_config("tools", names);
    }
    FlowSpec::Stage(stage)
}

/// Serializable definition of the reference workflow
pub fn reference_workflow_spec(config: &ResearchConfig) -> FlowSpec {
    let researcher_tools: &[&str] = if config.search_endpoint.is_some() {
        &[WebSearchTool::NAME]
    } else {
        &[]
    };

    FlowSpec::Sequential {
        id: WORKFLOW_ID.to_string(),
        children: vec![
            generate_stage(
                DOCUMENT_READER_ID,
                &[REQUEST_KEY],
                DOC_FINDINGS_KEY,
                document_reader_instruction(config),
                &[DocumentSearchTool::NAME],
            ),
            FlowSpec::Parallel {
                id: RESEARCH_TEAM_ID.to_string(),
                children: vec![
                    generate_stage(
                        SUMMARIZER_ID,
                        &[DOC_FINDINGS_KEY],
                        SUMMARY_KEY,
                        SUMMARIZER_INSTRUCTION.to_string(),
                        &[],
                    ),
                    generate_stage(
                        TECH_RESEARCHER_ID,
                        &[DOC_FINDINGS_KEY],
                        ANALYSIS_KEY,
                        TECH_RESEARCHER_INSTRUCTION.to_string(),
                        researcher_tools,
                    ),
                ],
            },
            generate_stage(
                AGGREGATOR_ID,
                &[SUMMARY_KEY, ANALYSIS_KEY],
                REPORT_KEY,
                AGGREGATOR_INSTRUCTION.to_string(),
                &[],
            ),
        ],
    }
}

/// Tools the reference workflow hands to its generator
pub fn research_tools(config: &ResearchConfig) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(DocumentSearchTool::for_document(
        config.document_path.clone(),
    ))];
    if let Some(endpoint) = &config.search_endpoint {
        tools.push(Arc::new(WebSearchTool::new(endpoint.clone())));
    }
    tools
}

/// Build the reference workflow around `generator`
pub fn research_workflow(
    generator: Arc<dyn TextGenerator>,
    config: &ResearchConfig,
) -> Result<Flow, ValidationError> {
    let mut registry = ActionRegistry::new();
    crate::register_all(&mut registry, generator, research_tools(config));
    registry.build_flow(&reference_workflow_spec(config))
}
