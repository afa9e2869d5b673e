use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use strata_core::{Result, StrataError, Tool, ToolCall, ToolExecutor, ToolResult};
use strata_retrieval::{RetrievalConfig, RetrievalPipeline};

/// Business tools of the patent-transfer agent.
///
/// Patent and enterprise lookups go to the business backend; knowledge
/// questions go to the retrieval pipeline. Lookup failures come back as
/// observations so the model can react to them.
pub struct PatentTools {
    client: reqwest::Client,
    backend_base_url: String,
    retrieval: Option<(Arc<RetrievalPipeline>, RetrievalConfig)>,
}

impl PatentTools {
    pub fn new(backend_base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            backend_base_url: backend_base_url.into().trim_end_matches('/').to_string(),
            retrieval: None,
        }
    }

    pub fn with_retrieval(mut self, pipeline: Arc<RetrievalPipeline>, config: RetrievalConfig) -> Self {
        self.retrieval = Some((pipeline, config));
        self
    }

    /// POST `{backend}{path}?patent_no=...` and return the JSON body
    /// (an empty object for an empty body).
    async fn call_backend(&self, path: &str, patent_no: &str) -> std::result::Result<Value, String> {
        let url = format!("{}{path}", self.backend_base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("patent_no", patent_no)])
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        let body = resp.text().await.map_err(|e| e.to_string())?;
        if body.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&body).map_err(|e| e.to_string())
    }

    async fn patent_analysis(&self, patent_no: &str) -> String {
        match self.call_backend("/agent/tools/patent/search", patent_no).await {
            Ok(body) => render_patent(&body),
            Err(e) => {
                warn!(patent_no, error = %e, "patent lookup failed");
                format!("Lookup failed: {e}")
            }
        }
    }

    async fn enterprise_interest(&self, patent_no: &str) -> String {
        match self.call_backend("/agent/tools/patent/enterprise", patent_no).await {
            Ok(body) => render_interest(&body),
            Err(e) => {
                warn!(patent_no, error = %e, "enterprise interest lookup failed");
                format!("Lookup failed: {e}")
            }
        }
    }

    async fn rag_patent_info(&self, patent_no: &str, query: &str) -> String {
        let Some((pipeline, config)) = &self.retrieval else {
            return "Knowledge base is not configured.".into();
        };
        let question = if query.trim().is_empty() {
            format!("Key facts, technical points, and application scenarios of patent {patent_no}")
        } else {
            query.trim().to_string()
        };
        match pipeline.retrieval_answer(&question, config).await {
            Ok(answer) => format!("Knowledge-base answer for patent {patent_no}:\n{answer}"),
            Err(e) => {
                warn!(patent_no, error = %e, "knowledge-base lookup failed");
                format!("Knowledge-base lookup failed: {e}")
            }
        }
    }
}

/// Backend envelope `{code: 1, data}`; anything else is echoed back.
fn envelope_data(body: &Value) -> Option<&Value> {
    if body["code"].as_i64() == Some(1) {
        body.get("data")
    } else {
        None
    }
}

pub fn render_patent(body: &Value) -> String {
    let Some(patent) = envelope_data(body) else {
        return body.to_string();
    };
    let parts: Vec<String> = [("Name", "name"), ("Summary", "summary"), ("Link", "link")]
        .iter()
        .filter_map(|(label, field)| {
            patent[*field]
                .as_str()
                .filter(|v| !v.is_empty())
                .map(|v| format!("{label}: {v}"))
        })
        .collect();
    if parts.is_empty() {
        patent.to_string()
    } else {
        parts.join("\n")
    }
}

pub fn render_interest(body: &Value) -> String {
    match envelope_data(body) {
        Some(Value::String(s)) => format!("Enterprise interest: {s}"),
        Some(data) => format!("Enterprise interest: {data}"),
        None => body.to_string(),
    }
}

fn string_arg<'a>(call: &'a ToolCall, name: &str) -> Option<&'a str> {
    call.arguments[name].as_str()
}

#[async_trait]
impl ToolExecutor for PatentTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "get_identification".into(),
                description: "Get the identity type of a user (enterprise, university, or individual).".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "user_id": { "type": "string", "description": "User identifier" }
                    },
                    "required": ["user_id"]
                }),
            },
            Tool {
                name: "get_enterprise_interest".into(),
                description: "Get enterprise interest in a patent (how many enterprises answered its questionnaire).".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "patent_no": { "type": "string", "description": "Patent number" }
                    },
                    "required": ["patent_no"]
                }),
            },
            Tool {
                name: "get_patent_analysis".into(),
                description: "Look up patent details (name, summary, link) by patent number.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "patent_no": { "type": "string", "description": "Patent number" }
                    },
                    "required": ["patent_no"]
                }),
            },
            Tool {
                name: "get_rag_patent_info".into(),
                description: "Answer a question about a patent from the knowledge base (lexical and vector recall, rank fusion, optional rerank).".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "patent_no": { "type": "string", "description": "Patent number" },
                        "query": { "type": "string", "description": "The user's question; defaults to a summary of the patent" }
                    },
                    "required": ["patent_no"]
                }),
            },
        ]
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        debug!(tool = %call.tool_name, "executing patent tool");
        let name = call.tool_name.as_str();
        let key = if name == "get_identification" { "user_id" } else { "patent_no" };
        let known = matches!(
            name,
            "get_identification" | "get_enterprise_interest" | "get_patent_analysis" | "get_rag_patent_info"
        );
        if !known {
            return Err(StrataError::ToolNotFound(call.tool_name.clone()));
        }
        let Some(arg) = string_arg(call, key) else {
            return Ok(ToolResult::error(call, format!("Error: missing '{key}' argument")));
        };

        let content = match name {
            "get_identification" => "enterprise".to_string(),
            "get_enterprise_interest" => self.enterprise_interest(arg).await,
            "get_patent_analysis" => self.patent_analysis(arg).await,
            _ => {
                self.rag_patent_info(arg, string_arg(call, "query").unwrap_or_default())
                    .await
            }
        };
        Ok(ToolResult::ok(call, content))
    }
}
