use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `strata.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub agent: AgentConfig,
    pub memory: MemoryConfig,
    pub retrieval: RagConfig,
    pub bridge: BridgeConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Chat model used by the reasoning loop.
    pub model: String,
    /// Extra system prompt prepended to every reasoning turn.
    pub system_prompt: Option<String>,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum Thought/Action/Observation rounds in ReAct mode.
    pub max_react_steps: u32,
    /// Reasoning mode used when a request names none: "cot", "react", or "cot+react".
    pub default_mode: String,
    /// Wall-clock seconds a caller waits for an answer before timing out.
    pub request_timeout_secs: u64,
    /// User id assumed when a request carries none.
    pub default_user_id: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "qwen-plus".into(),
            system_prompt: None,
            max_tokens: 800,
            temperature: 0.7,
            max_react_steps: 3,
            default_mode: "cot+react".into(),
            request_timeout_secs: 120,
            default_user_id: "default_user".into(),
        }
    }
}

// ── Memory ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path to the SQLite database backing long-term memory.
    pub db_path: PathBuf,
    /// Turns kept per session in the short-term buffer.
    pub short_term_size: usize,
    /// Entries kept per session in the task scratchpad.
    pub scratchpad_size: usize,
    /// Turns of history included when assembling context.
    pub context_history_limit: usize,
    /// Long-term hits recalled per turn.
    pub long_term_top_k: usize,
    /// Embedding model used for long-term memory.
    pub embedding: EmbeddingConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("memory/long_term.db"),
            short_term_size: 20,
            scratchpad_size: 10,
            context_history_limit: 10,
            long_term_top_k: 3,
            embedding: EmbeddingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding backend: "ollama", "openai", or "hash" (offline, deterministic).
    pub provider: String,
    pub model: String,
    /// Output dimensionality; must match every index the model writes to.
    pub dims: usize,
    /// Override the provider's base URL.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: "paraphrase-multilingual-minilm".into(),
            dims: 384,
            base_url: None,
        }
    }
}

// ── Retrieval ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Completion model for retrieval-augmented answers.
    pub model: String,
    pub temperature: f32,
    /// Candidates requested from each retriever.
    pub top_k: usize,
    /// Passages kept after fusion (and rerank).
    pub rerank_top_n: usize,
    /// Send fused candidates to the external rerank service.
    pub use_external_rerank: bool,
    pub rerank_model: String,
    /// Directory holding one vector index per embedding representation.
    pub index_root: PathBuf,
    /// Embedding representations, one dense retriever each. The first one is
    /// the primary index and supplies the lexical corpus.
    pub representations: Vec<EmbeddingConfig>,
}

impl RagConfig {
    /// Index file name for a representation: its model name with path
    /// separators flattened.
    pub fn index_tag(representation: &EmbeddingConfig) -> String {
        representation
            .model
            .rsplit('/')
            .next()
            .unwrap_or(&representation.model)
            .to_string()
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        let representation = |model: &str, dims: usize| EmbeddingConfig {
            provider: "ollama".into(),
            model: model.into(),
            dims,
            base_url: None,
        };
        Self {
            model: "qwen-turbo".into(),
            temperature: 0.2,
            top_k: 5,
            rerank_top_n: 5,
            use_external_rerank: false,
            rerank_model: "rerank-english-v2.0".into(),
            index_root: PathBuf::from("chroma_db_multi"),
            representations: vec![
                representation("BAAI/bge-base-zh-v1.5", 768),
                representation("GanymedeNil/text2vec-base-chinese", 768),
                representation("intfloat/e5-base", 768),
            ],
        }
    }
}

// ── Bridge ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Submissions allowed to run concurrently on the agent scheduler.
    pub max_in_flight: usize,
    /// Submissions allowed to wait for a slot before callers are turned away.
    pub queue_depth: usize,
    /// Seconds the process waits for one-time agent initialization.
    pub init_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            queue_depth: 64,
            init_timeout_secs: 30,
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:8000".
    pub listen: String,
    /// Enable permissive CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".into(),
            cors: false,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,
    /// Log format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// Endpoints and credentials of external services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// OpenAI-compatible chat endpoint.
    pub llm_api_base: String,
    pub llm_api_key: Option<String>,
    pub cohere_api_base: String,
    pub cohere_api_key: Option<String>,
    /// Business backend answering patent / enterprise lookups.
    pub backend_base_url: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            llm_api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
            llm_api_key: None,
            cohere_api_base: "https://api.cohere.ai".into(),
            cohere_api_key: None,
            backend_base_url: "http://localhost:8190".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A non-fatal (or fatal, for `Error`) finding about the configuration.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{} {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

const VALID_MODES: [&str; 3] = ["cot", "react", "cot+react"];
const VALID_EMBEDDERS: [&str; 3] = ["ollama", "openai", "hash"];
/// Upper bound on entries per scratchpad session.
pub const MAX_SCRATCHPAD_SIZE: usize = 10;

fn check_embedding(field: &str, embedding: &EmbeddingConfig, warnings: &mut Vec<ConfigWarning>) {
    if !VALID_EMBEDDERS.contains(&embedding.provider.as_str()) {
        warnings.push(ConfigWarning {
            field: format!("{field}.provider"),
            message: format!("unknown embedding provider '{}'", embedding.provider),
            severity: WarningSeverity::Error,
            hint: Some(format!("Valid values: {}", VALID_EMBEDDERS.join(", "))),
        });
    }
    if embedding.dims == 0 {
        warnings.push(ConfigWarning {
            field: format!("{field}.dims"),
            message: "embedding dimensionality is 0".into(),
            severity: WarningSeverity::Error,
            hint: Some("Set to the model's output size, e.g. 384 or 768".into()),
        });
    }
}

impl StrataConfig {
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent ───
        if self.agent.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "agent.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'qwen-plus'".into()),
            });
        }
        if self.agent.temperature < 0.0 || self.agent.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "agent.temperature".into(),
                message: format!("temperature {} is out of range", self.agent.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }
        if self.agent.max_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "agent.max_tokens".into(),
                message: "max_tokens is 0, the agent won't produce output".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 800".into()),
            });
        }
        let mode = self.agent.default_mode.replace(' ', "+").to_lowercase();
        if !VALID_MODES.contains(&mode.as_str()) {
            warnings.push(ConfigWarning {
                field: "agent.default_mode".into(),
                message: format!("unknown reasoning mode '{}'", self.agent.default_mode),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", VALID_MODES.join(", "))),
            });
        }
        if self.agent.request_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "agent.request_timeout_secs".into(),
                message: "timeout of 0s, every request would time out".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 120".into()),
            });
        }

        // ── Memory ───
        if self.memory.short_term_size == 0 {
            warnings.push(ConfigWarning {
                field: "memory.short_term_size".into(),
                message: "short-term buffer holds no turns".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 20".into()),
            });
        }
        if !(1..=MAX_SCRATCHPAD_SIZE).contains(&self.memory.scratchpad_size) {
            warnings.push(ConfigWarning {
                field: "memory.scratchpad_size".into(),
                message: format!(
                    "scratchpad size {} outside 1..={MAX_SCRATCHPAD_SIZE}",
                    self.memory.scratchpad_size
                ),
                severity: WarningSeverity::Error,
                hint: Some("The scratchpad keeps at most 10 entries per session".into()),
            });
        }
        if self.memory.context_history_limit > self.memory.short_term_size {
            warnings.push(ConfigWarning {
                field: "memory.context_history_limit".into(),
                message: format!(
                    "history limit {} exceeds buffer size {}",
                    self.memory.context_history_limit, self.memory.short_term_size
                ),
                severity: WarningSeverity::Warning,
                hint: Some("Context never holds more turns than the buffer keeps".into()),
            });
        }
        check_embedding("memory.embedding", &self.memory.embedding, &mut warnings);

        // ── Retrieval ───
        if self.retrieval.representations.is_empty() {
            warnings.push(ConfigWarning {
                field: "retrieval.representations".into(),
                message: "no embedding representations configured".into(),
                severity: WarningSeverity::Error,
                hint: Some("The first representation supplies the lexical corpus".into()),
            });
        }
        for (i, rep) in self.retrieval.representations.iter().enumerate() {
            check_embedding(&format!("retrieval.representations[{i}]"), rep, &mut warnings);
        }
        if self.retrieval.top_k == 0 || self.retrieval.rerank_top_n == 0 {
            warnings.push(ConfigWarning {
                field: "retrieval.top_k".into(),
                message: "top_k and rerank_top_n must be at least 1".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.retrieval.use_external_rerank && self.services.cohere_api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "retrieval.use_external_rerank".into(),
                message: "external rerank enabled without an API key".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set services.cohere_api_key or COHERE_API_KEY".into()),
            });
        }

        // ── Bridge ───
        if self.bridge.max_in_flight == 0 || self.bridge.queue_depth == 0 {
            warnings.push(ConfigWarning {
                field: "bridge".into(),
                message: "max_in_flight and queue_depth must be at least 1".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Server listen address ───
        if self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '127.0.0.1:8000'".into()),
            });
        } else if self.server.listen.starts_with("0.0.0.0") {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "binding to 0.0.0.0, the server is accessible from all interfaces".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Use '127.0.0.1:8000' for local-only access".into()),
            });
        }

        // ── Services ───
        if self.services.llm_api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "services.llm_api_key".into(),
                message: "no chat API key configured".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set services.llm_api_key or QWEN_API_KEY".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
