use thiserror::Error;

/// Unified error type for the entire Strata workspace.
#[derive(Error, Debug)]
pub enum StrataError {
    // ── Memory errors ──────────────────────────────────────────
    #[error("memory error: {0}")]
    Memory(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("malformed metadata filter: {0}")]
    MalformedFilter(String),

    // ── Model errors ───────────────────────────────────────────
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    // ── Retrieval errors ───────────────────────────────────────
    #[error("retrieval error: {retriever}: {reason}")]
    Retrieval { retriever: String, reason: String },

    #[error("rerank failed: {0}")]
    Rerank(String),

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    // ── Execution bridge errors ────────────────────────────────
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("execution bridge is at capacity")]
    Overloaded,

    #[error("execution bridge is not running")]
    BridgeClosed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StrataError>;
