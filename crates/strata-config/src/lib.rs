//! # strata-config
//!
//! Configuration system for Strata. Reads `strata.toml`, then applies
//! environment variable overrides, then validates.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::StrataConfig;
pub use schema::{
    AgentConfig, BridgeConfig, ConfigWarning, EmbeddingConfig, LoggingConfig, MemoryConfig,
    RagConfig, ServerConfig, ServicesConfig, WarningSeverity,
};
