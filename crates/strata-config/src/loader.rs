use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::StrataConfig;

/// Loads and reloads the Strata configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<StrataConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > STRATA_CONFIG env > ~/.strata/strata.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("STRATA_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".strata")
            .join("strata.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> strata_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            StrataConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(strata_core::StrataError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Wrap an already-built config (tests, embedded use).
    pub fn from_config(config: StrataConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path: PathBuf::new(),
        }
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> StrataConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<StrataConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn read_file(path: &Path) -> strata_core::Result<StrataConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<StrataConfig>(&raw).map_err(|e| {
            strata_core::StrataError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply process environment overrides.
    fn apply_env_overrides(config: StrataConfig) -> StrataConfig {
        Self::apply_overrides_from(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Plain settings are replaced when the variable is set. API keys only
    /// fill in when the config file leaves them unset, so the file wins.
    pub fn apply_overrides_from(
        mut config: StrataConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> StrataConfig {
        if let Some(v) = lookup("STRATA_AGENT_MODEL") {
            config.agent.model = v;
        }
        if let Some(v) = lookup("STRATA_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("STRATA_SERVER_LISTEN") {
            config.server.listen = v;
        }
        if let Some(port) = lookup("AGENT_API_PORT").and_then(|v| v.parse::<u16>().ok()) {
            let host = config
                .server
                .listen
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "127.0.0.1".into());
            config.server.listen = format!("{host}:{port}");
        }
        if let Some(v) = lookup("QWEN_API_BASE") {
            config.services.llm_api_base = v;
        }
        if let Some(v) = lookup("BACKEND_BASE_URL") {
            config.services.backend_base_url = v;
        }
        if let Some(v) = lookup("RAG_PERSIST_ROOT") {
            config.retrieval.index_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("USE_COHERE_RERANK") {
            config.retrieval.use_external_rerank =
                matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if config.services.llm_api_key.is_none() {
            config.services.llm_api_key = lookup("QWEN_API_KEY");
        }
        if config.services.cohere_api_key.is_none() {
            config.services.cohere_api_key = lookup("COHERE_API_KEY");
        }
        config
    }

    /// Reload the config from disk. An invalid file leaves the current config in place.
    pub fn reload(&self) -> strata_core::Result<()> {
        if !self.config_path.exists() {
            return Err(strata_core::StrataError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        new_config
            .validate()
            .map_err(strata_core::StrataError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}
