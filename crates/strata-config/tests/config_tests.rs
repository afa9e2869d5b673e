#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use strata_config::ConfigLoader;
    use strata_config::schema::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_agent_config_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.model, "qwen-plus");
        assert_eq!(config.max_tokens, 800);
        assert_eq!(config.max_react_steps, 3);
        assert_eq!(config.default_mode, "cot+react");
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.short_term_size, 20);
        assert_eq!(config.scratchpad_size, 10);
        assert_eq!(config.context_history_limit, 10);
        assert_eq!(config.long_term_top_k, 3);
        assert_eq!(config.embedding.dims, 384);
    }

    #[test]
    fn test_retrieval_config_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.model, "qwen-turbo");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.rerank_top_n, 5);
        assert!(!config.use_external_rerank);
        assert_eq!(config.representations.len(), 3);
        assert_eq!(RagConfig::index_tag(&config.representations[0]), "bge-base-zh-v1.5");
    }

    #[test]
    fn test_bridge_and_server_defaults() {
        let bridge = BridgeConfig::default();
        assert_eq!(bridge.max_in_flight, 8);
        assert_eq!(bridge.queue_depth, 64);
        let server = ServerConfig::default();
        assert_eq!(server.listen, "127.0.0.1:8000");
        assert!(!server.cors);
    }

    #[test]
    fn test_default_config_validates_with_key_warning_only() {
        let warnings = StrataConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
        assert!(warnings.iter().any(|w| w.field == "services.llm_api_key"));
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = StrataConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: StrataConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.agent.model, config.agent.model);
        assert_eq!(restored.retrieval.representations.len(), 3);
        assert_eq!(restored.bridge.queue_depth, config.bridge.queue_depth);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[agent]
model = "qwen-max"

[[retrieval.representations]]
provider = "hash"
model = "local"
dims = 64
"#;
        let config: StrataConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.model, "qwen-max");
        assert_eq!(config.agent.max_tokens, 800);
        assert_eq!(config.retrieval.representations.len(), 1);
        assert_eq!(config.retrieval.representations[0].dims, 64);
        assert_eq!(config.memory.short_term_size, 20);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_invalid_mode_is_an_error() {
        let mut config = StrataConfig::default();
        config.agent.default_mode = "tree-of-thought".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("agent.default_mode"));
    }

    #[test]
    fn test_space_separated_mode_is_accepted() {
        let mut config = StrataConfig::default();
        config.agent.default_mode = "cot react".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_dims_is_an_error() {
        let mut config = StrataConfig::default();
        config.memory.embedding.dims = 0;
        assert!(config.validate().unwrap_err().contains("memory.embedding.dims"));
    }

    #[test]
    fn test_scratchpad_size_is_bounded() {
        let mut config = StrataConfig::default();
        config.memory.scratchpad_size = 11;
        assert!(config.validate().unwrap_err().contains("memory.scratchpad_size"));
        config.memory.scratchpad_size = 0;
        assert!(config.validate().is_err());
        config.memory.scratchpad_size = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_external_rerank_requires_key() {
        let mut config = StrataConfig::default();
        config.retrieval.use_external_rerank = true;
        assert!(config.validate().is_err());
        config.services.cohere_api_key = Some("k".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_history_limit_over_buffer_warns() {
        let mut config = StrataConfig::default();
        config.memory.context_history_limit = 50;
        let warnings = config.validate().unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| w.field == "memory.context_history_limit"
                    && w.severity == WarningSeverity::Warning)
        );
    }

    #[test]
    fn test_warning_display_includes_hint() {
        let w = ConfigWarning {
            field: "server.listen".into(),
            message: "binding to 0.0.0.0".into(),
            severity: WarningSeverity::Warning,
            hint: Some("use 127.0.0.1".into()),
        };
        let shown = w.to_string();
        assert!(shown.starts_with("warning server.listen"));
        assert!(shown.contains("use 127.0.0.1"));
    }

    // ── Env override tests ─────────────────────────────────────

    #[test]
    fn test_env_overrides_replace_settings() {
        let config = ConfigLoader::apply_overrides_from(
            StrataConfig::default(),
            lookup(&[
                ("STRATA_AGENT_MODEL", "qwen-max"),
                ("AGENT_API_PORT", "9100"),
                ("RAG_PERSIST_ROOT", "/data/indexes"),
                ("USE_COHERE_RERANK", "True"),
                ("BACKEND_BASE_URL", "http://backend:8190"),
            ]),
        );
        assert_eq!(config.agent.model, "qwen-max");
        assert_eq!(config.server.listen, "127.0.0.1:9100");
        assert_eq!(config.retrieval.index_root.to_str(), Some("/data/indexes"));
        assert!(config.retrieval.use_external_rerank);
        assert_eq!(config.services.backend_base_url, "http://backend:8190");
    }

    #[test]
    fn test_api_keys_from_file_take_priority() {
        let mut config = StrataConfig::default();
        config.services.llm_api_key = Some("from-file".into());
        let config = ConfigLoader::apply_overrides_from(
            config,
            lookup(&[("QWEN_API_KEY", "from-env"), ("COHERE_API_KEY", "cohere-env")]),
        );
        assert_eq!(config.services.llm_api_key.as_deref(), Some("from-file"));
        assert_eq!(config.services.cohere_api_key.as_deref(), Some("cohere-env"));
    }

    #[test]
    fn test_bad_port_is_ignored() {
        let config = ConfigLoader::apply_overrides_from(
            StrataConfig::default(),
            lookup(&[("AGENT_API_PORT", "not-a-port")]),
        );
        assert_eq!(config.server.listen, "127.0.0.1:8000");
    }

    // ── Loader tests ───────────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[memory]
short_term_size = 30

[bridge]
max_in_flight = 2
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(&path)).unwrap();
        let config = loader.get();
        assert_eq!(config.memory.short_term_size, 30);
        assert_eq!(config.bridge.max_in_flight, 2);
        assert_eq!(loader.path(), path.as_path());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().bridge.queue_depth, 64);
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(&path, "[bridge]\nmax_in_flight = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(&path)).is_err());
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(&path, "[memory]\nlong_term_top_k = 3\n").unwrap();
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().memory.long_term_top_k, 3);

        std::fs::write(&path, "[memory]\nlong_term_top_k = 7\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().memory.long_term_top_k, 7);

        // An invalid edit keeps the previous config.
        std::fs::write(&path, "[memory]\nshort_term_size = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().memory.long_term_top_k, 7);
    }
}
