use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strata_config::{ConfigLoader, StrataConfig};
use strata_core::{Result, StrataError};
use strata_runtime::{Agent, AgentBridge, AgentRequest, ReasoningMode, start_agent};
use strata_server::AppState;

/// Strata: layered-memory agent with multi-retriever RAG
#[derive(Parser)]
#[command(name = "strata", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to strata.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent and its HTTP API
    Serve {
        /// Address to listen on (overrides server.listen)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Interactive chat in the terminal
    Chat {
        /// User the conversation belongs to
        #[arg(short, long)]
        user: Option<String>,
        /// Session ID (defaults to session_{user})
        #[arg(short, long)]
        session: Option<String>,
        /// Reasoning mode: cot, react, or cot+react
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Answer one query and exit
    Ask {
        query: String,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // RUST_LOG > --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        init_tracing(log_level, &config.logging.format);

        match self.command {
            Commands::Serve { listen } => Self::cmd_serve(config, listen).await,
            Commands::Chat { user, session, mode } => Self::cmd_chat(config, user, session, mode).await,
            Commands::Ask { query, user, mode } => Self::cmd_ask(config, query, user, mode).await,
            Commands::Config { json } => Self::cmd_config(&config, json),
        }
    }

    async fn cmd_serve(mut config: StrataConfig, listen: Option<String>) -> Result<()> {
        if let Some(listen) = listen {
            config.server.listen = listen;
        }
        println!("Strata v{}", env!("CARGO_PKG_VERSION"));
        println!("   Model: {}", config.agent.model);
        println!("   Listen: {}", config.server.listen);
        if config.services.llm_api_key.is_none() {
            eprintln!("   No LLM API key set: add services.llm_api_key or export QWEN_API_KEY.");
        }
        println!();

        let bridge = start_bridge(config.clone()).await?;
        let state = Arc::new(AppState::new(
            Arc::clone(&bridge),
            Duration::from_secs(config.agent.request_timeout_secs),
        ));

        let shutdown = CancellationToken::new();
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                }
                shutdown.cancel();
            }
        });

        let served = strata_server::start_server(&config.server, state, shutdown).await;
        stop_bridge(bridge).await;
        served
    }

    async fn cmd_chat(
        config: StrataConfig,
        user: Option<String>,
        session: Option<String>,
        mode: Option<String>,
    ) -> Result<()> {
        let mode = mode.as_deref().map(ReasoningMode::parse).transpose()?;
        let user = user.unwrap_or_else(|| config.agent.default_user_id.clone());
        let timeout = Duration::from_secs(config.agent.request_timeout_secs);

        println!("Strata interactive chat");
        println!("   User: {user}");
        println!("   Type 'exit' or Ctrl+D to quit, '/clear' to forget this session");
        println!();

        let bridge = start_bridge(config).await?;
        let session_id = session.unwrap_or_else(|| strata_runtime::default_session_id(&user));
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

        loop {
            eprint!("you> ");
            std::io::stderr().flush().ok();

            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => break,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if matches!(trimmed, "exit" | "quit" | "/exit") {
                break;
            }
            if trimmed == "/clear" {
                let job_session = session_id.clone();
                let cleared = bridge
                    .submit_async(
                        move |agent: Arc<Agent>| async move {
                            agent.clear_short_term(&job_session);
                            Ok(())
                        },
                        timeout,
                    )
                    .await;
                match cleared {
                    Ok(()) => println!("(session cleared)"),
                    Err(e) => eprintln!("error: {e}"),
                }
                continue;
            }

            let request = AgentRequest {
                query: trimmed.to_string(),
                user_id: user.clone(),
                session_id: Some(session_id.clone()),
                mode,
            };
            match ask(&bridge, request, timeout).await {
                Ok(answer) => println!("strata> {answer}\n"),
                Err(e) => eprintln!("error: {e}\n"),
            }
        }

        println!("Goodbye!");
        stop_bridge(bridge).await;
        Ok(())
    }

    async fn cmd_ask(config: StrataConfig, query: String, user: Option<String>, mode: Option<String>) -> Result<()> {
        let mode = mode.as_deref().map(ReasoningMode::parse).transpose()?;
        let timeout = Duration::from_secs(config.agent.request_timeout_secs);
        let request = AgentRequest {
            query,
            user_id: user.unwrap_or_default(),
            session_id: None,
            mode,
        };

        let bridge = start_bridge(config).await?;
        let answer = ask(&bridge, request, timeout).await;
        stop_bridge(bridge).await;
        println!("{}", answer?);
        Ok(())
    }

    fn cmd_config(config: &StrataConfig, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| StrataError::Config(e.to_string()))?
            );
        }
        Ok(())
    }
}

fn init_tracing(log_level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Bridge start-up blocks until the agent is built, so keep it off the
/// async workers.
async fn start_bridge(config: StrataConfig) -> Result<Arc<AgentBridge>> {
    let bridge = tokio::task::spawn_blocking(move || start_agent(config))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(Arc::new(bridge))
}

async fn stop_bridge(bridge: Arc<AgentBridge>) {
    if let Err(e) = tokio::task::spawn_blocking(move || bridge.shutdown()).await {
        warn!(error = %e, "bridge shutdown failed");
    }
}

async fn ask(bridge: &AgentBridge, request: AgentRequest, timeout: Duration) -> Result<String> {
    let answer = bridge
        .submit_async(
            move |agent: Arc<Agent>| async move { agent.process_query(request).await },
            timeout,
        )
        .await?;
    Ok(answer)
}
