//! huginn command-line front end.
//!
//! Composes one orchestrator from `~/.huginn/config.toml` (or `--config`)
//! and exposes its operations.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use huginn::{ChatHistory, Config, Huginn, Secrets, Turn};

/// Huginn CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Provider-routing LLM orchestrator")]
struct Args {
    /// Config file (default: ~/.huginn/config.toml)
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a question
    Ask {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        /// Provider name (default: best available)
        #[arg(short, long)]
        provider: Option<String>,
        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
        /// Override the configured system prompt
        #[arg(long)]
        system: Option<String>,
        /// Don't read or write the chat history
        #[arg(long)]
        no_history: bool,
    },

    /// List configured providers
    Providers,

    /// Check whether the local daemon is reachable
    Probe,

    /// List models for a provider
    Models {
        /// Provider name
        provider: String,
        /// Ask the backend again instead of using the memoized list
        #[arg(long)]
        refresh: bool,
    },

    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or clear the chat history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and size
    Stats,
    /// Remove every cached response
    Clear,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print the stored history
    Show,
    /// Delete the history file
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    config.resolve_api_keys(&Secrets::load()?, |var| std::env::var(var).ok());
    let history = config
        .history
        .path
        .clone()
        .map(|path| ChatHistory::new(path, config.history.max_entries));

    let huginn = Huginn::builder().config(config).build()?;

    match args.command {
        Command::Ask {
            prompt,
            provider,
            no_cache,
            system,
            no_history,
        } => {
            let prompt = resolve_text(prompt, "ask")?;
            let history = history.filter(|_| !no_history);
            let turns = history.as_ref().map(ChatHistory::load).unwrap_or_default();

            let response = huginn
                .query_with_provider(
                    provider.as_deref().unwrap_or(""),
                    &prompt,
                    &turns,
                    !no_cache,
                    system.as_deref(),
                )
                .await;

            match &response.error {
                None => {
                    println!("{}", response.formatted());
                    if let Some(history) = &history {
                        history.append([
                            Turn::user(prompt),
                            Turn::assistant(response.content.clone().unwrap_or_default()),
                        ])?;
                    }
                }
                Some(err) => {
                    eprintln!("error ({}): {}", err.kind, err.message);
                    eprintln!("hint: {}", err.kind.remediation());
                    if let Some(detail) = &err.detail {
                        eprintln!("detail: {detail}");
                    }
                    std::process::exit(1);
                }
            }
            eprintln!(
                "[{}{}{}]",
                response.provider.as_deref().unwrap_or("unknown"),
                response
                    .model
                    .as_deref()
                    .map(|m| format!(" / {m}"))
                    .unwrap_or_default(),
                response
                    .latency
                    .map(|l| format!(", {} ms", l.as_millis()))
                    .unwrap_or_default(),
            );
        }

        Command::Providers => {
            let providers = huginn.list_available();
            if providers.is_empty() {
                println!("no providers configured");
            } else {
                for name in providers {
                    println!("{name}");
                }
            }
        }

        Command::Probe => {
            let running = huginn.probe_local_daemon(true).await;
            println!(
                "local daemon: {}",
                if running { "reachable" } else { "not reachable" }
            );
        }

        Command::Models { provider, refresh } => {
            let models = huginn.available_models(&provider, refresh).await;
            if models.is_empty() {
                println!("no models available");
            } else {
                for model in models {
                    println!("{model}");
                }
            }
        }

        Command::Cache { action } => {
            let Some(cache) = huginn.cache() else {
                println!("response cache is disabled");
                return Ok(());
            };
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats();
                    println!("entries:  {}/{}", stats.entries, stats.max_entries);
                    println!("size:     ~{} bytes", stats.approx_bytes);
                    if let Some(path) = cache.path() {
                        println!("file:     {}", path.display());
                    }
                }
                CacheAction::Clear => {
                    cache.clear();
                    println!("response cache cleared");
                }
            }
        }

        Command::History { action } => {
            let Some(history) = history else {
                return Err("no history file configured".into());
            };
            match action {
                HistoryAction::Show => {
                    for turn in history.load() {
                        println!("{turn}");
                    }
                }
                HistoryAction::Clear => {
                    history.clear()?;
                    println!("cleared {}", history.path().display());
                }
            }
        }
    }

    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_is_pipe = !io::stdin().is_terminal();
    let stdin_text = if stdin_is_pipe {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    } else {
        None
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
