//! # Clinical Harness CLI (`chx`)
//!
//! ## Usage
//!
//! ```bash
//! chx --config ./config/chx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chx ask "<question>"` | Answer a clinical question |
//! | `chx calc <kg>` | Holliday-Segar maintenance fluids |
//! | `chx classify "<question>" [--verbose]` | Show intent tags and route |
//! | `chx search "<question>"` | Show the documents retrieval would use |
//! | `chx sanitize [file]` | Run the answer sanitizer over raw text |
//! | `chx suggest --history <file>` | Suggest follow-up questions |
//! | `chx corpus` | Knowledge snapshot statistics |
//! | `chx serve` | Start the HTTP JSON server |
//!
//! Without a config file every command runs offline: hashing embedder,
//! completion disabled, built-in corpus only.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinical_harness::commands;
use clinical_harness::config::{self, Config};
use clinical_harness::server;

/// Clinical Harness: safe, bulleted answers to nursing questions.
#[derive(Parser)]
#[command(
    name = "chx",
    about = "Clinical Harness: intent-routed retrieval and safe, bulleted answers for nursing questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/chx.toml`. When the file does not exist the
    /// offline defaults are used.
    #[arg(long, global = true, default_value = "./config/chx.toml")]
    config: PathBuf,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a clinical question.
    Ask {
        /// The nurse's question.
        query: String,

        /// JSON file with prior turns: `[{"role": "user", "content": "..."}]`.
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Calculate maintenance fluid requirements for a weight.
    Calc {
        /// Body weight in kg.
        weight_kg: f64,
    },

    /// Classify a question into intent tags and a route.
    Classify {
        query: String,

        /// Also list the keywords that fired each tag.
        #[arg(long)]
        verbose: bool,
    },

    /// Show the documents retrieval selects for a question.
    Search { query: String },

    /// Sanitize raw model output (or extract facts from raw text).
    ///
    /// Reads from the file, or from stdin when no file is given.
    Sanitize {
        file: Option<PathBuf>,

        /// Extraction mode: tighter total length, used for raw corpus text.
        #[arg(long)]
        extract: bool,
    },

    /// Suggest follow-up questions for a conversation.
    Suggest {
        /// JSON conversation file, same format as `ask --history`.
        #[arg(long)]
        history: PathBuf,
    },

    /// Show knowledge snapshot statistics.
    Corpus,

    /// Start the HTTP JSON server on `[server].bind`.
    Serve,
}

/// Load the config file, or the offline defaults when it does not exist.
fn load_or_minimal(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        warn!(path = %path.display(), "config file not found, using offline defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinical_harness=info,clinical_harness_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    // Commands that don't require config
    match &cli.command {
        Commands::Calc { weight_kg } => return commands::run_calc(*weight_kg, json),
        Commands::Sanitize { file, extract } => {
            return commands::run_sanitize(file.as_deref(), *extract, json)
        }
        Commands::Suggest { history } => return commands::run_suggest(history, json),
        _ => {}
    }

    let cfg = load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Ask { query, history } => {
            tokio::task::spawn_blocking(move || {
                commands::run_ask(&cfg, &query, history.as_deref(), json)
            })
            .await??;
        }
        Commands::Classify { query, verbose } => {
            commands::run_classify(&cfg.keyword_table()?, &query, verbose, json)?;
        }
        Commands::Search { query } => {
            tokio::task::spawn_blocking(move || commands::run_search(&cfg, &query, json))
                .await??;
        }
        Commands::Corpus => {
            tokio::task::spawn_blocking(move || commands::run_corpus(&cfg, json)).await??;
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Calc { .. } | Commands::Sanitize { .. } | Commands::Suggest { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
