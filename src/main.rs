//! # Mindful CLI (`mindful`)
//!
//! ## Usage
//!
//! ```bash
//! mindful --config ./config/mindful.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mindful init` | Create the passage index schema |
//! | `mindful index <dir>` | Index a directory of knowledge files |
//! | `mindful serve rag` | Start the retrieval-augmented chat server |
//! | `mindful serve sentiment` | Start the sentiment-tagged chat server |
//! | `mindful chat` | Chat in the terminal |
//! | `mindful mood "<text>"` | Score a message's sentiment |
//!
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG` to change the
//! level (default `mindful_chat=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mindful_chat::config;
use mindful_chat::sentiment::{LexiconScorer, SentimentScorer};
use mindful_chat::{chat_cmd, index, server};

/// Supportive chat services over hosted or local language models.
#[derive(Parser)]
#[command(name = "mindful", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mindful.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the passage index schema. Safe to run repeatedly.
    Init,

    /// Index a directory of knowledge files.
    ///
    /// Unchanged files are skipped unless `--full` is given.
    Index {
        /// Directory to walk.
        dir: PathBuf,

        /// Re-index every file, even when unchanged.
        #[arg(long)]
        full: bool,
    },

    /// Start an HTTP chat server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Chat with the retrieval-augmented assistant in the terminal.
    Chat,

    /// Print the sentiment score and mood of a message.
    ///
    /// Needs no configuration file.
    Mood {
        /// The message to score.
        text: String,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Retrieval-augmented chat (`[server].bind`).
    Rag,
    /// Sentiment-tagged chat (`[sentiment].bind`).
    Sentiment,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mindful_chat=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Mood { text } = &cli.command {
        let scorer = LexiconScorer::new();
        let score = scorer.polarity(text);
        println!("compound: {:.4}", score);
        println!("mood: {}", scorer.mood(text).as_str());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => index::run_init(&cfg).await?,
        Commands::Index { dir, full } => {
            index::run_index(&cfg, &dir, full).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Rag => server::run_rag_server(&cfg).await?,
            ServeService::Sentiment => server::run_sentiment_server(&cfg).await?,
        },
        Commands::Chat => chat_cmd::run_chat(&cfg).await?,
        Commands::Mood { .. } => {}
    }

    Ok(())
}
