//! # Fitness RAG CLI (`fitrag`)
//!
//! ## Usage
//!
//! ```bash
//! fitrag --config ./config/fitrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fitrag init` | Create the SQLite database and run schema migrations |
//! | `fitrag index <dir>` | Extract, chunk, and embed every supported file under `<dir>` |
//! | `fitrag search "<query>"` | Print the passages retrieved for a query |
//! | `fitrag ask "<query>"` | Answer one query and print the event stream |
//! | `fitrag pose <image>` | Check standing posture in a local image |
//! | `fitrag serve` | Start the HTTP server |
//!
//! `FANAR_API_KEY` (or the variable named by `[llm].api_key_env`) must be
//! set for `ask` and `serve`. A `.env` file in the working directory is
//! loaded first.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fitness_rag::{config, ingest, migrate, pipeline, pose, retriever, server};

/// Fitness RAG: grounded answers about sports, fitness, and culture in
/// English, Arabic, and Persian.
#[derive(Parser)]
#[command(name = "fitrag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fitrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it on an existing database is safe.
    Init,

    /// Index a knowledge directory.
    ///
    /// Walks `dir` for `.md`, `.txt`, `.pdf`, and `.json` files. Re-indexing
    /// a file replaces its chunks and vectors.
    Index {
        /// Directory containing the knowledge files.
        dir: PathBuf,
    },

    /// Search the vector index with query expansion.
    Search {
        /// English query text.
        query: String,

        /// Results per expansion variant. Defaults to `[retrieval].k`.
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single query.
    Ask {
        /// Query in English, Arabic, or Persian.
        query: String,
    },

    /// Check standing posture in an image file.
    Pose {
        /// JPEG, PNG, or WebP image.
        image: PathBuf,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `/ask`, `/check_pose`, `/health`,
    /// and `/static`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { dir } => {
            ingest::run_index(&cfg, &dir).await?;
        }
        Commands::Search { query, k } => {
            retriever::run_search(&cfg, &query, k).await?;
        }
        Commands::Ask { query } => {
            pipeline::run_ask(&cfg, &query).await?;
        }
        Commands::Pose { image } => {
            pose::run_pose(&cfg, &image).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
