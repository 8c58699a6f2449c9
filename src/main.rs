//! # RAG Console CLI (`ragc`)
//!
//! The `ragc` binary hosts the page and offers the same three backend flows
//! from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! ragc --config ./config/ragc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragc serve` | Host the page and proxy the backend paths |
//! | `ragc ask "<text>"` | Send a prompt and print the markdown answer |
//! | `ragc ingest url <url>` | Ask the backend to crawl a website |
//! | `ragc ingest file <path>` | Upload a file for ingestion |
//! | `ragc config` | Print the resolved configuration |
//!
//! ## Examples
//!
//! ```bash
//! # Point at a backend on another host
//! RAGC_BACKEND_URL=http://10.0.0.5:8000 ragc serve
//!
//! # Print the answer as the styled HTML the page shows
//! ragc ask "what did I write about tokio?" --html
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use rag_console::commands::{self, AnswerFormat};
use rag_console::config;
use rag_console::server;

/// RAG Console: a front-end for a personal retrieval-augmented-generation
/// backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "ragc",
    about = "Front-end for a personal RAG backend: ask questions, ingest URLs and files",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragc.toml`. When the file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/ragc.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Host the page.
    ///
    /// Binds to `[server].bind`, renders the page at `/` and forwards
    /// `/api`, `/ingest` and `/ingest-file` to `[backend].base_url`.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Send a prompt to the backend and print the answer.
    Ask {
        /// The prompt text. May be empty.
        text: String,

        /// Print the answer as styled HTML instead of markdown.
        #[arg(long)]
        html: bool,
    },

    /// Hand content to the backend for ingestion.
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },

    /// Print the resolved configuration as TOML.
    Config,
}

/// Ingestion subcommands.
#[derive(Subcommand)]
enum IngestTarget {
    /// Crawl a website.
    Url {
        /// Website URL, sent to the backend unvalidated.
        url: String,
    },
    /// Upload a local file.
    ///
    /// Files over `[ingest].max_file_bytes` (5 MB by default) are refused
    /// without contacting the backend.
    File {
        /// Path of the file to upload.
        path: PathBuf,
    },
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "rag_console=info,ragc=info",
        1 => "rag_console=debug,ragc=debug,tower_http=debug",
        _ => "rag_console=trace,ragc=trace,tower_http=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries command output, so logs go to stderr.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
        Commands::Ask { text, html } => {
            let format = if html {
                AnswerFormat::Html
            } else {
                AnswerFormat::Markdown
            };
            commands::run_ask(&cfg, &text, format).await?;
        }
        Commands::Ingest { target } => match target {
            IngestTarget::Url { url } => {
                commands::run_ingest_url(&cfg, &url).await?;
            }
            IngestTarget::File { path } => {
                commands::run_ingest_file(&cfg, &path).await?;
            }
        },
        Commands::Config => {
            commands::show_config(&cfg)?;
        }
    }

    Ok(())
}
