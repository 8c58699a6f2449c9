//! CLI entry points for the three backend flows.
//!
//! Each command is one request with no retry. Backend failures come back as
//! errors whose message is the backend's reply (or `Request failed (<status>)`),
//! so `main` prints them exactly as the page would show them.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::client::{Backend, BackendClient, UploadFile};
use crate::config::Config;
use crate::markdown::render_markdown;
use crate::page::file_too_large_message;

/// Output format for `ragc ask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerFormat {
    /// The markdown exactly as the backend returned it.
    Markdown,
    /// The styled HTML fragment the page renders.
    Html,
}

/// `ragc ask <text>`: prints the backend's answer.
pub async fn run_ask(config: &Config, text: &str, format: AnswerFormat) -> Result<()> {
    let client = BackendClient::new(&config.backend)?;
    let answer = client.generate(text).await?;
    info!(bytes = answer.len(), "answer received");

    let rendered = match format {
        AnswerFormat::Markdown => answer,
        AnswerFormat::Html => render_markdown(&answer),
    };
    print_block(&rendered)
}

/// `ragc ingest url <url>`.
pub async fn run_ingest_url(config: &Config, url: &str) -> Result<()> {
    let client = BackendClient::new(&config.backend)?;
    let status = client.ingest_url(url).await?;
    print_block(&status)
}

/// `ragc ingest file <path>`: refuses files over the cap before sending.
pub async fn run_ingest_file(config: &Config, path: &Path) -> Result<()> {
    let upload = load_upload(path, config.ingest.max_file_bytes)?;
    let client = BackendClient::new(&config.backend)?;
    let status = client.ingest_file(upload).await?;
    print_block(&status)
}

/// Reads `path` into an [`UploadFile`], checking the size before reading.
pub fn load_upload(path: &Path, max_bytes: u64) -> Result<UploadFile> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("Not a file: {}", path.display());
    }
    if meta.len() > max_bytes {
        anyhow::bail!(file_too_large_message(max_bytes));
    }

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let mut upload = UploadFile::new(name, bytes);
    if let Some(content_type) = guess_content_type(path) {
        upload = upload.with_content_type(content_type);
    }
    Ok(upload)
}

fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "csv" => "text/csv",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(content_type)
}

/// `ragc config`: prints the resolved configuration as TOML.
pub fn show_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    print_block(&rendered)
}

fn print_block(text: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
