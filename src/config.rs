//! TOML configuration parsing and validation.
//!
//! A missing file is not an error for commands that only talk to the
//! backend: they fall back to [`Config::minimal`]. The `RAGC_BACKEND_URL`
//! environment variable overrides `[backend].base_url` in either case.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable that overrides `backend.base_url`.
pub const BACKEND_URL_ENV: &str = "RAGC_BACKEND_URL";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
// Ingestion crawls whole sites behind a single request.
fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    /// Largest file the page will send to `/ingest-file`.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// 5 MB, the cap the ingestion form has always enforced.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

impl Config {
    /// Built-in defaults: backend on `127.0.0.1:8000`, page on `127.0.0.1:3000`.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Applies environment overrides on top of the file (or default) values.
    pub fn with_env_overrides(self) -> Self {
        self.with_backend_override(std::env::var(BACKEND_URL_ENV).ok().as_deref())
    }

    fn with_backend_override(mut self, base_url: Option<&str>) -> Self {
        if let Some(url) = base_url.map(str::trim).filter(|url| !url.is_empty()) {
            self.backend.base_url = url.to_string();
        }
        self
    }
}

fn parse_unvalidated(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Parses and validates a TOML document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config = parse_unvalidated(content)?;
    validate(&config)?;
    Ok(config)
}

/// Reads `path`, applies `RAGC_BACKEND_URL`, then validates the result.
pub fn load_config(path: &Path) -> Result<Config> {
    load_with_override(path, std::env::var(BACKEND_URL_ENV).ok().as_deref())
}

fn load_with_override(path: &Path, base_url: Option<&str>) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_unvalidated(&content)?.with_backend_override(base_url);
    validate(&config)?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise the minimal config.
///
/// A file that exists but fails to parse is still an error.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::minimal().with_env_overrides();
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<()> {
    let parsed = url::Url::parse(&config.backend.base_url)
        .with_context(|| format!("backend.base_url is not a valid URL: {}", config.backend.base_url))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => anyhow::bail!(
            "backend.base_url must use http or https, got '{}'",
            other
        ),
    }

    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    if config.ingest.max_file_bytes == 0 {
        anyhow::bail!("ingest.max_file_bytes must be > 0");
    }

    if (config.server.max_body_bytes as u64) < config.ingest.max_file_bytes {
        anyhow::bail!("server.max_body_bytes must be >= ingest.max_file_bytes");
    }

    Ok(())
}
