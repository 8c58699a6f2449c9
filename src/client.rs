//! HTTP client for the RAG backend.
//!
//! The backend exposes exactly three endpoints:
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `POST` | `/api` | `{ "text": ... }` | markdown answer |
//! | `POST` | `/ingest` | `{ "url": ... }` | status text |
//! | `POST` | `/ingest-file` | multipart, field `file` | status text |
//!
//! # Error Convention
//!
//! Every call is a single attempt. A non-2xx response becomes
//! [`ClientError::Status`] carrying the response body; a connection or
//! timeout failure becomes [`ClientError::Transport`]. The `Display` of
//! either is the exact text shown to the user.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::BackendConfig;

pub const GENERATE_PATH: &str = "/api";
pub const INGEST_URL_PATH: &str = "/ingest";
pub const INGEST_FILE_PATH: &str = "/ingest-file";

/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The backend answered with a non-success status.
    #[error("{}", status_message(.status, .body))]
    Status { status: u16, body: String },
    /// The request never produced a response.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

fn status_message(status: &u16, body: &str) -> String {
    if body.is_empty() {
        format!("Request failed ({})", status)
    } else {
        body.to_string()
    }
}

/// A file picked for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The three backend operations the page depends on.
///
/// [`BackendClient`] is the HTTP implementation; tests substitute their own.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, text: &str) -> Result<String, ClientError>;
    async fn ingest_url(&self, url: &str) -> Result<String, ClientError>;
    async fn ingest_file(&self, file: UploadFile) -> Result<String, ClientError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct IngestUrlRequest<'a> {
    url: &'a str,
}

/// reqwest-backed [`Backend`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("ragc/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Reads the body as text and maps non-success statuses to [`ClientError::Status`].
async fn read_text(resp: reqwest::Response) -> Result<String, ClientError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        warn!(status = status.as_u16(), "backend returned an error status");
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    debug!(bytes = body.len(), "backend response received");
    Ok(body)
}

#[async_trait]
impl Backend for BackendClient {
    #[instrument(skip_all, fields(len = text.len()))]
    async fn generate(&self, text: &str) -> Result<String, ClientError> {
        let resp = self
            .http
            .post(self.endpoint(GENERATE_PATH))
            .json(&GenerateRequest { text })
            .send()
            .await?;
        read_text(resp).await
    }

    #[instrument(skip(self))]
    async fn ingest_url(&self, url: &str) -> Result<String, ClientError> {
        let resp = self
            .http
            .post(self.endpoint(INGEST_URL_PATH))
            .json(&IngestUrlRequest { url })
            .send()
            .await?;
        read_text(resp).await
    }

    #[instrument(skip_all, fields(name = %file.name, size = file.size()))]
    async fn ingest_file(&self, file: UploadFile) -> Result<String, ClientError> {
        let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.endpoint(INGEST_FILE_PATH))
            .multipart(form)
            .send()
            .await?;
        read_text(resp).await
    }
}
