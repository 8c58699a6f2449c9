//! Page host and reverse proxy.
//!
//! Serves the server-rendered page and forwards the three backend paths,
//! unchanged, to `[backend].base_url`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Render the page |
//! | `GET`  | `/page.css` | Page stylesheet |
//! | `POST` | `/actions/generate` | Prompt form (`text`); 303 back to `/` |
//! | `POST` | `/actions/ingest` | Ingestion form (multipart: `button`, `url`, `file`); 303 back to `/` |
//! | `POST` | `/api` | Proxied to the backend |
//! | `POST` | `/ingest` | Proxied to the backend |
//! | `POST` | `/ingest-file` | Proxied to the backend |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Form actions start the backend request on a background task and redirect
//! immediately; the page shows the busy state until the result is stored.
//!
//! # Error Contract
//!
//! Malformed form posts, including text fields over
//! [`MAX_TEXT_FIELD_BYTES`], get a JSON error body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid multipart body: ..." } }
//! ```
//!
//! A backend the proxy cannot reach yields `502 Bad Gateway` as plain text.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::client::{
    Backend, BackendClient, UploadFile, GENERATE_PATH, INGEST_FILE_PATH, INGEST_URL_PATH,
};
use crate::config::Config;
use crate::page::{IngestForm, IngestMode, PageController};
use crate::render::{render_page, STYLESHEET, SUBMIT_CURRENT_MODE};

/// Largest `url` or `button` value the ingest action accepts.
pub const MAX_TEXT_FIELD_BYTES: usize = 8 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    page: Arc<PageController>,
    proxy: Arc<Proxy>,
}

/// Forwards requests unchanged to the backend.
struct Proxy {
    http: reqwest::Client,
    base_url: String,
}

/// Starts the page server with the HTTP backend client.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let backend = Arc::new(BackendClient::new(&config.backend)?);
    run_server_with_backend(config, backend).await
}

/// Starts the page server with a caller-supplied [`Backend`] for the page's
/// own requests. The proxy routes always use `[backend].base_url`.
pub async fn run_server_with_backend(
    config: &Config,
    backend: Arc<dyn Backend>,
) -> anyhow::Result<()> {
    let app = router(config, backend)?;

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        bind = %config.server.bind,
        backend = %config.backend.base_url,
        "page server listening"
    );
    println!("Page server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the application router.
pub fn router(config: &Config, backend: Arc<dyn Backend>) -> anyhow::Result<Router> {
    let page = Arc::new(PageController::new(backend, config.ingest.max_file_bytes));
    let proxy = Proxy {
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backend.timeout_secs))
            .build()?,
        base_url: config.backend.base_url.trim_end_matches('/').to_string(),
    };
    let state = AppState {
        page,
        proxy: Arc::new(proxy),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let proxied = Router::new()
        .route(GENERATE_PATH, post(handle_proxy))
        .route(INGEST_URL_PATH, post(handle_proxy))
        .route(INGEST_FILE_PATH, post(handle_proxy))
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(cors);

    let app = Router::new()
        .route("/", get(handle_page))
        .route("/page.css", get(handle_stylesheet))
        .route("/actions/generate", post(handle_generate))
        // The file field is streamed and capped by hand so oversized uploads
        // reach the size check instead of failing with 413.
        .route(
            "/actions/ingest",
            post(handle_ingest).layer(DefaultBodyLimit::disable()),
        )
        .route("/health", get(handle_health))
        .merge(proxied)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Page ============

async fn handle_page(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.page.snapshot()))
}

async fn handle_stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLESHEET,
    )
}

#[derive(Deserialize)]
struct GenerateForm {
    #[serde(default)]
    text: String,
}

async fn handle_generate(
    State(state): State<AppState>,
    Form(form): Form<GenerateForm>,
) -> Redirect {
    let outcome = state.page.spawn_prompt(&form.text);
    debug!(?outcome, "generate form submitted");
    Redirect::to("/")
}

/// Handler for the ingestion form.
///
/// The `button` field says which button was pressed: `url`, `file`, or the
/// hidden default button used for implicit submission. A `file` field is
/// present only when the form was rendered in file mode.
async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let cap = state.page.max_file_bytes();

    let mut button: Option<String> = None;
    let mut url: Option<String> = None;
    let mut file: Option<Option<UploadFile>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "button" => button = Some(read_text_field(field).await?),
            "url" => url = Some(read_text_field(field).await?),
            "file" => file = Some(read_file_field(field, cap).await?),
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    let button = match button.as_deref() {
        None | Some(SUBMIT_CURRENT_MODE) => None,
        Some(value) => Some(
            value
                .parse::<IngestMode>()
                .map_err(|e| bad_request(e.to_string()))?,
        ),
    };

    let outcome = state.page.spawn_ingest_form(IngestForm { button, url, file });
    debug!(?outcome, "ingestion form submitted");
    Ok(Redirect::to("/"))
}

/// Reads a text field of at most [`MAX_TEXT_FIELD_BYTES`].
///
/// The ingest action has no body limit, so text fields are bounded here.
async fn read_text_field(mut field: Field<'_>) -> Result<String, AppError> {
    let name = field.name().unwrap_or_default().to_string();
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| bad_request(format!("invalid form field: {}", e)))?
    {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(bad_request(format!(
                "form field '{}' exceeds {} bytes",
                name, MAX_TEXT_FIELD_BYTES
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes)
        .map_err(|_| bad_request(format!("form field '{}' is not valid UTF-8", name)))
}

/// Reads an uploaded file, keeping at most `cap + 1` bytes.
///
/// A file over the cap therefore still reports a size over the cap while the
/// rest of the upload is drained and discarded. An empty file input (no file
/// name) yields `None`.
async fn read_file_field(mut field: Field<'_>, cap: u64) -> Result<Option<UploadFile>, AppError> {
    let name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(|s| s.to_string());
    let keep = usize::try_from(cap.saturating_add(1)).unwrap_or(usize::MAX);

    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| bad_request(format!("failed to read uploaded file: {}", e)))?
    {
        let room = keep.saturating_sub(bytes.len());
        bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    if name.is_empty() {
        return Ok(None);
    }

    let mut upload = UploadFile::new(name, bytes);
    if let Some(content_type) = content_type {
        upload = upload.with_content_type(content_type);
    }
    Ok(Some(upload))
}

// ============ Reverse proxy ============

/// Forwards a POST to the same path on the backend.
///
/// The body and `content-type` go through unchanged; the backend's status,
/// `content-type` and body come back unchanged.
async fn handle_proxy(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let target = format!("{}{}", state.proxy.base_url, path);

    let mut request = state.proxy.http.post(&target).body(body);
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type.clone());
    }

    let upstream = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(target = %target, error = %e, "backend unreachable");
            return bad_gateway(&e);
        }
    };

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    let body = match upstream.bytes().await {
        Ok(body) => body,
        Err(e) => {
            warn!(target = %target, error = %e, "backend response interrupted");
            return bad_gateway(&e);
        }
    };
    debug!(target = %target, status = status.as_u16(), bytes = body.len(), "proxied");

    let mut response = (status, body).into_response();
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}

fn bad_gateway(err: &reqwest::Error) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        format!("Backend unavailable: {}", err),
    )
        .into_response()
}
