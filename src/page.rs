//! Page-level controller: form state plus the generate and ingest flows.
//!
//! The page has two forms. The prompt form sends text to `POST /api` and
//! shows the markdown answer. The ingestion form works in one of two modes:
//! URL (`POST /ingest`) or file (`POST /ingest-file`, capped at
//! [`DEFAULT_MAX_FILE_BYTES`](crate::config::DEFAULT_MAX_FILE_BYTES)).
//!
//! # In-flight Requests
//!
//! Each form allows one outstanding request. The busy flag is tested and set
//! under the state lock before the request starts, so a second submission
//! racing the first is [`Outcome::Suppressed`] without touching the backend.
//! The lock is never held across an await. The flag is cleared together with the
//! result, or by a drop guard when a caller abandons the future, so the form
//! never stays stuck.
//!
//! # Errors
//!
//! Backend failures never escape: the message is stored in the form's
//! result field as `"Error: <message>"`.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::client::{Backend, ClientError, UploadFile};

pub const NO_FILE_SELECTED: &str = "Please select a file to ingest.";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Which ingestion input the form currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    #[default]
    Url,
    File,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::Url => "url",
            IngestMode::File => "file",
        }
    }
}

impl std::str::FromStr for IngestMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "url" => Ok(IngestMode::Url),
            "file" => Ok(IngestMode::File),
            other => anyhow::bail!("unknown ingest mode: '{}'", other),
        }
    }
}

/// Everything the page shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageState {
    pub prompt: String,
    /// Markdown answer from the last generate request, or `"Error: ..."`.
    pub answer: String,
    pub is_loading: bool,
    pub ingest_mode: IngestMode,
    pub ingest_url: String,
    pub ingest_file: Option<UploadFile>,
    /// Backend reply to the last ingestion, or `"Error: ..."`.
    pub ingestion_response: String,
    /// Validation message shown before any request is made.
    pub ingestion_error: String,
    pub is_ingesting: bool,
    /// Bumped whenever a rejected file must be cleared from the file input.
    pub file_input_key: u64,
}

impl PageState {
    pub fn is_busy(&self) -> bool {
        self.is_loading || self.is_ingesting
    }
}

/// What a submission did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request was sent and the backend answered with success.
    Completed,
    /// The request was sent and failed; the error text is on the page.
    Failed,
    /// Validation failed; nothing was sent.
    Rejected,
    /// Another request for the same form was in flight; nothing was sent.
    Suppressed,
    /// The button belonged to the other ingest mode; the form switched modes.
    ModeSwitched,
    /// The request was handed to a background task.
    Started,
}

/// Message shown when a file exceeds `max_bytes`.
pub fn file_too_large_message(max_bytes: u64) -> String {
    if max_bytes % BYTES_PER_MB == 0 {
        format!("File size cannot exceed {} MB.", max_bytes / BYTES_PER_MB)
    } else {
        format!(
            "File size cannot exceed {:.1} MB.",
            max_bytes as f64 / BYTES_PER_MB as f64
        )
    }
}

fn error_text(err: &ClientError) -> String {
    format!("Error: {}", err)
}

#[derive(Debug, Clone, Copy)]
enum Form {
    Generate,
    Ingest,
}

impl Form {
    fn clear_busy(self, state: &mut PageState) {
        match self {
            Form::Generate => state.is_loading = false,
            Form::Ingest => state.is_ingesting = false,
        }
    }
}

/// Clears a form's busy flag when dropped, unless [`finish`](Self::finish)
/// already did so together with the result.
struct InFlight<'a> {
    state: &'a Mutex<PageState>,
    form: Form,
    armed: bool,
}

impl InFlight<'_> {
    fn finish(mut self, state: &mut PageState) {
        self.form.clear_busy(state);
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.form.clear_busy(&mut lock(self.state));
        }
    }
}

fn lock(state: &Mutex<PageState>) -> MutexGuard<'_, PageState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A request that passed validation and holds its form's busy flag.
#[derive(Debug)]
enum Job {
    Generate(String),
    IngestUrl(String),
    IngestFile(UploadFile),
}

impl Job {
    fn form(&self) -> Form {
        match self {
            Job::Generate(_) => Form::Generate,
            Job::IngestUrl(_) | Job::IngestFile(_) => Form::Ingest,
        }
    }
}

/// One post of the ingestion form.
#[derive(Debug, Default)]
pub struct IngestForm {
    /// The pressed button; `None` runs the current mode.
    pub button: Option<IngestMode>,
    /// The URL input, present in URL mode.
    pub url: Option<String>,
    /// The file input, present in file mode; `Some(None)` when it is empty.
    pub file: Option<Option<UploadFile>>,
}

/// Holds the page state and runs the three request/response flows.
pub struct PageController {
    backend: Arc<dyn Backend>,
    max_file_bytes: u64,
    state: Mutex<PageState>,
}

impl PageController {
    pub fn new(backend: Arc<dyn Backend>, max_file_bytes: u64) -> Self {
        Self {
            backend,
            max_file_bytes,
            state: Mutex::new(PageState::default()),
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// A copy of the current state, for rendering.
    pub fn snapshot(&self) -> PageState {
        lock(&self.state).clone()
    }

    pub fn set_prompt(&self, text: &str) {
        lock(&self.state).prompt = text.to_string();
    }

    pub fn set_ingest_url(&self, url: &str) {
        lock(&self.state).ingest_url = url.to_string();
    }

    pub fn set_ingest_mode(&self, mode: IngestMode) {
        lock(&self.state).ingest_mode = mode;
    }

    /// Records the file input's selection.
    ///
    /// A file over the cap is refused with a fixed message, the file input
    /// is reset, and [`Outcome::Rejected`] is returned.
    pub fn select_file(&self, file: Option<UploadFile>) -> Outcome {
        self.select_file_in(&mut lock(&self.state), file)
    }

    fn select_file_in(&self, state: &mut PageState, file: Option<UploadFile>) -> Outcome {
        state.ingestion_error.clear();

        let Some(file) = file else {
            state.ingest_file = None;
            return Outcome::Completed;
        };

        if file.size() > self.max_file_bytes {
            debug!(name = %file.name, size = file.size(), "file over the size cap");
            state.ingestion_error = file_too_large_message(self.max_file_bytes);
            state.ingest_file = None;
            state.file_input_key += 1;
            return Outcome::Rejected;
        }

        state.ingest_file = Some(file);
        Outcome::Completed
    }

    /// Applies one post of the ingestion form: the inputs it carried, then
    /// the pressed button, with the request on a background task.
    ///
    /// While an ingestion runs the whole post is suppressed and the inputs
    /// are left untouched. A rejected file stops the submission unless the
    /// button belongs to the other mode, which still switches modes.
    pub fn spawn_ingest_form(self: &Arc<Self>, form: IngestForm) -> Outcome {
        {
            let mut state = lock(&self.state);
            if state.is_ingesting {
                debug!("ingestion already in flight; form post ignored");
                return Outcome::Suppressed;
            }
            if let Some(url) = form.url {
                state.ingest_url = url;
            }
            if let Some(selection) = form.file {
                let selected = self.select_file_in(&mut state, selection);
                let switches_mode = form.button.is_some_and(|mode| mode != state.ingest_mode);
                if selected == Outcome::Rejected && !switches_mode {
                    return Outcome::Rejected;
                }
            }
        }
        self.spawn_ingest(form.button)
    }

    /// Sends `text` to the generate endpoint. Empty text is sent as-is.
    pub async fn submit_prompt(&self, text: &str) -> Outcome {
        match self.begin_prompt(text) {
            Ok(job) => self.run(job).await,
            Err(outcome) => outcome,
        }
    }

    /// Sends `url` to the ingest endpoint.
    pub async fn ingest_url(&self, url: &str) -> Outcome {
        self.set_ingest_url(url);
        match self.begin_ingest(IngestMode::Url) {
            Ok(job) => self.run(job).await,
            Err(outcome) => outcome,
        }
    }

    /// Uploads the selected file to the ingest-file endpoint.
    pub async fn ingest_file(&self) -> Outcome {
        match self.begin_ingest(IngestMode::File) {
            Ok(job) => self.run(job).await,
            Err(outcome) => outcome,
        }
    }

    /// Runs the flow for the current mode, as pressing enter in the form does.
    pub async fn submit_ingest(&self) -> Outcome {
        let mode = lock(&self.state).ingest_mode;
        match self.begin_ingest(mode) {
            Ok(job) => self.run(job).await,
            Err(outcome) => outcome,
        }
    }

    /// Handles a click on one of the two ingest buttons.
    ///
    /// The button of the inactive mode only switches the form to that mode.
    pub async fn press_ingest_button(&self, mode: IngestMode) -> Outcome {
        match self.begin_button(mode) {
            Ok(job) => self.run(job).await,
            Err(outcome) => outcome,
        }
    }

    /// Like [`submit_prompt`](Self::submit_prompt), but the request runs on a
    /// background task. The busy flag is already set when this returns.
    pub fn spawn_prompt(self: &Arc<Self>, text: &str) -> Outcome {
        let job = self.begin_prompt(text);
        self.spawn(job)
    }

    /// Background variant of [`press_ingest_button`](Self::press_ingest_button);
    /// `None` runs the current mode like [`submit_ingest`](Self::submit_ingest).
    pub fn spawn_ingest(self: &Arc<Self>, button: Option<IngestMode>) -> Outcome {
        let job = match button {
            Some(mode) => self.begin_button(mode),
            None => {
                let mode = lock(&self.state).ingest_mode;
                self.begin_ingest(mode)
            }
        };
        self.spawn(job)
    }

    fn spawn(self: &Arc<Self>, job: Result<Job, Outcome>) -> Outcome {
        match job {
            Ok(job) => {
                let page = Arc::clone(self);
                tokio::spawn(async move {
                    page.run(job).await;
                });
                Outcome::Started
            }
            Err(outcome) => outcome,
        }
    }

    fn begin_prompt(&self, text: &str) -> Result<Job, Outcome> {
        let mut state = lock(&self.state);
        if state.is_loading {
            debug!("generate already in flight; submission suppressed");
            return Err(Outcome::Suppressed);
        }
        state.prompt = text.to_string();
        state.answer.clear();
        state.is_loading = true;
        Ok(Job::Generate(text.to_string()))
    }

    fn begin_button(&self, mode: IngestMode) -> Result<Job, Outcome> {
        {
            let mut state = lock(&self.state);
            // Both buttons are disabled while an ingestion runs.
            if state.is_ingesting {
                return Err(Outcome::Suppressed);
            }
            if state.ingest_mode != mode {
                state.ingest_mode = mode;
                return Err(Outcome::ModeSwitched);
            }
        }
        self.begin_ingest(mode)
    }

    fn begin_ingest(&self, mode: IngestMode) -> Result<Job, Outcome> {
        let mut state = lock(&self.state);
        if state.is_ingesting {
            debug!("ingestion already in flight; submission suppressed");
            return Err(Outcome::Suppressed);
        }

        let job = match mode {
            IngestMode::Url => Job::IngestUrl(state.ingest_url.clone()),
            IngestMode::File => {
                let Some(file) = state.ingest_file.clone() else {
                    state.ingestion_error = NO_FILE_SELECTED.to_string();
                    return Err(Outcome::Rejected);
                };
                if file.size() > self.max_file_bytes {
                    state.ingestion_error = file_too_large_message(self.max_file_bytes);
                    return Err(Outcome::Rejected);
                }
                Job::IngestFile(file)
            }
        };

        state.ingestion_response.clear();
        state.ingestion_error.clear();
        state.is_ingesting = true;
        Ok(job)
    }

    /// Sends a job whose busy flag is already set, then stores the result.
    ///
    /// The result is stored and the flag cleared under one lock, so a
    /// snapshot never shows a result while the form is still busy.
    #[instrument(skip_all, fields(form = ?job.form()))]
    async fn run(&self, job: Job) -> Outcome {
        let in_flight = InFlight {
            state: &self.state,
            form: job.form(),
            armed: true,
        };

        match job {
            Job::Generate(text) => {
                let result = self.backend.generate(&text).await;
                let mut state = lock(&self.state);
                in_flight.finish(&mut state);
                match result {
                    Ok(answer) => {
                        info!(bytes = answer.len(), "answer received");
                        state.answer = answer;
                        Outcome::Completed
                    }
                    Err(err) => {
                        warn!(error = %err, "generate failed");
                        state.answer = error_text(&err);
                        Outcome::Failed
                    }
                }
            }
            Job::IngestUrl(url) => {
                let result = self.backend.ingest_url(&url).await;
                self.store_ingestion(in_flight, result)
            }
            Job::IngestFile(file) => {
                let result = self.backend.ingest_file(file).await;
                self.store_ingestion(in_flight, result)
            }
        }
    }

    fn store_ingestion(
        &self,
        in_flight: InFlight<'_>,
        result: Result<String, ClientError>,
    ) -> Outcome {
        let mut state = lock(&self.state);
        in_flight.finish(&mut state);
        match result {
            Ok(status) => {
                info!(bytes = status.len(), "ingestion accepted");
                state.ingestion_response = status;
                Outcome::Completed
            }
            Err(err) => {
                warn!(error = %err, "ingestion failed");
                state.ingestion_response = error_text(&err);
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Generate(String),
        IngestUrl(String),
        IngestFile(String, usize),
    }

    /// Holds every request until released, so tests can observe the busy state.
    struct Gate {
        started: Semaphore,
        release: Semaphore,
    }

    impl Gate {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Semaphore::new(0),
                release: Semaphore::new(0),
            })
        }

        async fn wait_started(&self) {
            self.started.acquire().await.unwrap().forget();
        }

        fn release(&self, n: usize) {
            self.release.add_permits(n);
        }
    }

    struct FakeBackend {
        calls: Mutex<Vec<Call>>,
        failure: Option<(u16, String)>,
        gate: Option<Arc<Gate>>,
    }

    impl FakeBackend {
        fn ok() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failure: None,
                gate: None,
            }
        }

        fn failing(status: u16, body: &str) -> Self {
            Self {
                failure: Some((status, body.to_string())),
                ..Self::ok()
            }
        }

        fn gated(gate: Arc<Gate>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::ok()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        async fn answer(&self, call: Call) -> Result<String, ClientError> {
            let reply = match &call {
                Call::Generate(text) => format!("answer to '{}'", text),
                Call::IngestUrl(url) => format!("ingested {}", url),
                Call::IngestFile(name, _) => format!("ingested file {}", name),
            };
            self.calls.lock().unwrap().push(call);
            if let Some(gate) = &self.gate {
                gate.started.add_permits(1);
                gate.release.acquire().await.unwrap().forget();
            }
            match &self.failure {
                Some((status, body)) => Err(ClientError::Status {
                    status: *status,
                    body: body.clone(),
                }),
                None => Ok(reply),
            }
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn generate(&self, text: &str) -> Result<String, ClientError> {
            self.answer(Call::Generate(text.to_string())).await
        }
        async fn ingest_url(&self, url: &str) -> Result<String, ClientError> {
            self.answer(Call::IngestUrl(url.to_string())).await
        }
        async fn ingest_file(&self, file: UploadFile) -> Result<String, ClientError> {
            self.answer(Call::IngestFile(file.name.clone(), file.bytes.len()))
                .await
        }
    }

    const CAP: u64 = 5 * 1024 * 1024;

    fn controller(backend: &Arc<FakeBackend>) -> PageController {
        PageController::new(backend.clone(), CAP)
    }

    fn file_of(size: usize) -> UploadFile {
        UploadFile::new("notes.md", vec![b'x'; size])
    }

    #[test]
    fn test_file_too_large_message() {
        assert_eq!(file_too_large_message(CAP), "File size cannot exceed 5 MB.");
        assert_eq!(
            file_too_large_message(1536 * 1024),
            "File size cannot exceed 1.5 MB."
        );
    }

    #[test]
    fn test_ingest_mode_parse() {
        assert_eq!("url".parse::<IngestMode>().unwrap(), IngestMode::Url);
        assert_eq!("file".parse::<IngestMode>().unwrap(), IngestMode::File);
        assert!("ftp".parse::<IngestMode>().is_err());
    }

    #[tokio::test]
    async fn test_submit_prompt_stores_answer() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);

        assert_eq!(page.submit_prompt("rust?").await, Outcome::Completed);

        let state = page.snapshot();
        assert_eq!(state.answer, "answer to 'rust?'");
        assert_eq!(state.prompt, "rust?");
        assert!(!state.is_loading);
        assert_eq!(backend.calls(), vec![Call::Generate("rust?".into())]);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_still_sent() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);

        page.submit_prompt("").await;
        assert_eq!(backend.calls(), vec![Call::Generate(String::new())]);
    }

    #[tokio::test]
    async fn test_duplicate_prompt_suppressed_while_in_flight() {
        let gate = Gate::new();
        let backend = Arc::new(FakeBackend::gated(gate.clone()));
        let page = Arc::new(controller(&backend));

        let first = {
            let page = page.clone();
            tokio::spawn(async move { page.submit_prompt("one").await })
        };
        gate.wait_started().await;

        assert!(page.snapshot().is_loading);
        assert_eq!(page.submit_prompt("two").await, Outcome::Suppressed);
        assert_eq!(page.submit_prompt("").await, Outcome::Suppressed);

        gate.release(1);
        assert_eq!(first.await.unwrap(), Outcome::Completed);
        assert_eq!(backend.calls(), vec![Call::Generate("one".into())]);
        assert!(!page.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_abandoned_request_clears_busy_flag() {
        let gate = Gate::new();
        let backend = Arc::new(FakeBackend::gated(gate.clone()));
        let page = Arc::new(controller(&backend));

        let pending = {
            let page = page.clone();
            tokio::spawn(async move { page.ingest_url("https://a.dev").await })
        };
        gate.wait_started().await;
        assert!(page.snapshot().is_ingesting);

        pending.abort();
        let _ = pending.await;
        assert!(!page.snapshot().is_ingesting);
    }

    #[tokio::test]
    async fn test_backend_error_is_shown_not_raised() {
        let backend = Arc::new(FakeBackend::failing(500, "vector store offline"));
        let page = controller(&backend);

        assert_eq!(page.submit_prompt("hi").await, Outcome::Failed);
        assert_eq!(page.snapshot().answer, "Error: vector store offline");

        assert_eq!(page.ingest_url("https://a.dev").await, Outcome::Failed);
        assert_eq!(
            page.snapshot().ingestion_response,
            "Error: vector store offline"
        );
    }

    #[tokio::test]
    async fn test_error_without_body_uses_status() {
        let backend = Arc::new(FakeBackend::failing(503, ""));
        let page = controller(&backend);

        page.submit_prompt("hi").await;
        assert_eq!(page.snapshot().answer, "Error: Request failed (503)");
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_without_request() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);
        page.set_ingest_mode(IngestMode::File);

        assert_eq!(
            page.select_file(Some(file_of(CAP as usize + 1))),
            Outcome::Rejected
        );
        let state = page.snapshot();
        assert_eq!(state.ingestion_error, "File size cannot exceed 5 MB.");
        assert!(state.ingest_file.is_none());
        assert_eq!(state.file_input_key, 1);

        assert_eq!(page.ingest_file().await, Outcome::Rejected);
        assert_eq!(page.snapshot().ingestion_error, NO_FILE_SELECTED);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_file_at_cap_is_uploaded() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);

        assert_eq!(page.select_file(Some(file_of(CAP as usize))), Outcome::Completed);
        assert_eq!(page.ingest_file().await, Outcome::Completed);
        assert_eq!(
            backend.calls(),
            vec![Call::IngestFile("notes.md".into(), CAP as usize)]
        );
        assert_eq!(page.snapshot().ingestion_response, "ingested file notes.md");
    }

    #[tokio::test]
    async fn test_ingest_without_file_asks_for_one() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);

        assert_eq!(page.ingest_file().await, Outcome::Rejected);
        assert_eq!(page.snapshot().ingestion_error, NO_FILE_SELECTED);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_selecting_clears_previous_error() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);

        page.select_file(Some(file_of(CAP as usize + 10)));
        assert!(!page.snapshot().ingestion_error.is_empty());

        assert_eq!(page.select_file(Some(file_of(10))), Outcome::Completed);
        assert!(page.snapshot().ingestion_error.is_empty());
    }

    #[tokio::test]
    async fn test_other_mode_button_only_switches() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);
        page.set_ingest_url("https://a.dev");

        assert_eq!(
            page.press_ingest_button(IngestMode::File).await,
            Outcome::ModeSwitched
        );
        assert_eq!(page.snapshot().ingest_mode, IngestMode::File);
        assert!(backend.calls().is_empty());

        assert_eq!(
            page.press_ingest_button(IngestMode::Url).await,
            Outcome::ModeSwitched
        );
        assert_eq!(
            page.press_ingest_button(IngestMode::Url).await,
            Outcome::Completed
        );
        assert_eq!(backend.calls(), vec![Call::IngestUrl("https://a.dev".into())]);
    }

    #[tokio::test]
    async fn test_submit_ingest_follows_mode() {
        let backend = Arc::new(FakeBackend::ok());
        let page = controller(&backend);
        page.set_ingest_url("https://a.dev");

        page.submit_ingest().await;
        page.set_ingest_mode(IngestMode::File);
        page.select_file(Some(file_of(3)));
        page.submit_ingest().await;

        assert_eq!(
            backend.calls(),
            vec![
                Call::IngestUrl("https://a.dev".into()),
                Call::IngestFile("notes.md".into(), 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_ingestion_clears_previous_result() {
        let gate = Gate::new();
        let backend = Arc::new(FakeBackend::gated(gate.clone()));
        let page = Arc::new(controller(&backend));

        gate.release(1);
        page.ingest_url("https://a.dev").await;
        gate.wait_started().await;
        assert_eq!(page.snapshot().ingestion_response, "ingested https://a.dev");

        let pending = {
            let page = page.clone();
            tokio::spawn(async move { page.ingest_url("https://b.dev").await })
        };
        gate.wait_started().await;
        assert!(page.snapshot().ingestion_response.is_empty());

        gate.release(1);
        pending.await.unwrap();
        assert_eq!(page.snapshot().ingestion_response, "ingested https://b.dev");
    }

    #[tokio::test]
    async fn test_generate_and_ingest_are_independent() {
        let gate = Gate::new();
        let backend = Arc::new(FakeBackend::gated(gate.clone()));
        let page = Arc::new(controller(&backend));

        let generating = {
            let page = page.clone();
            tokio::spawn(async move { page.submit_prompt("q").await })
        };
        gate.wait_started().await;

        let ingesting = {
            let page = page.clone();
            tokio::spawn(async move { page.ingest_url("https://a.dev").await })
        };
        gate.wait_started().await;

        let state = page.snapshot();
        assert!(state.is_loading && state.is_ingesting);

        gate.release(2);
        assert_eq!(generating.await.unwrap(), Outcome::Completed);
        assert_eq!(ingesting.await.unwrap(), Outcome::Completed);
    }

    #[tokio::test]
    async fn test_spawned_prompt_marks_busy_before_returning() {
        let gate = Gate::new();
        let backend = Arc::new(FakeBackend::gated(gate.clone()));
        let page = Arc::new(controller(&backend));

        assert_eq!(page.spawn_prompt("bg"), Outcome::Started);
        assert!(page.snapshot().is_loading);
        assert_eq!(page.spawn_prompt("again"), Outcome::Suppressed);

        gate.wait_started().await;
        gate.release(1);
        while page.snapshot().is_loading {
            tokio::task::yield_now().await;
        }
        assert_eq!(page.snapshot().answer, "answer to 'bg'");
        assert_eq!(backend.calls(), vec![Call::Generate("bg".into())]);
    }

    #[tokio::test]
    async fn test_spawned_ingest_rejects_synchronously() {
        let backend = Arc::new(FakeBackend::ok());
        let page = Arc::new(controller(&backend));
        page.set_ingest_mode(IngestMode::File);

        assert_eq!(page.spawn_ingest(None), Outcome::Rejected);
        assert_eq!(page.spawn_ingest(Some(IngestMode::Url)), Outcome::ModeSwitched);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_file_upload_error_is_shown_not_raised() {
        let backend = Arc::new(FakeBackend::failing(500, "parser crashed"));
        let page = controller(&backend);

        assert_eq!(page.select_file(Some(file_of(10))), Outcome::Completed);
        assert_eq!(page.ingest_file().await, Outcome::Failed);

        let state = page.snapshot();
        assert_eq!(state.ingestion_response, "Error: parser crashed");
        assert!(!state.is_ingesting);
        assert_eq!(backend.calls(), vec![Call::IngestFile("notes.md".into(), 10)]);
    }

    #[tokio::test]
    async fn test_oversized_file_with_other_button_still_switches_mode() {
        let backend = Arc::new(FakeBackend::ok());
        let page = Arc::new(controller(&backend));
        page.set_ingest_mode(IngestMode::File);

        let outcome = page.spawn_ingest_form(IngestForm {
            button: Some(IngestMode::Url),
            url: None,
            file: Some(Some(file_of(CAP as usize + 1))),
        });
        assert_eq!(outcome, Outcome::ModeSwitched);

        let state = page.snapshot();
        assert_eq!(state.ingest_mode, IngestMode::Url);
        assert_eq!(state.ingestion_error, "File size cannot exceed 5 MB.");
        assert_eq!(state.file_input_key, 1);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_file_with_own_button_is_rejected() {
        let backend = Arc::new(FakeBackend::ok());
        let page = Arc::new(controller(&backend));
        page.set_ingest_mode(IngestMode::File);

        for button in [Some(IngestMode::File), None] {
            let outcome = page.spawn_ingest_form(IngestForm {
                button,
                url: None,
                file: Some(Some(file_of(CAP as usize + 1))),
            });
            assert_eq!(outcome, Outcome::Rejected);
        }

        let state = page.snapshot();
        assert_eq!(state.ingest_mode, IngestMode::File);
        assert!(!state.is_ingesting);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_form_post_while_ingesting_leaves_inputs_alone() {
        let gate = Gate::new();
        let backend = Arc::new(FakeBackend::gated(gate.clone()));
        let page = Arc::new(controller(&backend));

        let outcome = page.spawn_ingest_form(IngestForm {
            button: Some(IngestMode::Url),
            url: Some("https://a.dev".into()),
            file: None,
        });
        assert_eq!(outcome, Outcome::Started);
        gate.wait_started().await;

        let stale = page.spawn_ingest_form(IngestForm {
            button: None,
            url: Some("https://b.dev".into()),
            file: Some(Some(file_of(CAP as usize + 1))),
        });
        assert_eq!(stale, Outcome::Suppressed);

        let state = page.snapshot();
        assert_eq!(state.ingest_url, "https://a.dev");
        assert_eq!(state.file_input_key, 0);
        assert!(state.ingestion_error.is_empty());
        assert!(state.is_ingesting);

        gate.release(1);
        while page.snapshot().is_ingesting {
            tokio::task::yield_now().await;
        }
        assert_eq!(page.snapshot().ingestion_response, "ingested https://a.dev");
        assert_eq!(backend.calls(), vec![Call::IngestUrl("https://a.dev".into())]);
    }
}
