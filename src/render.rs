//! Server-side rendering of the page.
//!
//! The page is plain HTML forms, so it works without client script. While a
//! request is in flight it refreshes itself every [`BUSY_REFRESH_SECS`]
//! seconds so the answer shows up once the backend replies.

use crate::markdown::{escape, render_markdown};
use crate::page::{IngestMode, PageState};

pub const PAGE_TITLE: &str = "Personal RAG Agent";
pub const BUSY_REFRESH_SECS: u64 = 2;

/// Styles for the utility classes used by the page and the markdown helper.
pub const STYLESHEET: &str = include_str!("../assets/page.css");

const FORM_CLASS: &str = "w-full max-w-2xl p-6 bg-white dark:bg-gray-800 border border-gray-300 dark:border-gray-600 rounded-lg shadow-sm space-y-4";
const INPUT_CLASS: &str = "w-full px-3 py-2 border border-gray-300 dark:border-gray-600 rounded-md bg-transparent text-gray-900 dark:text-gray-100";
const BUTTON_CLASS: &str = "inline-flex items-center gap-2 px-4 py-2 rounded-md text-white disabled:opacity-60 disabled:cursor-not-allowed";
const SPINNER: &str = "<span class=\"h-4 w-4 rounded-full border-2 border-white/40 border-t-white animate-spin\" aria-hidden=\"true\"></span>";
const RESULT_CLASS: &str = "text-gray-900 dark:text-gray-100";

/// Value of the hidden default button: pressing enter runs the current mode.
pub const SUBMIT_CURRENT_MODE: &str = "submit";

fn disabled(flag: bool) -> &'static str {
    if flag {
        " disabled"
    } else {
        ""
    }
}

/// Renders the whole page for `state`.
pub fn render_page(state: &PageState) -> String {
    let refresh = if state.is_busy() {
        format!(
            "<meta http-equiv=\"refresh\" content=\"{}\">\n",
            BUSY_REFRESH_SECS
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
{refresh}<title>{title}</title>
<link rel="stylesheet" href="/page.css">
</head>
<body>
<main class="p-8 font-sans">
<h1 class="text-3xl font-bold mb-4">{title}</h1>
{generate}
{ingest}
</main>
</body>
</html>
"#,
        refresh = refresh,
        title = PAGE_TITLE,
        generate = render_generate_form(state),
        ingest = render_ingest_form(state),
    )
}

fn render_generate_form(state: &PageState) -> String {
    let mut html = format!(
        "<form method=\"post\" action=\"/actions/generate\" class=\"{}\" aria-busy=\"{}\">\n",
        FORM_CLASS, state.is_loading
    );
    html.push_str(&format!(
        "<input type=\"text\" name=\"text\" value=\"{}\" placeholder=\"Describe your idea...\" class=\"{}\">\n",
        escape(&state.prompt),
        INPUT_CLASS
    ));
    html.push_str(&format!(
        "<button type=\"submit\"{} class=\"{} bg-blue-600 hover:bg-blue-700\">{}{}</button>\n",
        disabled(state.is_loading),
        BUTTON_CLASS,
        if state.is_loading { SPINNER } else { "" },
        if state.is_loading {
            "Generating…"
        } else {
            "Generate"
        }
    ));
    if !state.answer.is_empty() {
        html.push_str(&format!(
            "<div class=\"{}\">\n{}</div>\n",
            RESULT_CLASS,
            render_markdown(&state.answer)
        ));
    }
    html.push_str("</form>");
    html
}

fn render_ingest_form(state: &PageState) -> String {
    let mut html = format!(
        "<form method=\"post\" action=\"/actions/ingest\" enctype=\"multipart/form-data\" class=\"mt-6 {}\" aria-busy=\"{}\">\n",
        FORM_CLASS, state.is_ingesting
    );

    // First submit button in the form, so implicit submission runs the current mode.
    html.push_str(&format!(
        "<button type=\"submit\" name=\"button\" value=\"{}\" class=\"hidden\" tabindex=\"-1\" aria-hidden=\"true\"{}></button>\n",
        SUBMIT_CURRENT_MODE,
        disabled(state.is_ingesting)
    ));

    match state.ingest_mode {
        IngestMode::Url => html.push_str(&format!(
            "<input type=\"url\" name=\"url\" value=\"{}\" placeholder=\"Enter website url to ingest\" class=\"{}\">\n",
            escape(&state.ingest_url),
            INPUT_CLASS
        )),
        IngestMode::File => html.push_str(&format!(
            "<input type=\"file\" name=\"file\" id=\"ingest-file-{}\" class=\"{}\">\n",
            state.file_input_key, INPUT_CLASS
        )),
    }

    html.push_str("<div class=\"flex flex-wrap items-center gap-3\">\n");
    html.push_str(&ingest_button(state, IngestMode::Url, "Ingest url", "bg-green-600 hover:bg-green-700"));
    html.push_str(&ingest_button(state, IngestMode::File, "Ingest File", "bg-emerald-600 hover:bg-emerald-700"));
    html.push_str("</div>\n");

    if !state.ingestion_error.is_empty() {
        html.push_str(&format!(
            "<div class=\"text-sm text-red-600 dark:text-red-400\">{}</div>\n",
            escape(&state.ingestion_error)
        ));
    }
    if !state.ingestion_response.is_empty() {
        html.push_str(&format!(
            "<div class=\"{}\">\n{}</div>\n",
            RESULT_CLASS,
            render_markdown(&state.ingestion_response)
        ));
    }
    html.push_str("</form>");
    html
}

fn ingest_button(state: &PageState, mode: IngestMode, label: &str, colors: &str) -> String {
    let active = state.is_ingesting && state.ingest_mode == mode;
    format!(
        "<button type=\"submit\" name=\"button\" value=\"{}\"{} class=\"{} {}\">{}{}</button>\n",
        mode.as_str(),
        disabled(state.is_ingesting),
        BUTTON_CLASS,
        colors,
        if active { SPINNER } else { "" },
        if active { "Ingesting data..." } else { label }
    )
}
