//! Markdown presentation helper.
//!
//! Renders backend answers (GitHub-flavoured markdown) into an HTML fragment
//! styled for the page. The pulldown-cmark event stream is rewritten before
//! it reaches [`pulldown_cmark::html::push_html`]:
//!
//! - links get the link class; anything that is not an in-page `#anchor`
//!   opens in a new tab with `rel="noreferrer"`
//! - paragraphs keep their whitespace (`whitespace-pre-wrap`)
//! - lists, inline code and code blocks get their own classes
//! - raw HTML from the answer is escaped and shown as text, never injected
//! - link and image URLs with a scheme outside [`SAFE_SCHEMES`] are blanked

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};
use pulldown_cmark_escape::{escape_href, escape_html};

pub const LINK_CLASS: &str = "text-blue-600 dark:text-blue-400 underline underline-offset-2";
pub const PARAGRAPH_CLASS: &str = "whitespace-pre-wrap";
pub const UNORDERED_LIST_CLASS: &str = "list-disc pl-6 space-y-1";
pub const ORDERED_LIST_CLASS: &str = "list-decimal pl-6 space-y-1";
pub const CODE_CLASS: &str = "rounded bg-gray-100 dark:bg-gray-900 px-1 py-0.5";
pub const PRE_CLASS: &str = "overflow-x-auto rounded bg-gray-100 dark:bg-gray-900 p-3";

/// Schemes a link or image URL may carry. Relative URLs are always allowed.
pub const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto", "xmpp", "irc", "ircs"];

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

/// Renders `text` as a styled HTML fragment. Empty input yields an empty string.
pub fn render_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 2);
    let events = Parser::new_ext(text, options()).map(restyle);
    html::push_html(&mut out, events);
    out
}

/// HTML-escapes `s` for use in element bodies and quoted attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    // Writing into a String is infallible.
    let _ = escape_html(&mut out, s);
    out
}

fn escape_url(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let _ = escape_href(&mut out, s);
    out
}

/// Returns `dest` if it is relative or uses one of [`SAFE_SCHEMES`],
/// otherwise an empty string.
///
/// A colon only starts a scheme when no `/`, `?` or `#` comes before it, so
/// `docs/a:b` and `?q=a:b` stay relative.
pub fn safe_url(dest: &str) -> &str {
    let Some(colon) = dest.find(':') else {
        return dest;
    };
    if dest[..colon].contains(['/', '?', '#']) {
        return dest;
    }
    let scheme = &dest[..colon];
    if SAFE_SCHEMES
        .iter()
        .any(|safe| scheme.eq_ignore_ascii_case(safe))
    {
        dest
    } else {
        ""
    }
}

fn raw(html: String) -> Event<'static> {
    Event::Html(CowStr::from(html))
}

fn restyle(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(source) | Event::InlineHtml(source) => Event::Text(source),
        Event::Code(code) => raw(format!(
            "<code class=\"{}\">{}</code>",
            CODE_CLASS,
            escape(&code)
        )),
        Event::Start(Tag::Paragraph) => raw(format!("<p class=\"{}\">", PARAGRAPH_CLASS)),
        Event::End(TagEnd::Paragraph) => raw("</p>\n".to_string()),
        Event::Start(Tag::List(None)) => raw(format!("<ul class=\"{}\">\n", UNORDERED_LIST_CLASS)),
        Event::Start(Tag::List(Some(1))) => {
            raw(format!("<ol class=\"{}\">\n", ORDERED_LIST_CLASS))
        }
        Event::Start(Tag::List(Some(start))) => raw(format!(
            "<ol start=\"{}\" class=\"{}\">\n",
            start, ORDERED_LIST_CLASS
        )),
        Event::End(TagEnd::List(true)) => raw("</ol>\n".to_string()),
        Event::End(TagEnd::List(false)) => raw("</ul>\n".to_string()),
        Event::Start(Tag::CodeBlock(kind)) => raw(open_code_block(&kind)),
        Event::End(TagEnd::CodeBlock) => raw("</code></pre>\n".to_string()),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            ..
        }) => raw(open_link(link_type, &dest_url, &title)),
        Event::End(TagEnd::Link) => raw("</a>".to_string()),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => {
            let dest_url = CowStr::from(safe_url(&dest_url).to_string());
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            })
        }
        other => other,
    }
}

fn open_code_block(kind: &CodeBlockKind<'_>) -> String {
    let lang = match kind {
        CodeBlockKind::Fenced(info) => info.split_whitespace().next().unwrap_or(""),
        CodeBlockKind::Indented => "",
    };
    let class = if lang.is_empty() {
        CODE_CLASS.to_string()
    } else {
        format!("{} language-{}", CODE_CLASS, escape(lang))
    };
    format!("<pre class=\"{}\"><code class=\"{}\">", PRE_CLASS, class)
}

fn open_link(link_type: LinkType, dest: &str, title: &str) -> String {
    let href = match link_type {
        LinkType::Email => format!("mailto:{}", dest),
        _ => dest.to_string(),
    };

    let href = safe_url(&href);
    let mut tag = format!("<a href=\"{}\" class=\"{}\"", escape_url(href), LINK_CLASS);
    if !title.is_empty() {
        tag.push_str(&format!(" title=\"{}\"", escape(title)));
    }
    if !href.starts_with('#') {
        tag.push_str(" target=\"_blank\" rel=\"noreferrer\"");
    }
    tag.push('>');
    tag
}
