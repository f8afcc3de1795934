//! Turn assistant replies into HTML fragments for the chat panel.

mod ffmpeg;
mod json_repair;
mod tags;
mod workflow;

pub use ffmpeg::{FfmpegWidget, render_ffmpeg_reply};
pub use json_repair::{
    WorkflowIssue, check_workflow, extract_json_objects, is_json_closed, repair_json,
    to_half_width,
};
pub use tags::{ContentTags, parse_content_tags};
pub use workflow::{WorkflowWidget, render_workflow_reply, workflow_file_name};

use crate::prompts::ResponseHandler;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html};

/// Render a reply with the prompt's handler, or as markdown without one.
pub fn render_reply(handler: Option<ResponseHandler>, reply: &str) -> String {
    match handler {
        Some(ResponseHandler::Workflow) => render_workflow_reply(reply),
        Some(ResponseHandler::FfmpegCommand) => render_ffmpeg_reply(reply),
        None => format_code_blocks(reply),
    }
}

/// Markdown to HTML with fenced and indented code blocks turned into code
/// widgets. Inline HTML in the reply passes through unchanged.
pub fn format_code_blocks(content: &str) -> String {
    if content.trim().is_empty() {
        return content.to_string();
    }
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut events = Vec::new();
    let mut code: Option<(String, String)> = None;
    for event in Parser::new_ext(content, options) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some((lang, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, body)) = code.take() {
                    events.push(Event::Html(code_widget(&lang, &body).into()));
                }
            }
            Event::Text(text) if code.is_some() => {
                if let Some((_, body)) = code.as_mut() {
                    body.push_str(&text);
                }
            }
            _ if code.is_some() => {}
            event => events.push(event),
        }
    }
    let mut out = String::with_capacity(content.len() * 2);
    html::push_html(&mut out, events.into_iter());
    out
}

/// Code widget: language label, copy button and the escaped code.
pub fn code_widget(lang: &str, code: &str) -> String {
    let lang = match lang.trim() {
        "" => "plaintext",
        lang => lang,
    };
    let lang = escape_html(lang);
    format!(
        concat!(
            r#"<div class="code-block">"#,
            r#"<div class="code-header"><span class="code-lang">{lang}</span>"#,
            r#"<button class="copy-button" onclick="copyCode(this)">Copy</button></div>"#,
            r#"<pre><code class="language-{lang}">{code}</code></pre>"#,
            "</div>"
        ),
        lang = lang,
        code = escape_html(code.trim_matches(['\n', '\r', '\t', ' '])),
    )
}

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
