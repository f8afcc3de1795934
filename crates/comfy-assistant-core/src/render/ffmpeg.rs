//! FFmpeg command widget.

use super::tags::parse_content_tags;
use super::{escape_html, format_code_blocks};
use serde_json::Value;
use std::fmt::Write;

const DEFAULT_TITLE: &str = "FFmpeg command";
/// Route the run button posts the command to.
pub const RUN_ENDPOINT: &str = "/comfy_ai_assistant/cmd_win_ffmpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegWidget {
    pub kind: Option<String>,
    pub title: String,
    pub command: String,
    pub explanation: Option<String>,
    pub error: Option<String>,
    pub error_detail: Option<String>,
}

impl FfmpegWidget {
    /// Read the `<content>` command and its companion tags. `None` when the
    /// reply carries no command.
    pub fn parse(reply: &str) -> Option<Self> {
        let tags = parse_content_tags(reply);
        let field = |name: &str| {
            tags.first(name)
                .map(clean_tag_value)
                .filter(|value| !value.is_empty())
        };
        Some(Self {
            command: field("content")?,
            kind: field("type"),
            title: field("title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            explanation: field("explanation"),
            error: field("error"),
            error_detail: field("error_para"),
        })
    }

    pub fn to_html(&self) -> String {
        let command = escape_html(&self.command);
        let mut html = String::from(r#"<div class="ffmpeg-container">"#);
        html.push_str(r#"<div class="ffmpeg-message">FFmpeg command detected</div>"#);
        let _ = write!(
            html,
            r#"<div class="ffmpeg-header"><h3 class="ffmpeg-title">{}</h3></div>"#,
            escape_html(&self.title)
        );
        if let Some(explanation) = &self.explanation {
            let _ = write!(
                html,
                r#"<div class="ffmpeg-explanation">{}</div>"#,
                escape_html(explanation)
            );
        }
        if let Some(error) = &self.error {
            let _ = write!(
                html,
                r#"<div class="ffmpeg-message error">{}</div>"#,
                escape_html(error)
            );
        }
        if let Some(detail) = &self.error_detail {
            let _ = write!(
                html,
                r#"<div class="ffmpeg-explanation">{}</div>"#,
                escape_html(detail)
            );
        }
        let _ = write!(
            html,
            concat!(
                r#"<textarea class="ffmpeg-command" style="display:none;">{command}</textarea>"#,
                r#"<div class="ffmpeg-code"><pre><code>{command}</code></pre></div>"#,
                r#"<div class="ffmpeg-actions">"#,
                r#"<button class="ffmpeg-button execute-button" data-action="run-ffmpeg" data-endpoint="{endpoint}">Run command</button>"#,
                r#"<button class="ffmpeg-button copy-button" data-action="copy-command">Copy command</button>"#,
                r#"<button class="ffmpeg-button copy-button" data-action="copy-result" style="display:none;">Copy result</button>"#,
                "</div>",
                r#"<div class="ffmpeg-result" style="display:none;">"#,
                r#"<div class="ffmpeg-result-title"></div><pre><code class="ffmpeg-result-output"></code></pre>"#,
                "</div></div>"
            ),
            command = command,
            endpoint = RUN_ENDPOINT,
        );
        html
    }
}

/// FFmpeg widget for `reply`, or plain markdown when it carries no command.
pub fn render_ffmpeg_reply(reply: &str) -> String {
    match FfmpegWidget::parse(reply) {
        Some(widget) => widget.to_html(),
        None => format_code_blocks(reply),
    }
}

/// Normalise a tag value the model may have wrapped as a JSON array or a
/// quoted string: keep the first array element, drop one layer of brackets
/// and quotes, and turn single quotes into double quotes.
pub(crate) fn clean_tag_value(raw: &str) -> String {
    let mut value = raw.trim().to_string();
    if value.starts_with('[') && value.ends_with(']') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&value) {
            value = match items.first() {
                Some(Value::String(first)) => first.clone(),
                Some(first) => first.to_string(),
                None => String::new(),
            };
        }
    }
    if value.len() >= 2 && value.starts_with('[') && value.ends_with(']') {
        value = value[1..value.len() - 1].to_string();
    }
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = value[1..value.len() - 1].to_string();
    }
    value.replace("\\\"", " ").replace('\'', "\"").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{FfmpegWidget, clean_tag_value, render_ffmpeg_reply};
    use pretty_assertions::assert_eq;

    #[test]
    fn tag_values_are_unwrapped() {
        assert_eq!(
            clean_tag_value(r#"["ffmpeg -i in.mp4 out.gif", "second"]"#),
            "ffmpeg -i in.mp4 out.gif"
        );
        assert_eq!(clean_tag_value(r#""quoted""#), "quoted");
        assert_eq!(clean_tag_value("[not json"), "[not json");
        assert_eq!(clean_tag_value("-vf 'scale=640:-1'"), r#"-vf "scale=640:-1""#);
        assert_eq!(clean_tag_value("[]"), "");
    }

    #[test]
    fn command_reply_is_parsed() {
        let reply = "<type>convert</type><title>To GIF</title>\
            <content>ffmpeg -i in.mp4 -vf fps=10 out.gif</content>\
            <explanation>Samples 10 frames per second.</explanation>";
        let widget = FfmpegWidget::parse(reply).expect("widget");
        assert_eq!(widget.kind.as_deref(), Some("convert"));
        assert_eq!(widget.title, "To GIF");
        assert_eq!(widget.command, "ffmpeg -i in.mp4 -vf fps=10 out.gif");
        assert_eq!(widget.error, None);
    }

    #[test]
    fn html_has_run_action_and_escaped_command() {
        let html = render_ffmpeg_reply(
            "<content>ffmpeg -i a.mp4 -vf \"drawtext=text='<hi>'\" b.mp4</content>\
             <error>Input missing</error><error_para>Check the path</error_para>",
        );
        assert!(html.contains("FFmpeg command detected"));
        assert!(html.contains(r#"<h3 class="ffmpeg-title">FFmpeg command</h3>"#));
        assert!(html.contains(r#"data-endpoint="/comfy_ai_assistant/cmd_win_ffmpeg""#));
        assert!(html.contains("&lt;hi&gt;"));
        assert!(html.contains(r#"<div class="ffmpeg-message error">Input missing</div>"#));
        assert!(html.contains("Check the path"));
    }

    #[test]
    fn reply_without_command_is_markdown() {
        let html = render_ffmpeg_reply("Use **ffmpeg** <title>Only a title</title>");
        assert!(html.contains("<strong>ffmpeg</strong>"));
        assert!(!html.contains("ffmpeg-container"));
    }
}
