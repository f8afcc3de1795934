//! Workflow widget: a parsed workflow JSON with load, copy and download
//! actions plus the dependency lists the model mentioned.

use super::json_repair::{
    WorkflowIssue, check_workflow, extract_json_objects, is_json_closed, repair_json,
};
use super::tags::parse_content_tags;
use super::{escape_html, format_code_blocks};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;
use serde_json::Value;
use std::fmt::Write;
use std::sync::LazyLock;

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("file name regex"));

/// Node or model the workflow depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    /// Node version or model path.
    pub detail: Option<String>,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowWidget {
    title: Option<String>,
    explanation: String,
    workflow: Value,
    file_name: String,
    issue: Option<WorkflowIssue>,
    nodes: Vec<Dependency>,
    models: Vec<Dependency>,
}

impl WorkflowWidget {
    /// Find and repair the workflow in `reply`. Returns `None` when no JSON
    /// object can be recovered.
    pub fn parse(reply: &str, now: DateTime<Utc>) -> Option<Self> {
        let tags = parse_content_tags(reply);
        let raw = tags.first("workflow").unwrap_or(reply);
        let workflow = if is_json_closed(raw) {
            repair_json(raw).filter(Value::is_object)
        } else {
            None
        }
        .or_else(|| {
            let mut candidates = extract_json_objects(raw);
            candidates.sort_by_key(|candidate| std::cmp::Reverse(candidate.len()));
            candidates
                .into_iter()
                .find_map(|candidate| repair_json(candidate).filter(Value::is_object))
        })?;

        let title = tags
            .first("title")
            .map(str::to_string)
            .filter(|title| !title.is_empty());
        let explanation = match tags.first("explanation") {
            Some(text) => text.to_string(),
            None => prose_before_json(tags.remaining()).to_string(),
        };
        let issue = check_workflow(&workflow).err();
        debug!(
            "parsed workflow (title={:?}, issue={:?})",
            title.as_deref(),
            issue
        );
        Some(Self {
            file_name: workflow_file_name(title.as_deref(), now.timestamp()),
            title,
            explanation,
            workflow,
            issue,
            nodes: tags.first("nodes").map(dependencies).unwrap_or_default(),
            models: tags.first("model").map(dependencies).unwrap_or_default(),
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn workflow(&self) -> &Value {
        &self.workflow
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn issue(&self) -> Option<&WorkflowIssue> {
        self.issue.as_ref()
    }

    pub fn nodes(&self) -> &[Dependency] {
        &self.nodes
    }

    pub fn models(&self) -> &[Dependency] {
        &self.models
    }

    /// Base64 of the compact workflow JSON, used by the panel's buttons.
    pub fn payload_base64(&self) -> String {
        STANDARD.encode(self.workflow.to_string())
    }

    pub fn status_message(&self) -> String {
        match &self.issue {
            None => "Workflow parsed successfully".to_string(),
            Some(issue) => format!("Workflow check failed: {issue}"),
        }
    }

    pub fn to_html(&self) -> String {
        let payload = self.payload_base64();
        let file_name = escape_html(&self.file_name);
        let status = if self.issue.is_none() {
            "success"
        } else {
            "error"
        };

        let mut html = String::from(r#"<div class="workflow-container">"#);
        if !self.explanation.is_empty() {
            let _ = write!(
                html,
                r#"<div class="workflow-explanation">{}</div>"#,
                escape_html(&self.explanation)
            );
        }
        let _ = write!(
            html,
            r#"<div class="workflow-header"><h3 class="workflow-title">{}</h3></div>"#,
            escape_html(self.title.as_deref().unwrap_or("Workflow"))
        );
        let _ = write!(
            html,
            r#"<div class="workflow-message {status}">{}</div>"#,
            escape_html(&self.status_message())
        );

        let mut highlighted = String::new();
        highlight(&self.workflow, 0, &mut highlighted);
        let pretty = serde_json::to_string_pretty(&self.workflow).unwrap_or_default();
        let _ = write!(
            html,
            concat!(
                r#"<textarea class="workflow-json" style="display:none;">{}</textarea>"#,
                r#"<div class="workflow-code"><pre><code class="language-json">{}</code></pre></div>"#
            ),
            escape_html(&pretty),
            highlighted
        );

        html.push_str(r#"<div class="workflow-actions">"#);
        for (action, class, label) in [
            ("load-workflow", "load-button", "Load workflow"),
            ("copy-workflow", "copy-button", "Copy JSON"),
            ("download-workflow", "download-button", "Download"),
        ] {
            let _ = write!(
                html,
                r#"<button class="workflow-button {class}" data-action="{action}" data-payload="{payload}" data-file-name="{file_name}">{label}</button>"#
            );
        }
        html.push_str("</div>");

        if !self.nodes.is_empty() || !self.models.is_empty() {
            html.push_str(r#"<div class="workflow-dependencies">"#);
            dependency_list(&mut html, "node-status", "Required nodes", &self.nodes);
            dependency_list(&mut html, "model-status", "Required models", &self.models);
            html.push_str("</div>");
        }
        html.push_str("</div>");
        html
    }
}

/// Workflow widget for `reply`, or plain markdown when no workflow is found.
pub fn render_workflow_reply(reply: &str) -> String {
    match WorkflowWidget::parse(reply, Utc::now()) {
        Some(widget) => widget.to_html(),
        None => format_code_blocks(reply),
    }
}

/// `{title}_{timestamp}.json` with the title reduced to word characters,
/// spaces and dashes, or `workflow_{timestamp}.json` without a usable title.
pub fn workflow_file_name(title: Option<&str>, timestamp: i64) -> String {
    let safe = title
        .map(|title| {
            UNSAFE_FILE_CHARS
                .replace_all(title, "")
                .trim()
                .replace(' ', "_")
        })
        .unwrap_or_default();
    if safe.is_empty() {
        format!("workflow_{timestamp}.json")
    } else {
        format!("{safe}_{timestamp}.json")
    }
}

fn prose_before_json(text: &str) -> &str {
    let end = [text.find('{'), text.find("```")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(text.len());
    text[..end].trim()
}

/// `{"name": {"version"|"path": .., "downloadurl": ..}}` or a plain list of names.
fn dependencies(raw: &str) -> Vec<Dependency> {
    let plain = |name: &str| Dependency {
        name: name.to_string(),
        detail: None,
        download_url: None,
    };
    match repair_json(raw) {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, info)| {
                let field = |key: &str| {
                    info.get(key)
                        .and_then(Value::as_str)
                        .filter(|value| !value.is_empty())
                        .map(str::to_string)
                };
                Dependency {
                    name: name.clone(),
                    detail: field("version").or_else(|| field("path")),
                    download_url: field("downloadurl"),
                }
            })
            .collect(),
        _ => raw
            .split([',', '\n'])
            .map(|name| name.trim().trim_matches(['[', ']', '"', '\'']).trim())
            .filter(|name| !name.is_empty())
            .map(plain)
            .collect(),
    }
}

fn dependency_list(html: &mut String, class: &str, heading: &str, items: &[Dependency]) {
    if items.is_empty() {
        return;
    }
    let _ = write!(
        html,
        r#"<div class="{class}"><h4>{heading} ({})</h4><ul>"#,
        items.len()
    );
    for item in items {
        let _ = write!(html, "<li>{}", escape_html(&item.name));
        if let Some(detail) = &item.detail {
            let _ = write!(html, r#" <span class="dependency-detail">({})</span>"#, escape_html(detail));
        }
        if let Some(url) = &item.download_url {
            let _ = write!(
                html,
                r#" <a href="{}" target="_blank">Download</a>"#,
                escape_html(url)
            );
        }
        html.push_str("</li>");
    }
    html.push_str("</ul></div>");
}

/// Pretty-print `value` as HTML with one span class per token kind.
fn highlight(value: &Value, depth: usize, out: &mut String) {
    let pad = |depth: usize| "  ".repeat(depth);
    match value {
        Value::Object(map) if !map.is_empty() => {
            out.push_str("{\n");
            for (index, (key, item)) in map.iter().enumerate() {
                let _ = write!(
                    out,
                    r#"{}<span class="json-key">{}</span>: "#,
                    pad(depth + 1),
                    escape_html(&Value::String(key.clone()).to_string())
                );
                highlight(item, depth + 1, out);
                out.push_str(if index + 1 < map.len() { ",\n" } else { "\n" });
            }
            let _ = write!(out, "{}}}", pad(depth));
        }
        Value::Array(items) if !items.is_empty() => {
            out.push_str("[\n");
            for (index, item) in items.iter().enumerate() {
                out.push_str(&pad(depth + 1));
                highlight(item, depth + 1, out);
                out.push_str(if index + 1 < items.len() { ",\n" } else { "\n" });
            }
            let _ = write!(out, "{}]", pad(depth));
        }
        Value::Object(_) => out.push_str("{}"),
        Value::Array(_) => out.push_str("[]"),
        Value::String(_) => {
            let _ = write!(
                out,
                r#"<span class="json-string">{}</span>"#,
                escape_html(&value.to_string())
            );
        }
        Value::Number(number) => {
            let _ = write!(out, r#"<span class="json-number">{number}</span>"#);
        }
        Value::Bool(_) | Value::Null => {
            let _ = write!(out, r#"<span class="json-boolean">{value}</span>"#);
        }
    }
}
