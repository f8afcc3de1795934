//! Heuristic repair and structural checks for model-written workflow JSON.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

static BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([{,])\s*([A-Za-z0-9_]+)\s*:").expect("bare key regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma regex"));
static OUTER_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("outer object regex"));

/// Fold full-width punctuation and letters to their ASCII forms (NFKC).
pub fn to_half_width(text: &str) -> String {
    text.nfkc().collect()
}

/// Parse `raw`, trying progressively looser repairs:
/// append missing closing braces, quote bare keys and drop trailing commas,
/// then fall back to the outermost `{...}` span.
pub fn repair_json(raw: &str) -> Option<Value> {
    let half = to_half_width(raw);
    if let Ok(value) = serde_json::from_str(&half) {
        return Some(value);
    }

    let open = half.matches('{').count();
    let close = half.matches('}').count();
    if open > close {
        let closed = format!("{half}{}", "}".repeat(open - close));
        if let Ok(value) = serde_json::from_str(&closed) {
            return Some(value);
        }
    }

    let quoted = BARE_KEY.replace_all(&half, r#"${1}"${2}":"#);
    let fixed = TRAILING_COMMA.replace_all(&quoted, "${1}");
    if let Ok(value) = serde_json::from_str(&fixed) {
        return Some(value);
    }

    OUTER_OBJECT
        .find(&half)
        .and_then(|found| serde_json::from_str(found.as_str()).ok())
}

/// Whether curly and square brackets are balanced by count.
pub fn is_json_closed(text: &str) -> bool {
    let count = |ch: char| text.matches(ch).count();
    count('{') == count('}') && count('[') == count(']')
}

/// Top-level balanced `{...}` spans in `text`, in order. Braces inside JSON
/// strings are ignored.
pub fn extract_json_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(index);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.extend(start.take().map(|begin| &text[begin..=index]));
                }
            }
            _ => {}
        }
    }
    spans
}

/// Structural problem found in a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowIssue {
    #[error("workflow is not a JSON object")]
    NotAnObject,
    #[error("workflow has no nodes")]
    Empty,
    #[error("node {node} has no class_type")]
    MissingClassType { node: String },
    #[error("input {input} of node {node} links to missing node {target}")]
    DanglingLink {
        node: String,
        input: String,
        target: String,
    },
}

/// Check that every node declares its type and that every link points at an
/// existing node. Accepts the API format (node id -> node) and the editor
/// format (`nodes` array).
pub fn check_workflow(workflow: &Value) -> Result<(), WorkflowIssue> {
    let Some(nodes) = workflow.as_object() else {
        return Err(WorkflowIssue::NotAnObject);
    };
    if let Some(editor_nodes) = nodes.get("nodes").and_then(Value::as_array) {
        return check_editor_nodes(editor_nodes);
    }
    if nodes.is_empty() {
        return Err(WorkflowIssue::Empty);
    }
    for (id, node) in nodes {
        let has_type = node
            .get("class_type")
            .and_then(Value::as_str)
            .is_some_and(|class| !class.trim().is_empty());
        if !has_type {
            return Err(WorkflowIssue::MissingClassType { node: id.clone() });
        }
        let Some(inputs) = node.get("inputs").and_then(Value::as_object) else {
            continue;
        };
        for (input, value) in inputs {
            let Some(target) = link_target(value) else {
                continue;
            };
            if !nodes.contains_key(&target) {
                return Err(WorkflowIssue::DanglingLink {
                    node: id.clone(),
                    input: input.clone(),
                    target,
                });
            }
        }
    }
    Ok(())
}

fn check_editor_nodes(nodes: &[Value]) -> Result<(), WorkflowIssue> {
    if nodes.is_empty() {
        return Err(WorkflowIssue::Empty);
    }
    for (index, node) in nodes.iter().enumerate() {
        let has_type = node
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| !kind.trim().is_empty());
        if !has_type {
            let id = node
                .get("id")
                .map(value_key)
                .unwrap_or_else(|| index.to_string());
            return Err(WorkflowIssue::MissingClassType { node: id });
        }
    }
    Ok(())
}

/// `["4", 0]` or `{"node_id": "4"}` style references.
fn link_target(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) if items.len() == 2 && items[1].is_u64() => {
            items[0].as_str().map(str::to_string)
        }
        Value::Object(map) => map.get("node_id").map(value_key),
        _ => None,
    }
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        WorkflowIssue, check_workflow, extract_json_objects, is_json_closed, repair_json,
        to_half_width,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn full_width_punctuation_is_folded() {
        assert_eq!(to_half_width("｛＂a＂：１｝"), r#"{"a":1}"#);
        assert_eq!(repair_json("｛＂a＂：１｝"), Some(json!({ "a": 1 })));
    }

    #[test]
    fn missing_closing_braces_are_appended() {
        assert_eq!(
            repair_json(r#"{"1": {"class_type": "KSampler""#),
            Some(json!({ "1": { "class_type": "KSampler" } }))
        );
    }

    #[test]
    fn bare_keys_and_trailing_commas_are_fixed() {
        assert_eq!(
            repair_json(r#"{steps: 20, cfg: 7, sampler: "euler",}"#),
            Some(json!({ "steps": 20, "cfg": 7, "sampler": "euler" }))
        );
    }

    #[test]
    fn outer_object_is_extracted_from_prose() {
        assert_eq!(
            repair_json(r#"Here you go: {"a": [1, 2]} enjoy"#),
            Some(json!({ "a": [1, 2] }))
        );
        assert_eq!(repair_json("no json here"), None);
    }

    #[test]
    fn closed_check_counts_brackets() {
        assert!(is_json_closed(r#"{"a": [1]}"#));
        assert!(!is_json_closed(r#"{"a": [1}"#));
        assert!(is_json_closed(""));
    }

    #[test]
    fn extraction_ignores_braces_in_strings() {
        let text = r#"a {"x": "}"} b {"y": {"z": 1}} {unclosed"#;
        assert_eq!(
            extract_json_objects(text),
            vec![r#"{"x": "}"}"#, r#"{"y": {"z": 1}}"#]
        );
    }

    #[test]
    fn api_workflow_links_must_resolve() {
        let ok = json!({
            "4": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "sd.safetensors" } },
            "3": { "class_type": "KSampler", "inputs": { "model": ["4", 0], "seed": 1 } }
        });
        assert_eq!(check_workflow(&ok), Ok(()));

        let dangling = json!({
            "3": { "class_type": "KSampler", "inputs": { "model": ["9", 0] } }
        });
        assert_eq!(
            check_workflow(&dangling),
            Err(WorkflowIssue::DanglingLink {
                node: "3".to_string(),
                input: "model".to_string(),
                target: "9".to_string(),
            })
        );
    }

    #[test]
    fn nodes_need_a_class_type() {
        assert_eq!(
            check_workflow(&json!({ "1": { "inputs": {} } })),
            Err(WorkflowIssue::MissingClassType {
                node: "1".to_string()
            })
        );
        assert_eq!(check_workflow(&json!([1])), Err(WorkflowIssue::NotAnObject));
        assert_eq!(check_workflow(&json!({})), Err(WorkflowIssue::Empty));
    }

    #[test]
    fn editor_format_checks_node_types() {
        let workflow = json!({
            "nodes": [{ "id": 1, "type": "KSampler" }, { "id": 2 }],
            "links": []
        });
        assert_eq!(
            check_workflow(&workflow),
            Err(WorkflowIssue::MissingClassType {
                node: "2".to_string()
            })
        );
    }
}
