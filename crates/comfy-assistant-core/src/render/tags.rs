//! Extraction of `<tag>…</tag>` sections from structured model replies.

use std::collections::BTreeMap;

/// Tag sections grouped by name, plus the text outside any section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTags {
    groups: BTreeMap<String, Vec<String>>,
    remaining: String,
}

impl ContentTags {
    /// First section named `tag`, if any.
    pub fn first(&self, tag: &str) -> Option<&str> {
        self.groups
            .get(tag)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn all(&self, tag: &str) -> &[String] {
        self.groups.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Text outside every recognised section.
    pub fn remaining(&self) -> &str {
        &self.remaining
    }
}

/// Split `content` into named sections. A section is an opening tag (with
/// optional attributes) followed by the next matching closing tag; the
/// section text is trimmed. Tags without a closing partner stay in the
/// remaining text.
pub fn parse_content_tags(content: &str) -> ContentTags {
    let mut tags = ContentTags::default();
    let mut cursor = 0;
    while let Some(offset) = content[cursor..].find('<') {
        let start = cursor + offset;
        if let Some((name, open_len)) = opening_tag(&content[start..]) {
            let body_start = start + open_len;
            let closing = format!("</{name}>");
            if let Some(body_len) = content[body_start..].find(&closing) {
                tags.remaining.push_str(&content[cursor..start]);
                tags.groups
                    .entry(name.to_string())
                    .or_default()
                    .push(content[body_start..body_start + body_len].trim().to_string());
                cursor = body_start + body_len + closing.len();
                continue;
            }
        }
        tags.remaining.push_str(&content[cursor..=start]);
        cursor = start + 1;
    }
    tags.remaining.push_str(&content[cursor..]);
    tags
}

/// Parse `<name ...>` at the start of `text`; returns the name and the byte
/// length of the whole opening tag.
fn opening_tag(text: &str) -> Option<(&str, usize)> {
    let rest = text.strip_prefix('<')?;
    let name_len = rest
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-'))
        .map(|(index, _)| index)
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if !name.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return None;
    }
    let after = &rest[name_len..];
    if after.starts_with('>') {
        return Some((name, 1 + name_len + 1));
    }
    if !after.starts_with(char::is_whitespace) {
        return None;
    }
    let close = after.find('>')?;
    if after[..close].contains('<') || after[..close].ends_with('/') {
        return None;
    }
    Some((name, 1 + name_len + close + 1))
}
