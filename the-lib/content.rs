//! Resolved shortcut content and its flattening to plain text.

use std::borrow::Cow;

use serde::{
  Deserialize,
  Serialize,
};
use serde_json::Value;

/// Content a shortcut resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedContent {
  #[serde(default)]
  pub shortcut:               String,
  #[serde(default)]
  pub title:                  Option<String>,
  pub body:                   ContentBody,
  /// Content with interactive sub-fields goes through the popup flow.
  #[serde(default)]
  pub has_interactive_fields: bool,
}

impl ResolvedContent {
  pub fn plain(shortcut: impl Into<String>, text: impl Into<String>) -> Self {
    Self {
      shortcut:               shortcut.into(),
      title:                  None,
      body:                   ContentBody::Plain(text.into()),
      has_interactive_fields: false,
    }
  }

  /// Title shown by the popup: the explicit title or the shortcut itself.
  pub fn display_title(&self) -> &str {
    self.title.as_deref().unwrap_or(&self.shortcut)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentBody {
  Plain(String),
  /// Rich document JSON (`{"type": "doc", "content": [...]}`).
  Structured(Value),
}

/// Flattens a body into the plain text handed to the insertion engine.
pub trait ContentRenderer: Send + Sync {
  fn to_plain_text(&self, body: &ContentBody) -> String;
}

/// Paragraph-level blocks end with a line break when flattened.
const BLOCK_TYPES: &[&str] = &[
  "paragraph",
  "heading",
  "blockquote",
  "codeBlock",
  "listItem",
  "horizontalRule",
];

/// Default flattener for structured documents: text leaves are concatenated,
/// `hardBreak` nodes and block boundaries become `\n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

impl ContentRenderer for PlainTextRenderer {
  fn to_plain_text(&self, body: &ContentBody) -> String {
    match body {
      ContentBody::Plain(text) => normalize_line_endings(text).into_owned(),
      ContentBody::Structured(doc) => {
        let mut out = String::new();
        flatten(doc, &mut out);
        let trimmed = out.trim_end_matches('\n').len();
        out.truncate(trimmed);
        normalize_line_endings(&out).into_owned()
      },
    }
  }
}

fn flatten(value: &Value, out: &mut String) {
  match value {
    Value::String(text) => out.push_str(text),
    Value::Array(items) => items.iter().for_each(|item| flatten(item, out)),
    Value::Object(node) => {
      let kind = node.get("type").and_then(Value::as_str);
      if kind == Some("hardBreak") {
        out.push('\n');
        return;
      }
      if let Some(text) = node.get("text").and_then(Value::as_str) {
        out.push_str(text);
      }
      if let Some(content) = node.get("content") {
        flatten(content, out);
      }
      if kind.is_some_and(|kind| BLOCK_TYPES.contains(&kind)) {
        out.push('\n');
      }
    },
    _ => {},
  }
}

/// Converts `\r\n` and lone `\r` to `\n`.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
  if !text.contains('\r') {
    return Cow::Borrowed(text);
  }
  Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn deserializes_library_entries() {
    let plain: ResolvedContent =
      serde_json::from_value(json!({ "shortcut": "/hi", "body": "Hi there" })).unwrap();
    assert_eq!(plain, ResolvedContent::plain("/hi", "Hi there"));

    let structured: ResolvedContent = serde_json::from_value(json!({
      "shortcut": "/addr",
      "title": "Address",
      "body": { "type": "doc", "content": [] },
      "hasInteractiveFields": true,
    }))
    .unwrap();
    assert!(structured.has_interactive_fields);
    assert!(matches!(structured.body, ContentBody::Structured(_)));
    assert_eq!(structured.display_title(), "Address");
  }

  #[test]
  fn flattens_paragraphs_and_breaks() {
    let doc = json!({
      "type": "doc",
      "content": [
        { "type": "paragraph", "content": [
          { "type": "text", "text": "Dear " },
          { "type": "text", "text": "team," },
        ]},
        { "type": "paragraph", "content": [
          { "type": "text", "text": "line" },
          { "type": "hardBreak" },
          { "type": "text", "text": "break" },
        ]},
      ],
    });
    let text = PlainTextRenderer.to_plain_text(&ContentBody::Structured(doc));
    assert_eq!(text, "Dear team,\nline\nbreak");
  }

  #[test]
  fn plain_bodies_normalize_line_endings() {
    let text = PlainTextRenderer.to_plain_text(&ContentBody::Plain("a\r\nb\rc".into()));
    assert_eq!(text, "a\nb\nc");
  }
}
