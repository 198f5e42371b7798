//! YAML rendering and parsing of configuration documents.
//!
//! Parsing goes through `serde_yaml`. Rendering uses a small block-style
//! emitter instead, because section descriptions and `comment:` annotations
//! are written as `#` comments next to the data they describe, which a serde
//! serializer cannot express.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use crate::document::ConfigurationDocument;
use crate::errors::DocumentError;
use crate::record::{comment_key, data_fields, Record, COMMENT_PREFIX};
use crate::section::Section;

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

/// Width comments are wrapped to unless configured otherwise.
pub const DEFAULT_COMMENT_WIDTH: usize = 80;

/// Narrowest a comment is ever wrapped to, however deep it is indented.
const MIN_COMMENT_WIDTH: usize = 20;

/// Converts configuration documents to and from YAML text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentCodec {
    comment_width: usize,
}

impl Default for DocumentCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMMENT_WIDTH)
    }
}

impl DocumentCodec {
    pub fn new(comment_width: usize) -> Self {
        Self { comment_width }
    }

    /// Renders a document, placing each section's description above it.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Render` if the document cannot be converted to
    /// a JSON tree.
    pub fn render(
        &self,
        document: &ConfigurationDocument,
        descriptions: &BTreeMap<Section, String>,
    ) -> Result<String, DocumentError> {
        let Value::Object(root) = serde_json::to_value(document).map_err(DocumentError::Render)?
        else {
            return Err(DocumentError::NotAMapping);
        };

        let mut out = String::new();
        for (key, value) in &root {
            if !out.is_empty() {
                out.push('\n');
            }
            let description = Section::ALL
                .into_iter()
                .find(|s| s.key() == key.as_str())
                .and_then(|s| descriptions.get(&s));
            if let Some(text) = description.filter(|t| !t.trim().is_empty()) {
                self.emit_comment(&mut out, 0, text);
            }
            self.emit_entry(&mut out, 0, key, value)?;
        }
        Ok(out)
    }

    /// Parses a document. An empty text is an empty document that manages nothing.
    ///
    /// Annotations are discarded and whole floating point numbers become integers.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Parse` for invalid YAML or sections of the
    /// wrong shape, and `DocumentError::NotAMapping` when the root is not a mapping.
    pub fn parse(&self, text: &str) -> Result<ConfigurationDocument, DocumentError> {
        if text.trim().is_empty() {
            return Ok(ConfigurationDocument::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(DocumentError::Parse)?;
        let mapping = match value {
            serde_yaml::Value::Null => return Ok(ConfigurationDocument::default()),
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => return Err(DocumentError::NotAMapping),
        };

        for key in mapping.keys() {
            let known = key
                .as_str()
                .is_some_and(|k| Section::ALL.iter().any(|s| s.key() == k));
            if !known {
                warn!(key = ?key, "Ignoring unknown top-level key");
            }
        }

        let mut document: ConfigurationDocument =
            serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
                .map_err(DocumentError::Parse)?;
        document.strip_comments();
        document.normalize_numbers();
        Ok(document)
    }

    fn emit_entry(
        &self,
        out: &mut String,
        indent: usize,
        key: &str,
        value: &Value,
    ) -> Result<(), DocumentError> {
        let pad = " ".repeat(indent);
        let key = render_string(key)?;
        match value {
            Value::Object(map) if data_fields(map).next().is_none() => {
                out.push_str(&format!("{pad}{key}: {{}}\n"));
            }
            Value::Object(map) => {
                out.push_str(&format!("{pad}{key}:\n"));
                self.emit_map(out, indent + 2, map, true)?;
            }
            Value::Array(items) if items.is_empty() => {
                out.push_str(&format!("{pad}{key}: []\n"));
            }
            Value::Array(items) => {
                out.push_str(&format!("{pad}{key}:\n"));
                self.emit_list(out, indent, items)?;
            }
            scalar => {
                out.push_str(&format!("{pad}{key}: {}\n", render_scalar(scalar)?));
            }
        }
        Ok(())
    }

    fn emit_map(
        &self,
        out: &mut String,
        indent: usize,
        map: &Record,
        with_record_comment: bool,
    ) -> Result<(), DocumentError> {
        if with_record_comment {
            if let Some(Value::String(comment)) = map.get(COMMENT_PREFIX) {
                self.emit_comment(out, indent, comment);
            }
        }
        for (key, value) in data_fields(map) {
            if let Some(Value::String(comment)) = map.get(&comment_key(key)) {
                self.emit_comment(out, indent, comment);
            }
            self.emit_entry(out, indent, key, value)?;
        }
        Ok(())
    }

    fn emit_list(&self, out: &mut String, indent: usize, items: &[Value]) -> Result<(), DocumentError> {
        let pad = " ".repeat(indent);
        for item in items {
            match item {
                Value::Object(map) if data_fields(map).next().is_none() => {
                    out.push_str(&format!("{pad}- {{}}\n"));
                }
                Value::Object(map) => {
                    if let Some(Value::String(comment)) = map.get(COMMENT_PREFIX) {
                        self.emit_comment(out, indent, comment);
                    }
                    let mut body = String::new();
                    self.emit_map(&mut body, indent + 2, map, false)?;
                    out.push_str(&as_list_item(&body, indent));
                }
                Value::Array(nested) if nested.is_empty() => {
                    out.push_str(&format!("{pad}- []\n"));
                }
                Value::Array(nested) => {
                    out.push_str(&format!("{pad}-\n"));
                    self.emit_list(out, indent + 2, nested)?;
                }
                scalar => out.push_str(&format!("{pad}- {}\n", render_scalar(scalar)?)),
            }
        }
        Ok(())
    }

    fn emit_comment(&self, out: &mut String, indent: usize, text: &str) {
        let pad = " ".repeat(indent);
        let width = self
            .comment_width
            .saturating_sub(indent + 2)
            .max(MIN_COMMENT_WIDTH);
        for line in wrap(text, width) {
            if line.is_empty() {
                out.push_str(&format!("{pad}#\n"));
            } else {
                out.push_str(&format!("{pad}# {line}\n"));
            }
        }
    }
}

/// Turns a mapping rendered at `indent + 2` into a list item at `indent` by
/// putting the dash in front of its first data line.
fn as_list_item(body: &str, indent: usize) -> String {
    let mut result = String::with_capacity(body.len());
    let mut dashed = false;
    for line in body.lines() {
        if !dashed && !line.trim_start().starts_with('#') {
            result.push_str(&" ".repeat(indent));
            result.push_str("- ");
            result.push_str(&line[(indent + 2).min(line.len())..]);
            dashed = true;
        } else {
            result.push_str(line);
        }
        result.push('\n');
    }
    result
}

fn render_scalar(value: &Value) -> Result<String, DocumentError> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => render_string(s),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).map_err(DocumentError::Render)
        }
    }
}

/// Renders a string as a single-line YAML scalar, quoting it when needed.
fn render_string(text: &str) -> Result<String, DocumentError> {
    let plain = serde_yaml::to_string(text).ok().map(|rendered| {
        let rendered = rendered.trim_end_matches('\n');
        rendered
            .strip_prefix("---")
            .map(str::trim_start)
            .unwrap_or(rendered)
            .to_string()
    });
    match plain {
        Some(rendered) if !rendered.contains('\n') => Ok(rendered),
        // Multi-line text is written as a double-quoted flow scalar.
        _ => serde_json::to_string(text).map_err(DocumentError::Render),
    }
}

/// Greedy word wrap. Line breaks in `text` are kept; blank lines stay blank.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.len() + 1 + word.len() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}
