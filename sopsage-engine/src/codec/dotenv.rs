use super::{Document, DocumentCodec, Format, root_mapping_mut, take_text_metadata};
use crate::error::{SopsError, SopsResult};
use crate::tree::Node;
use indexmap::IndexMap;
use serde_json::Value;

/// `KEY=VALUE` files.
///
/// Values are taken verbatim after the first `=`; `\n` and `\\` are the only
/// escapes and any other backslash is literal, so `C:\temp` stays as written. No quoting or variable expansion, so parsing never depends on the
/// process environment. Metadata is stored as compact JSON under the reserved key.
#[derive(Clone, Copy, Debug, Default)]
pub struct DotenvCodec;

impl DocumentCodec for DotenvCodec {
    fn format(&self) -> Format {
        Format::Dotenv
    }

    fn parse(&self, text: &str) -> SopsResult<Document> {
        let mut map = IndexMap::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                SopsError::MalformedDocument(format!("line {}: expected KEY=VALUE", lineno + 1))
            })?;
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(SopsError::MalformedDocument(format!("line {}: invalid key", lineno + 1)));
            }
            if map.insert(key.to_string(), Node::string(unescape(value.trim_start()))).is_some() {
                return Err(SopsError::MalformedDocument(format!(
                    "line {}: duplicate key {key:?}",
                    lineno + 1
                )));
            }
        }
        Ok(Document::new(Node::Mapping(map)))
    }

    fn serialize(&self, root: &Node) -> SopsResult<String> {
        let map = root
            .as_mapping()
            .ok_or_else(|| SopsError::MalformedDocument("dotenv root must be a mapping".into()))?;
        let mut out = String::new();
        for (key, node) in map {
            if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
                return Err(SopsError::MalformedDocument(format!("{key:?} is not a valid dotenv key")));
            }
            let Node::Scalar(scalar) = node else {
                return Err(SopsError::MalformedDocument(format!(
                    "dotenv value for {key:?} must be a scalar"
                )));
            };
            out.push_str(key);
            out.push('=');
            out.push_str(&escape(&scalar.to_text()));
            out.push('\n');
        }
        Ok(out)
    }

    fn embed_metadata(&self, root: &mut Node, key: &str, metadata: Value) -> SopsResult<()> {
        root_mapping_mut(root)?.insert(key.to_string(), Node::string(metadata.to_string()));
        Ok(())
    }

    fn extract_metadata(&self, root: &mut Node, key: &str) -> SopsResult<Option<Value>> {
        take_text_metadata(root_mapping_mut(root)?, key)
    }
}

/// Inverse of [`unescape`]: a backslash is doubled only where it would
/// otherwise start an escape sequence.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if matches!(chars.peek(), Some('n' | '\\' | '\n')) {
                    out.push('\\');
                }
            }
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
