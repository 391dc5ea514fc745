//! Full-line YAML comments indexed by the node they precede.
//!
//! `serde_yaml` drops comments, so a line scanner runs over the raw text next
//! to the real parse. It tracks block-style keys and `- ` items by
//! indentation; flow collections and multi-line plain scalars are not entered.

use crate::tree::{Path, PathSegment};
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommentIndex {
    entries: HashMap<Path, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Key,
    Item,
}

struct Frame {
    indent: usize,
    path: Path,
    kind: FrameKind,
}

impl CommentIndex {
    /// Comments directly above the node at `path`, `#` and leading space stripped.
    pub fn comments_for(&self, path: &Path) -> &[String] {
        self.entries.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scan(text: &str) -> Self {
        let mut scanner = Scanner::default();
        for line in text.lines() {
            scanner.line(line);
        }
        Self {
            entries: scanner.entries,
        }
    }
}

#[derive(Default)]
struct Scanner {
    entries: HashMap<Path, Vec<String>>,
    stack: Vec<Frame>,
    seq_counters: HashMap<(Path, usize), usize>,
    pending: Vec<String>,
    block_scalar_indent: Option<usize>,
}

impl Scanner {
    fn line(&mut self, line: &str) {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(owner) = self.block_scalar_indent {
            if trimmed.is_empty() || indent > owner {
                return;
            }
            self.block_scalar_indent = None;
        }

        if trimmed.is_empty() {
            return;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            self.pending.push(comment.trim().to_string());
            return;
        }
        if trimmed.starts_with("---") || trimmed.starts_with("...") {
            self.stack.clear();
            self.seq_counters.clear();
            self.pending.clear();
            return;
        }

        let mut col = indent;
        let mut rest = trimmed;
        loop {
            if rest == "-" || rest.starts_with("- ") {
                self.pop_to(col, FrameKind::Item);
                let parent = self.current_path();
                let counter = self.seq_counters.entry((parent.clone(), col)).or_insert(0);
                let path = parent.child(PathSegment::Index(*counter));
                *counter += 1;
                self.open(col, path, FrameKind::Item);

                let dash_col = col;
                let after = &rest[1..];
                let stripped = after.trim_start();
                col += 1 + (after.len() - stripped.len());
                rest = stripped;
                if rest.is_empty() {
                    return;
                }
                if is_block_scalar(rest) {
                    self.block_scalar_indent = Some(dash_col);
                    return;
                }
                continue;
            }

            match split_key(rest) {
                Some((key, value)) => {
                    self.pop_to(col, FrameKind::Key);
                    let path = self.current_path().child(PathSegment::Key(key));
                    self.open(col, path, FrameKind::Key);
                    if is_block_scalar(value.trim_start()) {
                        self.block_scalar_indent = Some(col);
                    }
                }
                None => self.pending.clear(),
            }
            return;
        }
    }

    fn pop_to(&mut self, col: usize, kind: FrameKind) {
        while let Some(top) = self.stack.last() {
            let keep = top.indent < col
                || (top.indent == col && kind == FrameKind::Item && top.kind == FrameKind::Key);
            if keep {
                break;
            }
            self.stack.pop();
        }
    }

    fn current_path(&self) -> Path {
        self.stack.last().map(|f| f.path.clone()).unwrap_or_default()
    }

    fn open(&mut self, indent: usize, path: Path, kind: FrameKind) {
        if !self.pending.is_empty() {
            self.entries
                .entry(path.clone())
                .or_default()
                .append(&mut self.pending);
        }
        self.stack.push(Frame { indent, path, kind });
    }
}

fn is_block_scalar(value: &str) -> bool {
    value.starts_with('|') || value.starts_with('>')
}

/// Splits `key: value` into the unquoted key and the rest after the colon.
fn split_key(text: &str) -> Option<(String, &str)> {
    let first = text.chars().next()?;
    if first == '"' || first == '\'' {
        let (key, consumed) = quoted(text, first)?;
        let after = text[consumed..].trim_start();
        let value = after.strip_prefix(':')?;
        if !(value.is_empty() || value.starts_with(' ')) {
            return None;
        }
        return Some((key, value));
    }
    if matches!(first, '{' | '[' | '?' | '&' | '*' | '!' | '|' | '>' | '%' | '@' | '`' | '#') {
        return None;
    }
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b':' if i + 1 == bytes.len() || bytes[i + 1] == b' ' => {
                let key = text[..i].trim_end();
                let key = if key == "~" { "null" } else { key };
                return Some((key.to_string(), &text[i + 1..]));
            }
            b'#' if i > 0 && bytes[i - 1] == b' ' => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Reads a quoted scalar starting at `text[0]`. Returns the value and bytes consumed.
fn quoted(text: &str, quote: char) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = text.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            ('"', '\\') => {
                let (_, escaped) = chars.next()?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            ('\'', '\'') => {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                    out.push('\'');
                } else {
                    return Some((out, i + 1));
                }
            }
            ('"', '"') => return Some((out, i + 1)),
            _ => out.push(c),
        }
    }
    None
}
