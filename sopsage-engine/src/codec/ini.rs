use super::{Document, DocumentCodec, Format, root_mapping_mut, take_text_metadata};
use crate::error::{SopsError, SopsResult};
use crate::tree::Node;
use indexmap::IndexMap;
use serde_json::Value;

const DEFAULT_SECTION: &str = "DEFAULT";
const METADATA_FIELD: &str = "metadata";

/// INI files: a mapping of sections, each a mapping of string values.
///
/// Keys before the first header belong to `[DEFAULT]`. `;` and `#` start
/// full-line comments. Metadata lives in the reserved section as one
/// `metadata = <compact JSON>` entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct IniCodec;

impl DocumentCodec for IniCodec {
    fn format(&self) -> Format {
        Format::Ini
    }

    fn parse(&self, text: &str) -> SopsResult<Document> {
        let mut sections: IndexMap<String, IndexMap<String, Node>> = IndexMap::new();
        let mut current: Option<String> = None;

        for (lineno, raw) in text.lines().enumerate() {
            let lineno = lineno + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| SopsError::MalformedDocument(format!("line {lineno}: bad section header")))?;
                if sections.contains_key(name) {
                    return Err(SopsError::MalformedDocument(format!(
                        "line {lineno}: duplicate section [{name}]"
                    )));
                }
                sections.insert(name.to_string(), IndexMap::new());
                current = Some(name.to_string());
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| SopsError::MalformedDocument(format!("line {lineno}: expected key = value")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(SopsError::MalformedDocument(format!("line {lineno}: empty key")));
            }
            let section = current.get_or_insert_with(|| DEFAULT_SECTION.to_string());
            let entries = sections.entry(section.clone()).or_default();
            if entries.insert(key.to_string(), Node::string(value.trim())).is_some() {
                return Err(SopsError::MalformedDocument(format!(
                    "line {lineno}: duplicate key {key:?} in [{section}]"
                )));
            }
        }

        let root = sections.into_iter().map(|(name, entries)| (name, Node::Mapping(entries))).collect();
        Ok(Document::new(Node::Mapping(root)))
    }

    fn serialize(&self, root: &Node) -> SopsResult<String> {
        let sections = root
            .as_mapping()
            .ok_or_else(|| SopsError::MalformedDocument("INI root must be a mapping of sections".into()))?;
        let mut out = String::new();
        for (i, (name, node)) in sections.iter().enumerate() {
            let Some(entries) = node.as_mapping() else {
                return Err(SopsError::MalformedDocument(format!("INI section [{name}] must be a mapping")));
            };
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("[{name}]\n"));
            for (key, value) in entries {
                let Node::Scalar(scalar) = value else {
                    return Err(SopsError::MalformedDocument(format!(
                        "INI value [{name}] {key} must be a scalar"
                    )));
                };
                let text = scalar.to_text();
                if text.contains('\n') || key.contains('=') || key.starts_with(['[', ';', '#']) {
                    return Err(SopsError::MalformedDocument(format!(
                        "INI entry [{name}] {key:?} cannot be written"
                    )));
                }
                out.push_str(&format!("{key} = {text}\n"));
            }
        }
        Ok(out)
    }

    fn embed_metadata(&self, root: &mut Node, key: &str, metadata: Value) -> SopsResult<()> {
        let mut section = IndexMap::new();
        section.insert(METADATA_FIELD.to_string(), Node::string(metadata.to_string()));
        root_mapping_mut(root)?.insert(key.to_string(), Node::Mapping(section));
        Ok(())
    }

    fn extract_metadata(&self, root: &mut Node, key: &str) -> SopsResult<Option<Value>> {
        match root_mapping_mut(root)?.shift_remove(key) {
            None => Ok(None),
            Some(Node::Mapping(mut section)) => match take_text_metadata(&mut section, METADATA_FIELD)? {
                Some(value) => Ok(Some(value)),
                None => Err(SopsError::MalformedDocument(format!(
                    "section [{key}] has no {METADATA_FIELD} entry"
                ))),
            },
            Some(_) => Err(SopsError::MalformedDocument(format!("[{key}] is not a section"))),
        }
    }
}
