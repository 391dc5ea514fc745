use super::{Document, DocumentCodec, Format, JsonCodec};
use crate::error::{SopsError, SopsResult};
use crate::tree::{Node, Scalar};
use indexmap::IndexMap;

const DATA_KEY: &str = "data";

/// Opaque text. The whole input is one string leaf under `data`; the
/// encrypted form is a JSON object holding that leaf and the metadata.
#[derive(Clone, Debug)]
pub struct BinaryCodec {
    json: JsonCodec,
}

impl BinaryCodec {
    pub fn new(json_indent: usize) -> Self {
        Self {
            json: JsonCodec::new(json_indent),
        }
    }
}

impl DocumentCodec for BinaryCodec {
    fn format(&self) -> Format {
        Format::Binary
    }

    fn parse(&self, text: &str) -> SopsResult<Document> {
        let mut map = IndexMap::new();
        map.insert(DATA_KEY.to_string(), Node::string(text));
        Ok(Document::new(Node::Mapping(map)))
    }

    fn serialize(&self, root: &Node) -> SopsResult<String> {
        match root.as_mapping().and_then(|m| m.get(DATA_KEY)) {
            Some(Node::Scalar(Scalar::String(text))) => Ok(text.clone()),
            Some(Node::Scalar(other)) => Ok(other.to_text()),
            _ => Err(SopsError::MalformedDocument(format!(
                "binary document must hold a single {DATA_KEY:?} string"
            ))),
        }
    }

    fn parse_encrypted(&self, text: &str) -> SopsResult<Document> {
        let doc = self.json.parse(text)?;
        if !doc.root.as_mapping().is_some_and(|m| m.contains_key(DATA_KEY)) {
            return Err(SopsError::MalformedDocument(format!(
                "encrypted binary document has no {DATA_KEY:?} entry"
            )));
        }
        Ok(doc)
    }

    fn serialize_encrypted(&self, root: &Node) -> SopsResult<String> {
        self.json.serialize(root)
    }
}
