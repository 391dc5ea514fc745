use super::{Document, DocumentCodec, Format};
use crate::error::{SopsError, SopsResult};
use crate::tree::{Node, Scalar};
use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::fmt;

/// JSON documents. Output is pretty-printed with a fixed indent.
#[derive(Clone, Debug)]
pub struct JsonCodec {
    indent: usize,
}

impl JsonCodec {
    pub fn new(indent: usize) -> Self {
        Self { indent }
    }

    pub(crate) fn to_text(&self, value: &Value) -> SopsResult<String> {
        let indent = vec![b' '; self.indent];
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
        value
            .serialize(&mut serializer)
            .map_err(|e| SopsError::MalformedDocument(format!("cannot emit JSON: {e}")))?;
        let mut text =
            String::from_utf8(out).map_err(|e| SopsError::MalformedDocument(format!("cannot emit JSON: {e}")))?;
        text.push('\n');
        Ok(text)
    }
}

impl DocumentCodec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn parse(&self, text: &str) -> SopsResult<Document> {
        let StrictNode(root) =
            serde_json::from_str(text).map_err(|e| SopsError::MalformedDocument(format!("invalid JSON: {e}")))?;
        if root.as_mapping().is_none() {
            return Err(SopsError::MalformedDocument("JSON document root must be an object".into()));
        }
        Ok(Document::new(root))
    }

    fn serialize(&self, root: &Node) -> SopsResult<String> {
        self.to_text(&root.to_json()?)
    }
}

/// Deserializes straight into a [`Node`], rejecting repeated object keys
/// that `serde_json::Value` would silently collapse.
struct StrictNode(Node);

impl<'de> Deserialize<'de> for StrictNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StrictNodeVisitor).map(StrictNode)
    }
}

struct StrictNodeVisitor;

impl<'de> Visitor<'de> for StrictNodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Scalar(Scalar::Null))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Scalar(Scalar::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Scalar(Scalar::Int(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        i64::try_from(v)
            .map(|i| Node::Scalar(Scalar::Int(i)))
            .map_err(|_| E::custom(format!("integer {v} is out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Scalar(Scalar::Float(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::string(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(StrictNode(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(Node::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Node, A::Error> {
        let mut map = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(key) = access.next_key::<String>()? {
            match map.entry(key) {
                Entry::Occupied(entry) => {
                    return Err(de::Error::custom(format!("duplicate key {:?}", entry.key())));
                }
                Entry::Vacant(entry) => {
                    let StrictNode(value) = access.next_value()?;
                    entry.insert(value);
                }
            }
        }
        Ok(Node::Mapping(map))
    }
}
