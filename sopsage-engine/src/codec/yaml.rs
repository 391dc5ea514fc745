use super::{CommentIndex, Document, DocumentCodec, Format};
use crate::error::{SopsError, SopsResult};
use crate::tree::{Node, Scalar};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

/// YAML documents (single document, mapping root).
///
/// Tags are dropped and non-string keys become strings, so `1: x` decrypts
/// as `'1': x` and a key that collides after this is rejected. Comments survive
/// only as the [`CommentIndex`] used by comment rules; the emitter writes none.
#[derive(Clone, Copy, Debug, Default)]
pub struct YamlCodec;

impl DocumentCodec for YamlCodec {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn parse(&self, text: &str) -> SopsResult<Document> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| SopsError::MalformedDocument(format!("invalid YAML: {e}")))?;
        let root = from_yaml(value)?;
        if root.as_mapping().is_none() {
            return Err(SopsError::MalformedDocument("YAML document root must be a mapping".into()));
        }
        Ok(Document {
            root,
            comments: Some(CommentIndex::scan(text)),
        })
    }

    fn serialize(&self, root: &Node) -> SopsResult<String> {
        serde_yaml::to_string(&to_yaml(root)).map_err(|e| SopsError::MalformedDocument(format!("cannot emit YAML: {e}")))
    }

    fn supports_comments(&self) -> bool {
        true
    }
}

fn from_yaml(value: Value) -> SopsResult<Node> {
    Ok(match value {
        Value::Null => Node::Scalar(Scalar::Null),
        Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Node::Scalar(Scalar::Int(i))
            } else if n.is_u64() {
                return Err(SopsError::MalformedDocument(format!("integer {n} is out of range")));
            } else {
                Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Value::String(s) => Node::Scalar(Scalar::String(s)),
        Value::Sequence(items) => Node::Sequence(items.into_iter().map(from_yaml).collect::<SopsResult<_>>()?),
        Value::Mapping(mapping) => {
            let mut map = IndexMap::with_capacity(mapping.len());
            for (k, v) in mapping {
                let key = key_text(k)?;
                if map.contains_key(&key) {
                    return Err(SopsError::MalformedDocument(format!("duplicate mapping key {key:?}")));
                }
                map.insert(key, from_yaml(v)?);
            }
            Node::Mapping(map)
        }
        Value::Tagged(tagged) => from_yaml(tagged.value)?,
    })
}

fn key_text(key: Value) -> SopsResult<String> {
    match key {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Tagged(tagged) => key_text(tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => {
            Err(SopsError::MalformedDocument("complex mapping keys are not supported".into()))
        }
    }
}

fn to_yaml(node: &Node) -> Value {
    match node {
        Node::Scalar(Scalar::Null) => Value::Null,
        Node::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
        Node::Scalar(Scalar::Int(i)) => Value::Number((*i).into()),
        Node::Scalar(Scalar::Float(f)) => Value::Number((*f).into()),
        Node::Scalar(Scalar::String(s)) => Value::String(s.clone()),
        Node::Sequence(items) => Value::Sequence(items.iter().map(to_yaml).collect()),
        Node::Mapping(map) => {
            let mut mapping = Mapping::with_capacity(map.len());
            for (k, v) in map {
                mapping.insert(Value::String(k.clone()), to_yaml(v));
            }
            Value::Mapping(mapping)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Path;

    #[test]
    fn keys_are_stringified_and_tags_dropped() {
        let doc = YamlCodec.parse("1: one\ntrue: yes\nx: !Secret value\n").unwrap();
        let map = doc.root.as_mapping().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["1", "true", "x"]);
        assert_eq!(map["x"], Node::string("value"));
    }

    #[test]
    fn duplicate_after_stringify_rejected() {
        assert!(YamlCodec.parse("1: a\n'1': b\n").is_err());
    }

    #[test]
    fn scalar_root_rejected() {
        assert!(matches!(
            YamlCodec.parse("just text\n"),
            Err(SopsError::MalformedDocument(_))
        ));
    }

    #[test]
    fn roundtrip_keeps_types_and_order() {
        let text = "b: 1\na: 1.5\nc: 'true'\nd: ~\ne: [x, 2]\n";
        let doc = YamlCodec.parse(text).unwrap();
        let again = YamlCodec.parse(&YamlCodec.serialize(&doc.root).unwrap()).unwrap();
        assert_eq!(doc.root, again.root);
        assert_eq!(
            again.root.as_mapping().unwrap().keys().collect::<Vec<_>>(),
            vec!["b", "a", "c", "d", "e"]
        );
    }

    #[test]
    fn comments_are_indexed() {
        let doc = YamlCodec.parse("# keep me\nkey: value\n").unwrap();
        let comments = doc.comments.unwrap();
        assert_eq!(comments.comments_for(&Path::root().key("key")), ["keep me".to_string()]);
    }
}
