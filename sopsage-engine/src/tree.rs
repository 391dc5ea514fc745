//! In-memory document tree shared by every codec.
//!
//! Mappings keep insertion order and unique string keys. Scalars keep their
//! type so an encrypted number decrypts back to a number.

use crate::error::{SopsError, SopsResult};
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::fmt;

/// A scalar leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Renders the scalar as plain text, the way line-based formats store it.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

/// A node of a parsed document.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Mapping(IndexMap<String, Node>),
}

/// One step from a container to a child.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a node, from the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn key(&self, key: &str) -> Self {
        self.child(PathSegment::Key(key.to_string()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Mapping keys along the path, skipping sequence indices.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Key(k) => Some(k.as_str()),
            PathSegment::Index(_) => None,
        })
    }

    /// Every non-empty prefix of the path, shortest first. The last one is the path itself.
    pub fn prefixes(&self) -> impl Iterator<Item = Path> + '_ {
        (1..=self.segments.len()).map(|n| Path {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Dotted form, e.g. `servers.0.password`.
    pub fn dotted(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => k.clone(),
                PathSegment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// JSON array form, e.g. `["servers",0,"password"]`. Used as AEAD associated data.
    pub fn to_aad(&self) -> Vec<u8> {
        let parts: Vec<Value> = self
            .segments
            .iter()
            .map(|s| match s {
                PathSegment::Key(k) => Value::String(k.clone()),
                PathSegment::Index(i) => Value::Number(Number::from(*i)),
            })
            .collect();
        Value::Array(parts).to_string().into_bytes()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.dotted())
        }
    }
}

impl Node {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Visits every scalar leaf in document order.
    pub fn for_each_scalar<'a, F>(&'a self, f: &mut F) -> SopsResult<()>
    where
        F: FnMut(&Path, &'a Scalar) -> SopsResult<()>,
    {
        self.walk(&Path::root(), f)
    }

    fn walk<'a, F>(&'a self, path: &Path, f: &mut F) -> SopsResult<()>
    where
        F: FnMut(&Path, &'a Scalar) -> SopsResult<()>,
    {
        match self {
            Self::Scalar(s) => f(path, s),
            Self::Sequence(items) => items
                .iter()
                .enumerate()
                .try_for_each(|(i, item)| item.walk(&path.index(i), f)),
            Self::Mapping(map) => map.iter().try_for_each(|(k, v)| v.walk(&path.key(k), f)),
        }
    }

    /// Visits every scalar leaf mutably in document order.
    pub fn for_each_scalar_mut<F>(&mut self, f: &mut F) -> SopsResult<()>
    where
        F: FnMut(&Path, &mut Scalar) -> SopsResult<()>,
    {
        self.walk_mut(&Path::root(), f)
    }

    fn walk_mut<F>(&mut self, path: &Path, f: &mut F) -> SopsResult<()>
    where
        F: FnMut(&Path, &mut Scalar) -> SopsResult<()>,
    {
        match self {
            Self::Scalar(s) => f(path, s),
            Self::Sequence(items) => items
                .iter_mut()
                .enumerate()
                .try_for_each(|(i, item)| item.walk_mut(&path.index(i), f)),
            Self::Mapping(map) => map
                .iter_mut()
                .try_for_each(|(k, v)| v.walk_mut(&path.key(k), f)),
        }
    }

    /// Converts a JSON value. Integers beyond `i64` are rejected rather than rounded.
    pub fn from_json(value: Value) -> SopsResult<Self> {
        Ok(match value {
            Value::Null => Self::Scalar(Scalar::Null),
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Self::Scalar(number_to_scalar(&n)?),
            Value::String(s) => Self::Scalar(Scalar::String(s)),
            Value::Array(items) => Self::Sequence(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<SopsResult<_>>()?,
            ),
            Value::Object(map) => Self::Mapping(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Self::from_json(v)?)))
                    .collect::<SopsResult<_>>()?,
            ),
        })
    }

    /// Converts to a JSON value. Fails on non-finite floats, which JSON cannot carry.
    pub fn to_json(&self) -> SopsResult<Value> {
        Ok(match self {
            Self::Scalar(Scalar::Null) => Value::Null,
            Self::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Self::Scalar(Scalar::Int(i)) => Value::Number(Number::from(*i)),
            Self::Scalar(Scalar::Float(f)) => Value::Number(Number::from_f64(*f).ok_or_else(|| {
                SopsError::MalformedDocument(format!("{f} cannot be represented in JSON"))
            })?),
            Self::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect::<SopsResult<_>>()?),
            Self::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<SopsResult<_>>()?,
            ),
        })
    }
}

fn number_to_scalar(n: &Number) -> SopsResult<Scalar> {
    if let Some(i) = n.as_i64() {
        Ok(Scalar::Int(i))
    } else if n.is_u64() {
        Err(SopsError::MalformedDocument(format!("integer {n} is out of range")))
    } else {
        n.as_f64()
            .map(Scalar::Float)
            .ok_or_else(|| SopsError::MalformedDocument(format!("unsupported number {n}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aad_and_dotted_forms() {
        let path = Path::root().key("servers").index(0).key("password");
        assert_eq!(path.dotted(), "servers.0.password");
        assert_eq!(path.to_aad(), br#"["servers",0,"password"]"#.to_vec());
        assert_eq!(path.keys().collect::<Vec<_>>(), vec!["servers", "password"]);
    }

    #[test]
    fn prefixes_shortest_first() {
        let path = Path::root().key("a").index(1);
        let prefixes: Vec<String> = path.prefixes().map(|p| p.dotted()).collect();
        assert_eq!(prefixes, vec!["a", "a.1"]);
    }

    #[test]
    fn json_conversion_keeps_order_and_types() {
        let value = json!({"z": 1, "a": [true, null, 1.5, "x"]});
        let node = Node::from_json(value.clone()).unwrap();
        let keys: Vec<&String> = node.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert_eq!(node.to_json().unwrap(), value);
    }

    #[test]
    fn huge_unsigned_rejected() {
        let value: Value = serde_json::from_str("18446744073709551615").unwrap();
        assert!(Node::from_json(value).is_err());
    }

    #[test]
    fn scalar_visit_order() {
        let node = Node::from_json(json!({"a": {"b": 1, "c": [2, 3]}, "d": 4})).unwrap();
        let mut seen = Vec::new();
        node.for_each_scalar(&mut |path, _| {
            seen.push(path.dotted());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["a.b", "a.c.0", "a.c.1", "d"]);
    }
}
