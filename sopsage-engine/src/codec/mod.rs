//! Document codecs.
//!
//! Every supported format parses into the same [`Node`] tree and serializes
//! back from it. The engine only talks to codecs through [`DocumentCodec`], so
//! a format is picked once from its [`Format`] tag and never re-dispatched by
//! name.

mod binary;
mod comments;
mod dotenv;
mod ini;
mod json;
mod yaml;

pub use binary::BinaryCodec;
pub use comments::CommentIndex;
pub use dotenv::DotenvCodec;
pub use ini::IniCodec;
pub use json::JsonCodec;
pub use yaml::YamlCodec;

use crate::config::EngineConfig;
use crate::error::{SopsError, SopsResult};
use crate::tree::Node;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Supported document formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Yaml,
    Dotenv,
    Ini,
    Binary,
}

impl Format {
    pub const ALL: [Format; 5] = [Self::Json, Self::Yaml, Self::Dotenv, Self::Ini, Self::Binary];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Dotenv => "dotenv",
            Self::Ini => "ini",
            Self::Binary => "binary",
        }
    }

    /// Builds the codec for this format.
    pub fn codec(self, config: &EngineConfig) -> Box<dyn DocumentCodec> {
        match self {
            Self::Json => Box::new(JsonCodec::new(config.json_indent)),
            Self::Yaml => Box::new(YamlCodec),
            Self::Dotenv => Box::new(DotenvCodec),
            Self::Ini => Box::new(IniCodec),
            Self::Binary => Box::new(BinaryCodec::new(config.json_indent)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = SopsError;

    fn from_str(s: &str) -> SopsResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "dotenv" | "env" => Ok(Self::Dotenv),
            "ini" => Ok(Self::Ini),
            "binary" => Ok(Self::Binary),
            _ => Err(SopsError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// A parsed document: the tree plus whatever side information the format keeps.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub root: Node,
    /// Full-line comments by the path they precede. Only YAML fills this in.
    pub comments: Option<CommentIndex>,
}

impl Document {
    pub fn new(root: Node) -> Self {
        Self { root, comments: None }
    }
}

/// Parses and emits one document format.
pub trait DocumentCodec: Send + Sync {
    fn format(&self) -> Format;

    /// Parses plaintext input.
    fn parse(&self, text: &str) -> SopsResult<Document>;

    /// Emits a plaintext tree.
    fn serialize(&self, root: &Node) -> SopsResult<String>;

    /// Parses a document produced by [`DocumentCodec::serialize_encrypted`].
    fn parse_encrypted(&self, text: &str) -> SopsResult<Document> {
        self.parse(text)
    }

    /// Emits an encrypted tree that already carries its metadata.
    fn serialize_encrypted(&self, root: &Node) -> SopsResult<String> {
        self.serialize(root)
    }

    /// Whether parsing keeps comment positions, which comment rules need.
    fn supports_comments(&self) -> bool {
        false
    }

    /// Stores the metadata envelope under `key` as a nested mapping.
    fn embed_metadata(&self, root: &mut Node, key: &str, metadata: Value) -> SopsResult<()> {
        let node = Node::from_json(metadata)?;
        root_mapping_mut(root)?.insert(key.to_string(), node);
        Ok(())
    }

    /// Removes the metadata envelope stored under `key`, if any.
    fn extract_metadata(&self, root: &mut Node, key: &str) -> SopsResult<Option<Value>> {
        root_mapping_mut(root)?
            .shift_remove(key)
            .map(|node| node.to_json())
            .transpose()
    }
}

pub(crate) fn root_mapping_mut(root: &mut Node) -> SopsResult<&mut IndexMap<String, Node>> {
    root.as_mapping_mut()
        .ok_or_else(|| SopsError::MalformedDocument("document root must be a mapping".into()))
}

/// Removes `key` and decodes it as metadata stored in compact JSON text.
pub(crate) fn take_text_metadata(map: &mut IndexMap<String, Node>, key: &str) -> SopsResult<Option<Value>> {
    match map.shift_remove(key) {
        None => Ok(None),
        Some(Node::Scalar(crate::tree::Scalar::String(text))) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| SopsError::MalformedDocument(format!("metadata under {key:?} is not valid JSON: {e}"))),
        Some(_) => Err(SopsError::MalformedDocument(format!(
            "metadata under {key:?} must be a JSON string"
        ))),
    }
}
