//! Encrypted leaf values.
//!
//! A leaf is stored inline as
//! `ENC[CHACHA20_POLY1305,data:<b64>,iv:<b64>,tag:<b64>,type:<type>]`.
//! The plaintext is the scalar's canonical text and the associated data is
//! the leaf's path, so a leaf only opens at the path it was sealed for.

use crate::error::{SopsError, SopsResult};
use crate::tree::{Path, Scalar};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sopsage_crypto::{DataKey, NONCE_SIZE, SealedValue, TAG_SIZE, cipher};
use std::fmt;

/// Prefix that marks a string value as an encrypted leaf.
pub const LEAF_PREFIX: &str = "ENC[";

const ALGORITHM: &str = "CHACHA20_POLY1305";

/// Scalar type carried next to the ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Str,
    Int,
    Float,
    Bool,
    Null,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Null => "null",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "str" => Self::Str,
            "int" => Self::Int,
            "float" => Self::Float,
            "bool" => Self::Bool,
            "null" => Self::Null,
            _ => return None,
        })
    }
}

/// A sealed scalar plus its type tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedLeaf {
    pub sealed: SealedValue,
    pub value_type: ValueType,
}

impl EncryptedLeaf {
    /// True if `text` claims to be an encrypted leaf, well-formed or not.
    pub fn looks_encrypted(text: &str) -> bool {
        text.starts_with(LEAF_PREFIX)
    }

    /// Parses the inline text form. `None` if any field is missing or malformed.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.strip_prefix(LEAF_PREFIX)?.strip_suffix(']')?;
        let mut fields = body.split(',');
        if fields.next()? != ALGORITHM {
            return None;
        }
        let ciphertext = decode(fields.next()?.strip_prefix("data:")?)?;
        let nonce: [u8; NONCE_SIZE] = decode(fields.next()?.strip_prefix("iv:")?)?.try_into().ok()?;
        let tag: [u8; TAG_SIZE] = decode(fields.next()?.strip_prefix("tag:")?)?.try_into().ok()?;
        let value_type = ValueType::parse(fields.next()?.strip_prefix("type:")?)?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            sealed: SealedValue { ciphertext, nonce, tag },
            value_type,
        })
    }
}

impl fmt::Display for EncryptedLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{LEAF_PREFIX}{ALGORITHM},data:{},iv:{},tag:{},type:{}]",
            STANDARD.encode(&self.sealed.ciphertext),
            STANDARD.encode(self.sealed.nonce),
            STANDARD.encode(self.sealed.tag),
            self.value_type.as_str()
        )
    }
}

fn decode(text: &str) -> Option<Vec<u8>> {
    STANDARD.decode(text).ok()
}

/// Seals one scalar for `path`.
pub fn encrypt_leaf(value: &Scalar, key: &DataKey, path: &Path) -> SopsResult<EncryptedLeaf> {
    let (value_type, plaintext) = canonical_bytes(value);
    let sealed = cipher::seal(key, &plaintext, &path.to_aad())?;
    Ok(EncryptedLeaf { sealed, value_type })
}

/// Opens the leaf text found at `path`.
///
/// Malformed leaf text fails the same way as a bad tag.
pub fn decrypt_leaf(text: &str, key: &DataKey, path: &Path) -> SopsResult<Scalar> {
    let leaf = EncryptedLeaf::parse(text)
        .ok_or_else(|| SopsError::authentication(format!("value at {path} is not a well-formed encrypted leaf")))?;
    let plaintext = cipher::open(key, &leaf.sealed, &path.to_aad(), &path.dotted())?;
    from_canonical_bytes(leaf.value_type, plaintext)
        .ok_or_else(|| SopsError::MalformedDocument(format!("value at {path} does not decode as {}", leaf.value_type.as_str())))
}

fn canonical_bytes(value: &Scalar) -> (ValueType, Vec<u8>) {
    match value {
        Scalar::String(s) => (ValueType::Str, s.as_bytes().to_vec()),
        Scalar::Int(i) => (ValueType::Int, i.to_string().into_bytes()),
        Scalar::Float(f) => (ValueType::Float, f.to_string().into_bytes()),
        Scalar::Bool(b) => (ValueType::Bool, b.to_string().into_bytes()),
        Scalar::Null => (ValueType::Null, Vec::new()),
    }
}

fn from_canonical_bytes(value_type: ValueType, bytes: Vec<u8>) -> Option<Scalar> {
    let text = String::from_utf8(bytes).ok()?;
    Some(match value_type {
        ValueType::Str => Scalar::String(text),
        ValueType::Int => Scalar::Int(text.parse().ok()?),
        ValueType::Float => Scalar::Float(text.parse().ok()?),
        ValueType::Bool => Scalar::Bool(text.parse().ok()?),
        ValueType::Null if text.is_empty() => Scalar::Null,
        ValueType::Null => return None,
    })
}
