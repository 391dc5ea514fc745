//! Selective envelope encryption for configuration documents.
//!
//! A document (JSON, YAML, dotenv, INI or opaque text) is parsed into a
//! typed tree. A classification rule picks the leaves to encrypt; each of
//! those is sealed under a fresh per-document data key, and the data key is
//! wrapped for every age recipient. Everything else stays readable so the
//! encrypted file still diffs and reviews like the original.
//!
//! # Example
//!
//! ```no_run
//! use sopsage_engine::{ClassificationRule, Engine, Format};
//!
//! let engine = Engine::default();
//! let recipients = ["age1q73he0q5yzfu3d64msd3p6rvksnrwjk3d2598mgtmlqt9wrdr37q2vrn72"];
//! let encrypted = engine.encrypt(
//!     r#"{"password": "hunter2", "host_unencrypted": "db.local"}"#,
//!     Format::Json,
//!     &recipients,
//!     &ClassificationRule::default(),
//! )?;
//! # Ok::<(), sopsage_engine::SopsError>(())
//! ```
//!
//! The metadata envelope (key groups, rule, MAC) is written under a reserved
//! key, `sops` by default. Decryption only needs the document and one
//! matching private key.

pub mod classify;
pub mod codec;
pub mod config;
pub mod engine;
mod error;
pub mod leaf;
pub mod mac;
pub mod metadata;
pub mod tree;

pub use classify::{Classification, ClassificationRule, LeafClass, PathClassifier, RuleKind};
pub use codec::{Document, DocumentCodec, Format};
pub use config::EngineConfig;
pub use engine::{Engine, Stage, decrypt, encrypt};
pub use error::{ErrorKind, SopsError, SopsResult};
pub use leaf::EncryptedLeaf;
pub use metadata::Metadata;
pub use tree::{Node, Path, PathSegment, Scalar};

pub use sopsage_crypto::{
    AGE_KEY_ENV, AGE_KEY_FILE_ENV, AgeIdentity, AgeKeyPair, AgeRecipient, CryptoError, age_keypair_from_ssh_private_key,
    age_recipient_from_ssh_public_key, derive_age_keypair, derive_public_only,
};
