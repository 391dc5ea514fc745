//! Key material and envelope primitives for sopsage.
//!
//! Provides the cryptographic layer under the document engine:
//! - age X25519 recipients and identities (bech32 text forms)
//! - Ed25519 SSH key to age key conversion
//! - Per-recipient wrapping of a document data key (key groups)
//! - ChaCha20-Poly1305 sealing of individual values
//! - HMAC-SHA256 document MACs
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **Data Key**: A random 256-bit key generated for each encryption.
//!    It seals every selected value and keys the document MAC. It is never
//!    stored in the clear.
//!
//! 2. **Recipient Keys**: age X25519 public keys. The data key is wrapped
//!    once per recipient and the wraps travel with the document, so any one
//!    matching private key recovers it.

mod error;
mod serde_b64;

pub mod cipher;
pub mod keygroup;
pub mod keys;
pub mod mac;
pub mod ssh;

pub use cipher::{NONCE_SIZE, SealedValue, open, seal};
pub use error::{CryptoError, CryptoResult};
pub use keygroup::{DATA_KEY_SIZE, DataKey, KeyGroup, TAG_SIZE, WrappedKeyEntry, unwrap, unwrap_group, wrap};
pub use keys::{
    AGE_KEY_ENV, AGE_KEY_FILE_ENV, AgeIdentity, AgeRecipient, identities_from_env, parse_identities,
    parse_recipients,
};
pub use mac::{DocumentMac, MAC_SIZE};
pub use ssh::{
    AgeKeyPair, age_keypair_from_ssh_private_key, age_recipient_from_ssh_public_key, derive_age_keypair,
    derive_public_only,
};
