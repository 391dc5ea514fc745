//! Data key wrapping for key groups.
//!
//! Every encryption generates a fresh 256-bit data key. The data key is
//! wrapped once per recipient with an ephemeral X25519 key agreement:
//!
//! 1. A fresh ephemeral X25519 key pair is generated for the recipient.
//! 2. The shared secret with the recipient's public key is fed to
//!    HKDF-SHA256, salted with `ephemeral_pk || recipient_pk`.
//! 3. The derived key seals the data key with ChaCha20-Poly1305. The key is
//!    used exactly once, so the nonce is fixed at zero.
//!
//! A document carries an ordered list of key groups; any wrap in any group
//! recovers the data key.

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{AgeIdentity, AgeRecipient};
use crate::serde_b64;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce, Tag};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tracing::{debug, trace};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of a data key in bytes.
pub const DATA_KEY_SIZE: usize = 32;

/// Size of a Poly1305 tag in bytes.
pub const TAG_SIZE: usize = 16;

const WRAP_INFO: &[u8] = b"age-encryption.org/v1/X25519";

/// Per-document symmetric key. Lives only for one encrypt or decrypt call.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; DATA_KEY_SIZE],
}

impl DataKey {
    /// Generates a fresh data key from the OS random source.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; DATA_KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::InternalCryptoFailure(format!("random source failed: {e}")))?;
        Ok(Self { bytes })
    }

    /// Wraps existing key bytes.
    pub fn from_bytes(bytes: [u8; DATA_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw key bytes. Never log or persist them.
    pub fn as_bytes(&self) -> &[u8; DATA_KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// The data key wrapped for one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyEntry {
    /// Recipient the entry was wrapped for, as `age1...`.
    pub recipient: String,
    /// Ephemeral X25519 public key used for the key agreement.
    #[serde(with = "serde_b64::array")]
    pub ephemeral_public_key: [u8; 32],
    /// Data key encrypted under the derived wrap key.
    #[serde(with = "serde_b64::bytes")]
    pub wrapped_key: Vec<u8>,
    /// Poly1305 tag over `wrapped_key`.
    #[serde(with = "serde_b64::array")]
    pub tag: [u8; TAG_SIZE],
}

/// Recipients that jointly hold wraps of one data key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyGroup {
    pub entries: Vec<WrappedKeyEntry>,
}

impl KeyGroup {
    /// Number of wraps in the group.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the group holds no wraps.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wraps `data_key` for every recipient, in order.
///
/// A recipient that cannot be wrapped for aborts the whole group: a group
/// missing one of its intended recipients must never be returned.
pub fn wrap(data_key: &DataKey, recipients: &[AgeRecipient]) -> CryptoResult<KeyGroup> {
    if recipients.is_empty() {
        return Err(CryptoError::InvalidRecipientKey(
            "a key group needs at least one recipient".into(),
        ));
    }

    let entries = recipients
        .iter()
        .enumerate()
        .map(|(index, recipient)| wrap_for(data_key, index, recipient))
        .collect::<CryptoResult<Vec<_>>>()?;

    debug!("wrapped data key for {} recipients", entries.len());
    Ok(KeyGroup { entries })
}

fn wrap_for(data_key: &DataKey, index: usize, recipient: &AgeRecipient) -> CryptoResult<WrappedKeyEntry> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pk = PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient.to_x25519());
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidRecipientKey(format!(
            "recipient #{index} ({recipient}) is a low-order point"
        )));
    }

    let cipher = wrap_cipher(shared.as_bytes(), ephemeral_pk.as_bytes(), recipient.as_bytes())?;
    let mut wrapped_key = data_key.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&Nonce::default(), &[], &mut wrapped_key)
        .map_err(|_| {
            CryptoError::InternalCryptoFailure(format!("sealing data key for recipient #{index} failed"))
        })?;

    Ok(WrappedKeyEntry {
        recipient: recipient.to_bech32()?,
        ephemeral_public_key: ephemeral_pk.to_bytes(),
        wrapped_key,
        tag: tag.into(),
    })
}

/// Recovers the data key from any wrap in `groups` that opens with one of
/// `identities`.
///
/// Every entry is probed with every identity even after a match, so the time
/// taken does not reveal which entry (if any) belongs to the caller.
pub fn unwrap(groups: &[KeyGroup], identities: &[AgeIdentity]) -> CryptoResult<DataKey> {
    if identities.is_empty() {
        return Err(CryptoError::InvalidRecipientKey("no private key supplied".into()));
    }

    let mut recovered: Option<DataKey> = None;
    for (group_index, group) in groups.iter().enumerate() {
        for (entry_index, entry) in group.entries.iter().enumerate() {
            for identity in identities {
                if let Some(key) = try_open(entry, identity) {
                    trace!("opened key group #{group_index} entry #{entry_index}");
                    if recovered.is_none() {
                        recovered = Some(key);
                    }
                }
            }
        }
    }

    recovered.ok_or(CryptoError::NoMatchingRecipient)
}

/// Recovers the data key from a single key group.
pub fn unwrap_group(group: &KeyGroup, identities: &[AgeIdentity]) -> CryptoResult<DataKey> {
    unwrap(std::slice::from_ref(group), identities)
}

fn try_open(entry: &WrappedKeyEntry, identity: &AgeIdentity) -> Option<DataKey> {
    let ephemeral_pk = PublicKey::from(entry.ephemeral_public_key);
    let shared = identity.secret().diffie_hellman(&ephemeral_pk);
    if !shared.was_contributory() {
        return None;
    }
    let own_pk = identity.recipient();
    let cipher = wrap_cipher(shared.as_bytes(), &entry.ephemeral_public_key, own_pk.as_bytes()).ok()?;

    let mut buffer = Zeroizing::new(entry.wrapped_key.clone());
    cipher
        .decrypt_in_place_detached(&Nonce::default(), &[], &mut buffer, Tag::from_slice(&entry.tag))
        .ok()?;
    let bytes: [u8; DATA_KEY_SIZE] = buffer.as_slice().try_into().ok()?;
    Some(DataKey::from_bytes(bytes))
}

fn wrap_cipher(shared: &[u8; 32], ephemeral_pk: &[u8; 32], recipient_pk: &[u8; 32]) -> CryptoResult<ChaCha20Poly1305> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_pk);
    salt[32..].copy_from_slice(recipient_pk);

    let mut wrap_key = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(Some(&salt[..]), shared)
        .expand(WRAP_INFO, &mut wrap_key[..])
        .map_err(|e| CryptoError::InternalCryptoFailure(format!("wrap key derivation failed: {e}")))?;
    ChaCha20Poly1305::new_from_slice(&wrap_key[..])
        .map_err(|e| CryptoError::InternalCryptoFailure(format!("wrap cipher init failed: {e}")))
}
