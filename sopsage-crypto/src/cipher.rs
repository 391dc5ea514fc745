//! Authenticated sealing of individual values under a data key.
//!
//! ChaCha20-Poly1305 with a random 96-bit nonce per value. Callers pass the
//! value's location as associated data so a sealed value only opens where it
//! was sealed.

use crate::error::{CryptoError, CryptoResult};
use crate::keygroup::{DataKey, TAG_SIZE};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce, Tag};
use rand::RngCore;
use rand::rngs::OsRng;

/// Size of a ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// A sealed value: ciphertext with its nonce and detached tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedValue {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

/// Seals `plaintext` under `key`, bound to `aad`.
pub fn seal(key: &DataKey, plaintext: &[u8], aad: &[u8]) -> CryptoResult<SealedValue> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::InternalCryptoFailure(format!("random source failed: {e}")))?;

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher_for(key)?
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut ciphertext)
        .map_err(|_| CryptoError::InternalCryptoFailure("value sealing failed".into()))?;

    Ok(SealedValue {
        ciphertext,
        nonce,
        tag: tag.into(),
    })
}

/// Opens a sealed value.
///
/// A wrong key, a modified ciphertext/nonce/tag and a different `aad` all
/// produce the same `AuthenticationFailure`; `context` names the location for
/// the error message.
pub fn open(key: &DataKey, sealed: &SealedValue, aad: &[u8], context: &str) -> CryptoResult<Vec<u8>> {
    let mut plaintext = sealed.ciphertext.clone();
    cipher_for(key)?
        .decrypt_in_place_detached(
            Nonce::from_slice(&sealed.nonce),
            aad,
            &mut plaintext,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailure(format!("value at {context} failed to authenticate")))?;
    Ok(plaintext)
}

fn cipher_for(key: &DataKey) -> CryptoResult<ChaCha20Poly1305> {
    ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InternalCryptoFailure(format!("cipher init failed: {e}")))
}
