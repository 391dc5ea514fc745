//! Keyed MAC over a whole document.
//!
//! HMAC-SHA256 under a key derived from the data key with HKDF, so the MAC
//! key is never the same as the leaf-sealing key.

use crate::error::{CryptoError, CryptoResult};
use crate::keygroup::DataKey;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Size of a document MAC in bytes.
pub const MAC_SIZE: usize = 32;

const MAC_KEY_INFO: &[u8] = b"sopsage document mac";

type HmacSha256 = Hmac<Sha256>;

/// Incremental document MAC.
pub struct DocumentMac {
    inner: HmacSha256,
}

impl DocumentMac {
    /// Starts a MAC keyed from `data_key`.
    pub fn new(data_key: &DataKey) -> CryptoResult<Self> {
        let mut mac_key = Zeroizing::new([0u8; 32]);
        Hkdf::<Sha256>::new(None, data_key.as_bytes())
            .expand(MAC_KEY_INFO, &mut mac_key[..])
            .map_err(|e| CryptoError::InternalCryptoFailure(format!("MAC key derivation failed: {e}")))?;
        let inner = <HmacSha256 as Mac>::new_from_slice(&mac_key[..])
            .map_err(|e| CryptoError::InternalCryptoFailure(format!("MAC init failed: {e}")))?;
        Ok(Self { inner })
    }

    /// Feeds bytes into the MAC.
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Returns the tag.
    pub fn finalize(self) -> [u8; MAC_SIZE] {
        self.inner.finalize().into_bytes().into()
    }

    /// Compares against an expected tag in constant time.
    pub fn verify(self, expected: &[u8]) -> CryptoResult<()> {
        self.inner
            .verify_slice(expected)
            .map_err(|_| CryptoError::AuthenticationFailure("document MAC mismatch".into()))
    }
}
