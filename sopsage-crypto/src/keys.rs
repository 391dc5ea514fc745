//! age recipient and identity keys.
//!
//! Recipients are X25519 public keys encoded as lowercase bech32 with the
//! `age` prefix. Identities are X25519 secret scalars encoded as uppercase
//! bech32 with the `AGE-SECRET-KEY-` prefix. Identity text is treated as highly
//! sensitive: it is never logged and `Debug` output is redacted.

use crate::error::{CryptoError, CryptoResult};
use bech32::{Bech32, Hrp};
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Human-readable prefix of an age recipient.
pub const RECIPIENT_HRP: &str = "age";

/// Human-readable prefix of an age identity (encoded in upper case).
pub const IDENTITY_HRP: &str = "age-secret-key-";

/// Environment variable holding one or more inline age identities.
pub const AGE_KEY_ENV: &str = "SOPS_AGE_KEY";

/// Environment variable holding the path of an age identity file.
pub const AGE_KEY_FILE_ENV: &str = "SOPS_AGE_KEY_FILE";

const KEY_LEN: usize = 32;

/// An age X25519 recipient (public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgeRecipient {
    bytes: [u8; KEY_LEN],
}

impl AgeRecipient {
    /// Wraps raw X25519 public key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parses a bech32 `age1...` recipient string.
    pub fn parse(text: &str) -> CryptoResult<Self> {
        let text = text.trim();
        let (hrp, data) = bech32::decode(text).map_err(|e| {
            CryptoError::InvalidRecipientKey(format!("not a bech32 age recipient: {e}"))
        })?;
        if !hrp.as_str().eq_ignore_ascii_case(RECIPIENT_HRP) {
            return Err(CryptoError::InvalidRecipientKey(format!(
                "unexpected prefix {:?}, expected {RECIPIENT_HRP:?}",
                hrp.as_str()
            )));
        }
        let bytes: [u8; KEY_LEN] = data.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidRecipientKey(format!(
                "expected {KEY_LEN} key bytes, got {}",
                data.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Returns the raw X25519 point.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub(crate) fn to_x25519(self) -> PublicKey {
        PublicKey::from(self.bytes)
    }

    /// Encodes the recipient as `age1...`.
    pub fn to_bech32(&self) -> CryptoResult<String> {
        encode(RECIPIENT_HRP, &self.bytes, false)
    }
}

impl fmt::Display for AgeRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bech32().map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for AgeRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgeRecipient({})", self.to_bech32().map_err(|_| fmt::Error)?)
    }
}

impl FromStr for AgeRecipient {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        Self::parse(s)
    }
}

/// An age X25519 identity (private key).
///
/// The scalar is zeroized on drop by `x25519-dalek`.
#[derive(Clone)]
pub struct AgeIdentity {
    secret: StaticSecret,
}

impl AgeIdentity {
    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Wraps raw X25519 scalar bytes. Clamping happens on use.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// Parses a single `AGE-SECRET-KEY-1...` string.
    pub fn parse(text: &str) -> CryptoResult<Self> {
        // Error messages must not echo the input.
        let (hrp, data) = bech32::decode(text.trim()).map_err(|_| {
            CryptoError::InvalidRecipientKey("private key is not a bech32 age identity".into())
        })?;
        let data = Zeroizing::new(data);
        if !hrp.as_str().eq_ignore_ascii_case(IDENTITY_HRP) {
            return Err(CryptoError::InvalidRecipientKey(format!(
                "private key has prefix {:?}, expected {:?}",
                hrp.as_str(),
                IDENTITY_HRP.to_ascii_uppercase()
            )));
        }
        let bytes: [u8; KEY_LEN] = data.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidRecipientKey(format!(
                "private key must hold {KEY_LEN} bytes, got {}",
                data.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Returns the matching recipient.
    pub fn recipient(&self) -> AgeRecipient {
        AgeRecipient::from_bytes(PublicKey::from(&self.secret).to_bytes())
    }

    /// Encodes the identity as `AGE-SECRET-KEY-1...`.
    ///
    /// Handle the returned string as secret material.
    pub fn to_bech32(&self) -> CryptoResult<Zeroizing<String>> {
        let bytes = Zeroizing::new(self.secret.to_bytes());
        encode(IDENTITY_HRP, &bytes[..], true).map(Zeroizing::new)
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl fmt::Debug for AgeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgeIdentity([REDACTED], recipient={})", self.recipient())
    }
}

/// Parses an ordered list of recipient strings.
///
/// The first malformed entry aborts the whole list; the error names its index.
pub fn parse_recipients<S: AsRef<str>>(recipients: &[S]) -> CryptoResult<Vec<AgeRecipient>> {
    recipients
        .iter()
        .enumerate()
        .map(|(i, r)| {
            AgeRecipient::parse(r.as_ref()).map_err(|e| match e {
                CryptoError::InvalidRecipientKey(msg) => {
                    CryptoError::InvalidRecipientKey(format!("recipient #{i}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Parses age identity text.
///
/// Accepts either a bare `AGE-SECRET-KEY-1...` string or the contents of an
/// identity file: blank lines and `#` comment lines are skipped, every other
/// line must be an identity.
pub fn parse_identities(text: &str) -> CryptoResult<Vec<AgeIdentity>> {
    let mut identities = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let identity = AgeIdentity::parse(line).map_err(|e| match e {
            CryptoError::InvalidRecipientKey(msg) => {
                CryptoError::InvalidRecipientKey(format!("line {}: {msg}", lineno + 1))
            }
            other => other,
        })?;
        identities.push(identity);
    }
    if identities.is_empty() {
        return Err(CryptoError::InvalidRecipientKey(
            "no age identity found in private key input".into(),
        ));
    }
    Ok(identities)
}

/// Loads identities from `SOPS_AGE_KEY`, falling back to `SOPS_AGE_KEY_FILE`.
///
/// The environment is only read here.
pub fn identities_from_env() -> CryptoResult<Vec<AgeIdentity>> {
    if let Ok(inline) = std::env::var(AGE_KEY_ENV) {
        if !inline.trim().is_empty() {
            let inline = Zeroizing::new(inline);
            return parse_identities(&inline);
        }
    }
    if let Ok(path) = std::env::var(AGE_KEY_FILE_ENV) {
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            CryptoError::InvalidRecipientKey(format!("cannot read {AGE_KEY_FILE_ENV} ({path}): {e}"))
        })?;
        let contents = Zeroizing::new(contents);
        return parse_identities(&contents);
    }
    Err(CryptoError::InvalidRecipientKey(format!(
        "no age identity configured: set {AGE_KEY_ENV} or {AGE_KEY_FILE_ENV}"
    )))
}

fn encode(hrp: &str, data: &[u8], upper: bool) -> CryptoResult<String> {
    let hrp = Hrp::parse(hrp)
        .map_err(|e| CryptoError::InternalCryptoFailure(format!("invalid bech32 prefix: {e}")))?;
    let encoded = if upper {
        bech32::encode_upper::<Bech32>(hrp, data)
    } else {
        bech32::encode::<Bech32>(hrp, data)
    };
    encoded.map_err(|e| CryptoError::InternalCryptoFailure(format!("bech32 encoding failed: {e}")))
}
