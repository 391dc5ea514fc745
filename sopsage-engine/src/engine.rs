//! Encrypt and decrypt orchestration.
//!
//! Encryption runs `Parsed → Classified → KeyGenerated → LeavesProcessed →
//! MacComputed → Serialized`; decryption runs `Parsed → KeyGenerated →
//! LeavesProcessed → MacVerified → Serialized`. A failure at any step moves the
//! call to `Failed` and ends it with that step's error and no output.

use crate::classify::{Classification, ClassificationRule, PathClassifier};
use crate::codec::Format;
use crate::config::EngineConfig;
use crate::error::{SopsError, SopsResult};
use crate::leaf::{EncryptedLeaf, decrypt_leaf, encrypt_leaf};
use crate::mac;
use crate::metadata::Metadata;
use crate::tree::{Node, Scalar};
use sopsage_crypto::{
    AgeIdentity, AgeRecipient, CryptoError, DataKey, identities_from_env, keygroup, parse_identities, parse_recipients,
};
use std::borrow::Cow;
use std::fmt;
use tracing::{debug, trace, warn};

/// Steps of an encrypt or decrypt call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Parsed,
    Classified,
    KeyGenerated,
    LeavesProcessed,
    MacComputed,
    MacVerified,
    Serialized,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Classified => "classified",
            Self::KeyGenerated => "key-generated",
            Self::LeavesProcessed => "leaves-processed",
            Self::MacComputed => "mac-computed",
            Self::MacVerified => "mac-verified",
            Self::Serialized => "serialized",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct Progress {
    operation: &'static str,
    format: Format,
    reached: Option<Stage>,
}

impl Progress {
    fn new(operation: &'static str, format: Format) -> Self {
        Self {
            operation,
            format,
            reached: None,
        }
    }

    fn reach(&mut self, stage: Stage) {
        trace!("{} {}: {stage}", self.operation, self.format);
        self.reached = Some(stage);
    }

    fn finish<T>(&mut self, result: SopsResult<T>) -> SopsResult<T> {
        if let Err(e) = &result {
            let after = self.reached.map_or_else(|| "start".to_string(), |s| s.to_string());
            self.reach(Stage::Failed);
            warn!("{} of {} document failed after {after}: {}", self.operation, self.format, e.kind());
        }
        result
    }
}

/// Where decryption gets its private keys from.
enum KeySource<'a> {
    Text(&'a str),
    Identities(&'a [AgeIdentity]),
    Environment,
}

impl<'a> KeySource<'a> {
    fn resolve(self) -> SopsResult<Cow<'a, [AgeIdentity]>> {
        Ok(match self {
            Self::Text(text) => Cow::Owned(parse_identities(text)?),
            Self::Identities(identities) => Cow::Borrowed(identities),
            Self::Environment => Cow::Owned(identities_from_env()?),
        })
    }
}

/// Selective envelope encryption of structured documents.
///
/// Holds only configuration; every call builds its own tree and data key, so
/// one engine can serve concurrent calls from many threads.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> SopsResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Encrypts `plaintext` for one group of recipients (`age1...` strings).
    pub fn encrypt<S: AsRef<str>>(
        &self,
        plaintext: &str,
        format: Format,
        recipients: &[S],
        rule: &ClassificationRule,
    ) -> SopsResult<String> {
        self.encrypt_with_key_groups::<S, &[S]>(plaintext, format, &[recipients], rule)
    }

    /// Encrypts `plaintext` with one wrap of the data key per recipient of
    /// every group. Any single matching private key decrypts the result.
    pub fn encrypt_with_key_groups<S, G>(
        &self,
        plaintext: &str,
        format: Format,
        groups: &[G],
        rule: &ClassificationRule,
    ) -> SopsResult<String>
    where
        S: AsRef<str>,
        G: AsRef<[S]>,
    {
        let mut progress = Progress::new("encryption", format);
        let result = self.encrypt_inner(plaintext, format, groups, rule, &mut progress);
        progress.finish(result)
    }

    /// Decrypts with identity text: one `AGE-SECRET-KEY-1...` or an identity file.
    pub fn decrypt(&self, ciphertext: &str, format: Format, private_key: &str) -> SopsResult<String> {
        self.run_decrypt(ciphertext, format, KeySource::Text(private_key))
    }

    /// Decrypts with already parsed identities.
    pub fn decrypt_with_identities(
        &self,
        ciphertext: &str,
        format: Format,
        identities: &[AgeIdentity],
    ) -> SopsResult<String> {
        self.run_decrypt(ciphertext, format, KeySource::Identities(identities))
    }

    /// Decrypts with identities from `SOPS_AGE_KEY` or `SOPS_AGE_KEY_FILE`.
    pub fn decrypt_with_env(&self, ciphertext: &str, format: Format) -> SopsResult<String> {
        self.run_decrypt(ciphertext, format, KeySource::Environment)
    }

    fn run_decrypt(&self, ciphertext: &str, format: Format, keys: KeySource<'_>) -> SopsResult<String> {
        let mut progress = Progress::new("decryption", format);
        let result = self.decrypt_inner(ciphertext, format, keys, &mut progress);
        progress.finish(result)
    }

    fn encrypt_inner<S, G>(
        &self,
        plaintext: &str,
        format: Format,
        groups: &[G],
        rule: &ClassificationRule,
        progress: &mut Progress,
    ) -> SopsResult<String>
    where
        S: AsRef<str>,
        G: AsRef<[S]>,
    {
        let codec = format.codec(&self.config);
        let metadata_key = self.config.metadata_key.as_str();
        let classifier = PathClassifier::new(
            rule,
            &self.config.default_unencrypted_suffix,
            format,
            codec.supports_comments(),
        )?;

        let doc = codec.parse(plaintext)?;
        if doc.root.as_mapping().is_some_and(|m| m.contains_key(metadata_key)) {
            return Err(SopsError::MalformedDocument(format!(
                "document already has a {metadata_key:?} entry; refusing to encrypt it again"
            )));
        }
        progress.reach(Stage::Parsed);

        let classification = classifier.classify(&doc)?;
        reject_lookalike_leaves(&doc.root, &classification)?;
        progress.reach(Stage::Classified);

        let recipients = parse_groups(groups)?;
        let data_key = DataKey::generate()?;
        let key_groups = recipients
            .iter()
            .map(|group| keygroup::wrap(&data_key, group))
            .collect::<Result<Vec<_>, CryptoError>>()?;
        progress.reach(Stage::KeyGenerated);

        let mut encrypted = doc.root.clone();
        encrypted.for_each_scalar_mut(&mut |path, scalar| {
            if classification.is_encrypted(path) {
                let leaf = encrypt_leaf(scalar, &data_key, path)?;
                *scalar = Scalar::String(leaf.to_string());
            }
            Ok(())
        })?;
        progress.reach(Stage::LeavesProcessed);

        let lastmodified = Metadata::now();
        let tag = mac::compute(&doc.root, &lastmodified, &data_key)?;
        progress.reach(Stage::MacComputed);

        let metadata = Metadata::new(
            key_groups,
            classifier.effective_rule().clone(),
            lastmodified,
            &tag,
            format,
        );
        codec.embed_metadata(&mut encrypted, metadata_key, metadata.to_value()?)?;
        let text = codec.serialize_encrypted(&encrypted)?;
        progress.reach(Stage::Serialized);

        debug!(
            "encrypted {} of {} leaves of {format} document for {} recipients",
            classification.encrypted_count(),
            classification.len(),
            metadata.recipients().count()
        );
        Ok(text)
    }

    fn decrypt_inner(
        &self,
        ciphertext: &str,
        format: Format,
        keys: KeySource<'_>,
        progress: &mut Progress,
    ) -> SopsResult<String> {
        let codec = format.codec(&self.config);
        let metadata_key = self.config.metadata_key.as_str();

        let mut doc = codec.parse_encrypted(ciphertext)?;
        let metadata = codec
            .extract_metadata(&mut doc.root, metadata_key)?
            .ok_or_else(|| {
                SopsError::MalformedDocument(format!("document has no {metadata_key:?} metadata; it is not encrypted"))
            })?;
        let metadata = Metadata::from_value(metadata)?;
        if metadata.format != format {
            return Err(SopsError::MalformedDocument(format!(
                "document was encrypted as {} but is being decrypted as {format}",
                metadata.format
            )));
        }
        progress.reach(Stage::Parsed);

        let identities = keys.resolve()?;
        let data_key = keygroup::unwrap(&metadata.key_groups, &identities)?;
        progress.reach(Stage::KeyGenerated);

        let mut root = doc.root;
        let mut opened = 0usize;
        root.for_each_scalar_mut(&mut |path, scalar| {
            if let Scalar::String(text) = scalar {
                if EncryptedLeaf::looks_encrypted(text) {
                    let value = decrypt_leaf(text, &data_key, path)?;
                    *scalar = value;
                    opened += 1;
                }
            }
            Ok(())
        })?;
        progress.reach(Stage::LeavesProcessed);

        let expected = metadata.mac_bytes()?;
        mac::verify(&root, &metadata.lastmodified, &data_key, &expected)?;
        progress.reach(Stage::MacVerified);

        let text = codec.serialize(&root)?;
        progress.reach(Stage::Serialized);

        debug!("decrypted {opened} leaves of {format} document");
        Ok(text)
    }
}

fn parse_groups<S, G>(groups: &[G]) -> SopsResult<Vec<Vec<AgeRecipient>>>
where
    S: AsRef<str>,
    G: AsRef<[S]>,
{
    if groups.is_empty() {
        return Err(CryptoError::InvalidRecipientKey("at least one key group is required".into()).into());
    }
    groups
        .iter()
        .enumerate()
        .map(|(index, group)| {
            let group: &[S] = group.as_ref();
            parse_recipients(group).map_err(|e| match e {
                CryptoError::InvalidRecipientKey(msg) if groups.len() > 1 => SopsError::from(
                    CryptoError::InvalidRecipientKey(format!("key group #{index}, {msg}")),
                ),
                other => SopsError::from(other),
            })
        })
        .collect()
}

/// Cleartext strings shaped like encrypted leaves would be "decrypted" later.
fn reject_lookalike_leaves(root: &Node, classification: &Classification) -> SopsResult<()> {
    root.for_each_scalar(&mut |path, scalar| match scalar {
        Scalar::String(s) if !classification.is_encrypted(path) && EncryptedLeaf::looks_encrypted(s) => Err(
            SopsError::MalformedDocument(format!("cleartext value at {path} looks like an encrypted value")),
        ),
        _ => Ok(()),
    })
}

/// Encrypts `plaintext` using a format tag such as `"json"` and the default configuration.
pub fn encrypt<S: AsRef<str>>(
    plaintext: &str,
    format: &str,
    recipients: &[S],
    rule: &ClassificationRule,
) -> SopsResult<String> {
    let format: Format = format.parse()?;
    Engine::default().encrypt(plaintext, format, recipients, rule)
}

/// Decrypts `ciphertext` using a format tag and the default configuration.
pub fn decrypt(ciphertext: &str, format: &str, private_key: &str) -> SopsResult<String> {
    let format: Format = format.parse()?;
    Engine::default().decrypt(ciphertext, format, private_key)
}
