//! The metadata envelope stored alongside an encrypted document.

use crate::classify::ClassificationRule;
use crate::codec::Format;
use crate::error::{SopsError, SopsResult};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sopsage_crypto::{KeyGroup, MAC_SIZE};

/// Version written into new envelopes.
pub const METADATA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a holder of one private key needs to decrypt the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Wraps of the data key; any entry of any group unlocks the document.
    pub key_groups: Vec<KeyGroup>,

    /// The rule that was applied at encryption time.
    #[serde(flatten)]
    pub rule: ClassificationRule,

    /// RFC 3339 UTC timestamp, covered by the MAC.
    pub lastmodified: String,

    /// Base64 document MAC.
    pub mac: String,

    pub format: Format,

    pub version: String,
}

impl Metadata {
    pub fn new(
        key_groups: Vec<KeyGroup>,
        rule: ClassificationRule,
        lastmodified: String,
        mac: &[u8; MAC_SIZE],
        format: Format,
    ) -> Self {
        Self {
            key_groups,
            rule,
            lastmodified,
            mac: STANDARD.encode(mac),
            format,
            version: METADATA_VERSION.to_string(),
        }
    }

    /// Current time in the form stored in `lastmodified`.
    pub fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn to_value(&self) -> SopsResult<Value> {
        serde_json::to_value(self).map_err(|e| SopsError::MalformedDocument(format!("cannot encode metadata: {e}")))
    }

    pub fn from_value(value: Value) -> SopsResult<Self> {
        serde_json::from_value(value).map_err(|e| SopsError::MalformedDocument(format!("invalid metadata: {e}")))
    }

    /// Decoded MAC bytes. A MAC that is not base64 counts as tampering.
    pub fn mac_bytes(&self) -> SopsResult<Vec<u8>> {
        STANDARD
            .decode(self.mac.as_bytes())
            .map_err(|_| SopsError::authentication("document MAC is not valid base64"))
    }

    /// Recipient strings of every wrap, in order.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.key_groups
            .iter()
            .flat_map(|g| g.entries.iter().map(|e| e.recipient.as_str()))
    }
}
