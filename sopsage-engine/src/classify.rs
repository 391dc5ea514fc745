//! Path classification: which leaves get encrypted.
//!
//! A rule is one of six families. The `unencrypted_*` families leave matching
//! leaves in cleartext and encrypt the rest; the `encrypted_*` families
//! encrypt only matching leaves. A match on any ancestor key covers the
//! whole subtree below it.

use crate::codec::{CommentIndex, Document, Format};
use crate::error::{SopsError, SopsResult};
use crate::tree::Path;
use indexmap::IndexMap;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The classification rule for one document. Empty strings are inactive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unencrypted_suffix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypted_suffix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unencrypted_regex: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypted_regex: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unencrypted_comment_regex: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypted_comment_regex: String,
}

/// The six rule families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    UnencryptedSuffix,
    EncryptedSuffix,
    UnencryptedRegex,
    EncryptedRegex,
    UnencryptedCommentRegex,
    EncryptedCommentRegex,
}

impl RuleKind {
    pub const ALL: [RuleKind; 6] = [
        Self::UnencryptedSuffix,
        Self::EncryptedSuffix,
        Self::UnencryptedRegex,
        Self::EncryptedRegex,
        Self::UnencryptedCommentRegex,
        Self::EncryptedCommentRegex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnencryptedSuffix => "unencrypted_suffix",
            Self::EncryptedSuffix => "encrypted_suffix",
            Self::UnencryptedRegex => "unencrypted_regex",
            Self::EncryptedRegex => "encrypted_regex",
            Self::UnencryptedCommentRegex => "unencrypted_comment_regex",
            Self::EncryptedCommentRegex => "encrypted_comment_regex",
        }
    }

    /// True for the families where a match means "encrypt".
    pub fn encrypts_matches(self) -> bool {
        matches!(self, Self::EncryptedSuffix | Self::EncryptedRegex | Self::EncryptedCommentRegex)
    }

    pub fn needs_comments(self) -> bool {
        matches!(self, Self::UnencryptedCommentRegex | Self::EncryptedCommentRegex)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClassificationRule {
    /// A rule with exactly one family set.
    pub fn single(kind: RuleKind, pattern: impl Into<String>) -> Self {
        let mut rule = Self::default();
        *rule.field_mut(kind) = pattern.into();
        rule
    }

    pub fn get(&self, kind: RuleKind) -> &str {
        match kind {
            RuleKind::UnencryptedSuffix => &self.unencrypted_suffix,
            RuleKind::EncryptedSuffix => &self.encrypted_suffix,
            RuleKind::UnencryptedRegex => &self.unencrypted_regex,
            RuleKind::EncryptedRegex => &self.encrypted_regex,
            RuleKind::UnencryptedCommentRegex => &self.unencrypted_comment_regex,
            RuleKind::EncryptedCommentRegex => &self.encrypted_comment_regex,
        }
    }

    fn field_mut(&mut self, kind: RuleKind) -> &mut String {
        match kind {
            RuleKind::UnencryptedSuffix => &mut self.unencrypted_suffix,
            RuleKind::EncryptedSuffix => &mut self.encrypted_suffix,
            RuleKind::UnencryptedRegex => &mut self.unencrypted_regex,
            RuleKind::EncryptedRegex => &mut self.encrypted_regex,
            RuleKind::UnencryptedCommentRegex => &mut self.unencrypted_comment_regex,
            RuleKind::EncryptedCommentRegex => &mut self.encrypted_comment_regex,
        }
    }

    /// Families with a non-empty pattern.
    pub fn active(&self) -> Vec<RuleKind> {
        RuleKind::ALL.into_iter().filter(|k| !self.get(*k).is_empty()).collect()
    }

    /// Fails if more than one family is set. Needs nothing but the rule itself.
    pub fn check_unambiguous(&self) -> SopsResult<()> {
        let active = self.active();
        if active.len() > 1 {
            let names: Vec<&str> = active.iter().map(|k| k.as_str()).collect();
            return Err(SopsError::AmbiguousClassification(format!(
                "only one rule may be set, got {}",
                names.join(", ")
            )));
        }
        Ok(())
    }
}

/// Outcome for one leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafClass {
    Encrypted,
    Unencrypted,
}

/// Class of every scalar leaf, in document order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classification {
    leaves: IndexMap<Path, LeafClass>,
}

impl Classification {
    pub fn get(&self, path: &Path) -> Option<LeafClass> {
        self.leaves.get(path).copied()
    }

    pub fn is_encrypted(&self, path: &Path) -> bool {
        self.get(path) == Some(LeafClass::Encrypted)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, LeafClass)> {
        self.leaves.iter().map(|(p, c)| (p, *c))
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn encrypted_count(&self) -> usize {
        self.leaves.values().filter(|c| **c == LeafClass::Encrypted).count()
    }
}

enum Matcher {
    Suffix(String),
    Regex(Regex),
    Comment(Regex),
}

/// A validated rule, ready to classify documents of one format.
pub struct PathClassifier {
    kind: RuleKind,
    matcher: Matcher,
    rule: ClassificationRule,
}

impl PathClassifier {
    /// Validates `rule` for `format`.
    ///
    /// Checks run in order: ambiguity, format support, regex syntax. With no
    /// family set, `unencrypted_suffix = default_suffix` applies.
    pub fn new(rule: &ClassificationRule, default_suffix: &str, format: Format, supports_comments: bool) -> SopsResult<Self> {
        rule.check_unambiguous()?;

        let rule = match rule.active().first() {
            Some(_) => rule.clone(),
            None => ClassificationRule::single(RuleKind::UnencryptedSuffix, default_suffix),
        };
        let kind = rule.active().first().copied().unwrap_or(RuleKind::UnencryptedSuffix);
        let pattern = rule.get(kind);

        if kind.needs_comments() && !supports_comments {
            return Err(SopsError::UnsupportedRuleForFormat {
                rule: kind.as_str().to_string(),
                format: format.as_str().to_string(),
            });
        }

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| SopsError::InvalidRule(format!("{kind}: {e}")))
        };
        let matcher = match kind {
            RuleKind::UnencryptedSuffix | RuleKind::EncryptedSuffix => Matcher::Suffix(pattern.to_string()),
            RuleKind::UnencryptedRegex | RuleKind::EncryptedRegex => Matcher::Regex(compile(pattern)?),
            RuleKind::UnencryptedCommentRegex | RuleKind::EncryptedCommentRegex => {
                Matcher::Comment(compile(pattern)?)
            }
        };

        Ok(Self { kind, matcher, rule })
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// The rule actually applied, with the default filled in. Recorded in metadata.
    pub fn effective_rule(&self) -> &ClassificationRule {
        &self.rule
    }

    pub fn classify(&self, doc: &Document) -> SopsResult<Classification> {
        let empty = CommentIndex::default();
        let comments = doc.comments.as_ref().unwrap_or(&empty);
        let mut leaves = IndexMap::new();
        doc.root.for_each_scalar(&mut |path, _| {
            let matched = self.matches(path, comments);
            let class = if matched == self.kind.encrypts_matches() {
                LeafClass::Encrypted
            } else {
                LeafClass::Unencrypted
            };
            leaves.insert(path.clone(), class);
            Ok(())
        })?;
        Ok(Classification { leaves })
    }

    fn matches(&self, path: &Path, comments: &CommentIndex) -> bool {
        match &self.matcher {
            Matcher::Suffix(suffix) => path.keys().any(|k| k.ends_with(suffix.as_str())),
            Matcher::Regex(re) => path.keys().any(|k| re.is_match(k)) || re.is_match(&path.dotted()),
            Matcher::Comment(re) => path
                .prefixes()
                .any(|p| comments.comments_for(&p).iter().any(|c| re.is_match(c))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DocumentCodec, JsonCodec, YamlCodec};

    fn json(text: &str) -> Document {
        JsonCodec::new(4).parse(text).unwrap()
    }

    fn encrypted_paths(classifier: &PathClassifier, doc: &Document) -> Vec<String> {
        classifier
            .classify(doc)
            .unwrap()
            .iter()
            .filter(|(_, c)| *c == LeafClass::Encrypted)
            .map(|(p, _)| p.dotted())
            .collect()
    }

    #[test]
    fn default_is_unencrypted_suffix() {
        let classifier = PathClassifier::new(&ClassificationRule::default(), "_unencrypted", Format::Json, false).unwrap();
        assert_eq!(classifier.kind(), RuleKind::UnencryptedSuffix);
        assert_eq!(classifier.effective_rule().unencrypted_suffix, "_unencrypted");
        let doc = json(r#"{"a": "secret", "a_unencrypted": "plain"}"#);
        assert_eq!(encrypted_paths(&classifier, &doc), vec!["a"]);
    }

    #[test]
    fn suffix_covers_subtree() {
        let rule = ClassificationRule::single(RuleKind::UnencryptedSuffix, "_pub");
        let classifier = PathClassifier::new(&rule, "_unencrypted", Format::Json, false).unwrap();
        let doc = json(r#"{"cfg_pub": {"x": 1, "y": [2]}, "key": 3}"#);
        assert_eq!(encrypted_paths(&classifier, &doc), vec!["key"]);
    }

    #[test]
    fn encrypted_regex_inverts_polarity() {
        let rule = ClassificationRule::single(RuleKind::EncryptedRegex, "^(password|token)$");
        let classifier = PathClassifier::new(&rule, "_unencrypted", Format::Json, false).unwrap();
        let doc = json(r#"{"user": "bob", "password": "x", "nested": {"token": "t"}}"#);
        assert_eq!(encrypted_paths(&classifier, &doc), vec!["password", "nested.token"]);
    }

    #[test]
    fn regex_matches_dotted_path() {
        let rule = ClassificationRule::single(RuleKind::UnencryptedRegex, r"^servers\.\d+\.host$");
        let classifier = PathClassifier::new(&rule, "_unencrypted", Format::Json, false).unwrap();
        let doc = json(r#"{"servers": [{"host": "a", "pass": "b"}]}"#);
        assert_eq!(encrypted_paths(&classifier, &doc), vec!["servers.0.pass"]);
    }

    #[test]
    fn two_families_are_ambiguous() {
        let mut rule = ClassificationRule::single(RuleKind::UnencryptedSuffix, "_u");
        rule.encrypted_regex = "x".into();
        let err = PathClassifier::new(&rule, "_unencrypted", Format::Json, false).err().unwrap();
        assert!(matches!(err, SopsError::AmbiguousClassification(_)));
        assert!(err.to_string().contains("unencrypted_suffix, encrypted_regex"), "{err}");
    }

    #[test]
    fn ambiguity_reported_before_format_support() {
        let mut rule = ClassificationRule::single(RuleKind::EncryptedCommentRegex, "enc");
        rule.unencrypted_regex = "(".into();
        let err = PathClassifier::new(&rule, "_unencrypted", Format::Dotenv, false).err().unwrap();
        assert!(matches!(err, SopsError::AmbiguousClassification(_)));
    }

    #[test]
    fn comment_rule_needs_comment_format() {
        let rule = ClassificationRule::single(RuleKind::EncryptedCommentRegex, "sops:enc");
        let err = PathClassifier::new(&rule, "_unencrypted", Format::Json, false).err().unwrap();
        assert!(matches!(err, SopsError::UnsupportedRuleForFormat { .. }));
    }

    #[test]
    fn bad_regex_is_invalid_rule() {
        let rule = ClassificationRule::single(RuleKind::UnencryptedRegex, "(unclosed");
        let err = PathClassifier::new(&rule, "_unencrypted", Format::Json, false).err().unwrap();
        assert!(matches!(err, SopsError::InvalidRule(_)));
    }

    #[test]
    fn encrypted_comment_regex_on_yaml() {
        let doc = YamlCodec
            .parse("plain: a\n# sops:enc\nsecret: b\ngroup:\n  # sops:enc\n  inner:\n    k: c\n  other: d\n")
            .unwrap();
        let rule = ClassificationRule::single(RuleKind::EncryptedCommentRegex, "sops:enc");
        let classifier = PathClassifier::new(&rule, "_unencrypted", Format::Yaml, true).unwrap();
        assert_eq!(encrypted_paths(&classifier, &doc), vec!["secret", "group.inner.k"]);
    }

    #[test]
    fn rule_serializes_only_active_fields() {
        let rule = ClassificationRule::single(RuleKind::EncryptedRegex, "^pw$");
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value, serde_json::json!({"encrypted_regex": "^pw$"}));
    }
}
