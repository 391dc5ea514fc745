mod support;

use pretty_assertions::assert_eq;
use serde_json::{Map, Value};
use sopsage_engine::{
    ClassificationRule, EncryptedLeaf, Engine, EngineConfig, ErrorKind, Format, RuleKind, decrypt, encrypt,
};
use support::{init_tracing, json, keypair, identity_text};

const SCENARIO: &str = "{\n    \"a\": \"secret\",\n    \"a_unencrypted\": \"plain\"\n}\n";

fn suffix_rule() -> ClassificationRule {
    ClassificationRule::single(RuleKind::UnencryptedSuffix, "_unencrypted")
}

fn encrypt_json(plaintext: &str, recipients: &[String]) -> String {
    Engine::default()
        .encrypt(plaintext, Format::Json, recipients, &suffix_rule())
        .unwrap()
}

fn rewrite_json(text: &str, edit: impl FnOnce(&mut Map<String, Value>)) -> String {
    let mut value = json(text);
    edit(value.as_object_mut().unwrap());
    serde_json::to_string_pretty(&value).unwrap()
}

// ── Suffix rule ──

#[test]
fn suffix_scenario_encrypts_only_the_secret() {
    init_tracing();
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);

    let doc = json(&encrypted);
    assert_eq!(doc["a_unencrypted"], "plain");
    let leaf = doc["a"].as_str().unwrap();
    assert!(EncryptedLeaf::parse(leaf).is_some(), "{leaf}");
    assert!(leaf.ends_with(",type:str]"));
    assert!(!encrypted.contains("secret\""));
    assert_eq!(doc["sops"]["unencrypted_suffix"], "_unencrypted");

    let decrypted = Engine::default()
        .decrypt(&encrypted, Format::Json, &identity_text(&identity))
        .unwrap();
    assert_eq!(decrypted, SCENARIO);
}

#[test]
fn compact_input_decrypts_to_same_values() {
    let (identity, recipient) = keypair();
    let input = r#"{"a": "secret", "a_unencrypted": "plain"}"#;
    let encrypted = encrypt_json(input, &[recipient]);
    let decrypted = Engine::default()
        .decrypt(&encrypted, Format::Json, &identity_text(&identity))
        .unwrap();
    assert_eq!(json(&decrypted), json(input));
}

#[test]
fn default_rule_matches_explicit_suffix() {
    let (identity, recipient) = keypair();
    let encrypted = Engine::default()
        .encrypt(SCENARIO, Format::Json, &[recipient], &ClassificationRule::default())
        .unwrap();
    assert_eq!(json(&encrypted)["a_unencrypted"], "plain");
    let decrypted = Engine::default()
        .decrypt(&encrypted, Format::Json, &identity_text(&identity))
        .unwrap();
    assert_eq!(decrypted, SCENARIO);
}

// ── Types and structure ──

#[test]
fn scalar_types_and_nesting_survive() {
    let (identity, recipient) = keypair();
    let input = r#"{
        "n": 42, "f": 1.5, "b": true, "z": null, "s": "x",
        "list": [1, "two", {"deep": false}],
        "empty_map": {}, "empty_list": []
    }"#;
    let encrypted = encrypt_json(input, &[recipient]);
    let doc = json(&encrypted);
    assert!(doc["n"].as_str().unwrap().ends_with("type:int]"));
    assert!(doc["f"].as_str().unwrap().ends_with("type:float]"));
    assert!(doc["b"].as_str().unwrap().ends_with("type:bool]"));
    assert!(doc["z"].as_str().unwrap().ends_with("type:null]"));
    assert_eq!(doc["empty_map"], json("{}"));
    assert_eq!(doc["empty_list"], json("[]"));

    let decrypted = Engine::default()
        .decrypt(&encrypted, Format::Json, &identity_text(&identity))
        .unwrap();
    assert_eq!(json(&decrypted), json(input));
}

#[test]
fn key_order_is_preserved() {
    let (identity, recipient) = keypair();
    let input = r#"{"zeta": 1, "alpha": 2, "mid_unencrypted": 3}"#;
    let encrypted = encrypt_json(input, &[recipient]);
    let decrypted = Engine::default()
        .decrypt(&encrypted, Format::Json, &identity_text(&identity))
        .unwrap();
    let keys: Vec<String> = json(&decrypted).as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["zeta", "alpha", "mid_unencrypted"]);
}

#[test]
fn encrypted_regex_leaves_everything_else_clear() {
    let (identity, recipient) = keypair();
    let input = r#"{"user": "bob", "password": "hunter2", "db": {"token": "t0k3n", "port": 5432}}"#;
    let rule = ClassificationRule::single(RuleKind::EncryptedRegex, "^(password|token)$");
    let encrypted = Engine::default()
        .encrypt(input, Format::Json, &[recipient], &rule)
        .unwrap();

    let doc = json(&encrypted);
    assert_eq!(doc["user"], "bob");
    assert_eq!(doc["db"]["port"], 5432);
    assert!(!encrypted.contains("hunter2"));
    assert!(!encrypted.contains("t0k3n"));
    assert_eq!(doc["sops"]["encrypted_regex"], "^(password|token)$");

    let decrypted = Engine::default()
        .decrypt(&encrypted, Format::Json, &identity_text(&identity))
        .unwrap();
    assert_eq!(json(&decrypted), json(input));
}

#[test]
fn custom_metadata_key() {
    let (identity, recipient) = keypair();
    let engine = Engine::new(EngineConfig {
        metadata_key: "_envelope".into(),
        ..EngineConfig::default()
    })
    .unwrap();
    let encrypted = engine.encrypt(SCENARIO, Format::Json, &[recipient], &suffix_rule()).unwrap();
    let doc = json(&encrypted);
    assert!(doc.get("sops").is_none());
    assert!(doc["_envelope"]["key_groups"].is_array());

    let decrypted = engine.decrypt(&encrypted, Format::Json, &identity_text(&identity)).unwrap();
    assert_eq!(decrypted, SCENARIO);
}

// ── Recipients ──

#[test]
fn either_recipient_decrypts() {
    let (first, r1) = keypair();
    let (second, r2) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[r1, r2]);
    assert_eq!(json(&encrypted)["sops"]["key_groups"][0].as_array().unwrap().len(), 2);

    let a = Engine::default().decrypt(&encrypted, Format::Json, &identity_text(&first)).unwrap();
    let b = Engine::default().decrypt(&encrypted, Format::Json, &identity_text(&second)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, SCENARIO);
}

#[test]
fn multiple_key_groups() {
    let (first, r1) = keypair();
    let (second, r2) = keypair();
    let (third, r3) = keypair();
    let groups = vec![vec![r1], vec![r2, r3]];
    let encrypted = Engine::default()
        .encrypt_with_key_groups::<String, Vec<String>>(SCENARIO, Format::Json, &groups, &suffix_rule())
        .unwrap();
    assert_eq!(json(&encrypted)["sops"]["key_groups"].as_array().unwrap().len(), 2);

    for identity in [first, second, third] {
        let decrypted = Engine::default()
            .decrypt(&encrypted, Format::Json, &identity_text(&identity))
            .unwrap();
        assert_eq!(decrypted, SCENARIO);
    }
}

#[test]
fn wrong_private_key_is_no_matching_recipient() {
    let (_, recipient) = keypair();
    let (stranger, _) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    let err = Engine::default()
        .decrypt(&encrypted, Format::Json, &identity_text(&stranger))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMatchingRecipient);
}

#[test]
fn identity_file_text_is_accepted() {
    let (stranger, _) = keypair();
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    let key_file = format!(
        "# created: 2026-10-18T00:00:00Z\n{}\n\n# second key\n{}\n",
        identity_text(&stranger),
        identity_text(&identity)
    );
    let decrypted = Engine::default().decrypt(&encrypted, Format::Json, &key_file).unwrap();
    assert_eq!(decrypted, SCENARIO);
}

#[test]
fn malformed_private_key_is_invalid_recipient_key() {
    let (_, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    let err = Engine::default()
        .decrypt(&encrypted, Format::Json, "AGE-SECRET-KEY-1NOTAKEY")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecipientKey);
    assert!(!err.to_string().contains("AGE-SECRET-KEY-1NOTAKEY"));
}

#[test]
fn bad_recipient_aborts_encryption_with_index() {
    let (_, good) = keypair();
    let err = Engine::default()
        .encrypt(SCENARIO, Format::Json, &[good, "age1bogus".to_string()], &suffix_rule())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecipientKey);
    assert!(err.to_string().contains("recipient #1"), "{err}");
}

#[test]
fn empty_recipient_list_rejected() {
    let err = Engine::default()
        .encrypt(SCENARIO, Format::Json, &Vec::<String>::new(), &suffix_rule())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecipientKey);
}

// ── Tamper detection ──

#[test]
fn flipped_ciphertext_bit_is_authentication_failure() {
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    let tampered = rewrite_json(&encrypted, |doc| {
        let mut leaf = EncryptedLeaf::parse(doc["a"].as_str().unwrap()).unwrap();
        leaf.sealed.ciphertext[0] ^= 0x01;
        doc.insert("a".into(), Value::String(leaf.to_string()));
    });
    let err = Engine::default()
        .decrypt(&tampered, Format::Json, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn edited_cleartext_value_is_authentication_failure() {
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    let tampered = encrypted.replace("\"plain\"", "\"plaim\"");
    assert_ne!(tampered, encrypted);
    let err = Engine::default()
        .decrypt(&tampered, Format::Json, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn reordered_cleartext_fields_are_authentication_failure() {
    let (identity, recipient) = keypair();
    let input = r#"{"x_unencrypted": 1, "y_unencrypted": 2, "s": "v"}"#;
    let encrypted = encrypt_json(input, &[recipient]);
    let tampered = rewrite_json(&encrypted, |doc| {
        let x = doc.shift_remove("x_unencrypted").unwrap();
        doc.insert("x_unencrypted".into(), x);
    });
    let err = Engine::default()
        .decrypt(&tampered, Format::Json, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn swapped_encrypted_leaves_are_authentication_failure() {
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(r#"{"one": "1", "two": "2"}"#, &[recipient]);
    let tampered = rewrite_json(&encrypted, |doc| {
        let one = doc["one"].clone();
        let two = doc["two"].clone();
        doc.insert("one".into(), two);
        doc.insert("two".into(), one);
    });
    let err = Engine::default()
        .decrypt(&tampered, Format::Json, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn malformed_leaf_text_is_authentication_failure() {
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    let tampered = rewrite_json(&encrypted, |doc| {
        doc.insert("a".into(), Value::String("ENC[garbage]".into()));
    });
    let err = Engine::default()
        .decrypt(&tampered, Format::Json, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn edited_mac_is_authentication_failure() {
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    let tampered = rewrite_json(&encrypted, |doc| {
        doc["sops"]["lastmodified"] = Value::String("1999-01-01T00:00:00Z".into());
    });
    let err = Engine::default()
        .decrypt(&tampered, Format::Json, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

// ── Rule validation ──

#[test]
fn ambiguous_rule_rejected_before_recipients_are_read() {
    let mut rule = suffix_rule();
    rule.unencrypted_regex = "^public".into();
    let err = Engine::default()
        .encrypt(SCENARIO, Format::Json, &["not-a-recipient"], &rule)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousClassification);
}

#[test]
fn ambiguous_rule_rejected_before_parsing() {
    let mut rule = ClassificationRule::single(RuleKind::EncryptedSuffix, "_secret");
    rule.encrypted_comment_regex = "enc".into();
    let err = Engine::default()
        .encrypt("{ not json", Format::Json, &["not-a-recipient"], &rule)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousClassification);
}

#[test]
fn comment_rule_on_json_is_unsupported() {
    let (_, recipient) = keypair();
    let rule = ClassificationRule::single(RuleKind::EncryptedCommentRegex, "sops:enc");
    let err = Engine::default()
        .encrypt(SCENARIO, Format::Json, &[recipient], &rule)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedRuleForFormat);
}

#[test]
fn invalid_regex_rule() {
    let (_, recipient) = keypair();
    let rule = ClassificationRule::single(RuleKind::UnencryptedRegex, "[unclosed");
    let err = Engine::default()
        .encrypt(SCENARIO, Format::Json, &[recipient], &rule)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRule);
}

// ── Document guards ──

#[test]
fn encrypting_twice_is_rejected() {
    let (_, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, std::slice::from_ref(&recipient));
    let err = Engine::default()
        .encrypt(&encrypted, Format::Json, &[recipient], &suffix_rule())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}

#[test]
fn cleartext_lookalike_leaf_is_rejected() {
    let (_, recipient) = keypair();
    let input = r#"{"note_unencrypted": "ENC[CHACHA20_POLY1305,data:,iv:,tag:,type:str]"}"#;
    let err = Engine::default()
        .encrypt(input, Format::Json, &[recipient], &suffix_rule())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}

#[test]
fn plaintext_document_cannot_be_decrypted() {
    let (identity, _) = keypair();
    let err = Engine::default()
        .decrypt(SCENARIO, Format::Json, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}

#[test]
fn format_mismatch_is_rejected() {
    let (identity, recipient) = keypair();
    let encrypted = encrypt_json(SCENARIO, &[recipient]);
    // JSON is also valid YAML, so only the recorded format catches this.
    let err = Engine::default()
        .decrypt(&encrypted, Format::Yaml, &identity_text(&identity))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
    assert!(err.to_string().contains("encrypted as json"), "{err}");
}

#[test]
fn malformed_json_input() {
    let (_, recipient) = keypair();
    let err = Engine::default()
        .encrypt("{\"a\": ", Format::Json, &[recipient], &suffix_rule())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
}

#[test]
fn duplicate_json_keys_are_rejected() {
    let (_, recipient) = keypair();
    let err = Engine::default()
        .encrypt(r#"{"a": "first", "a": "second"}"#, Format::Json, &[recipient], &suffix_rule())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDocument);
    assert!(err.to_string().contains("duplicate key"), "{err}");
}

// ── Free functions ──

#[test]
fn format_tag_entry_points() {
    let (identity, recipient) = keypair();
    let encrypted = encrypt(SCENARIO, "json", &[recipient], &suffix_rule()).unwrap();
    let decrypted = decrypt(&encrypted, "JSON", &identity_text(&identity)).unwrap();
    assert_eq!(decrypted, SCENARIO);
}

#[test]
fn unknown_format_tag() {
    let (identity, recipient) = keypair();
    let err = encrypt(SCENARIO, "toml", &[recipient], &suffix_rule()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    let err = decrypt(SCENARIO, "xml", &identity_text(&identity)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
}

// ── Concurrency ──

#[test]
fn concurrent_calls_with_different_keys() {
    init_tracing();
    let engine = Engine::default();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = &engine;
                scope.spawn(move || {
                    let (identity, recipient) = keypair();
                    let input = format!(r#"{{"worker": "{i}", "token": "secret-{i}"}}"#);
                    let encrypted = engine
                        .encrypt(&input, Format::Json, &[recipient], &ClassificationRule::default())
                        .unwrap();
                    let decrypted = engine
                        .decrypt(&encrypted, Format::Json, &identity_text(&identity))
                        .unwrap();
                    (input, decrypted)
                })
            })
            .collect();
        for handle in handles {
            let (input, decrypted) = handle.join().unwrap();
            assert_eq!(json(&decrypted), json(&input));
        }
    });
}

// ── Properties ──

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn roundtrip_and_selective_visibility(
            entries in proptest::collection::btree_map("[a-z]{1,8}", "[A-Za-z0-9]{1,16}", 1..6)
        ) {
            let (identity, recipient) = keypair();
            let mut doc = Map::new();
            for (key, value) in &entries {
                doc.insert(key.clone(), Value::String(format!("SECRET-{value}")));
                doc.insert(format!("{key}_unencrypted"), Value::String(format!("PLAIN-{value}")));
            }
            let input = serde_json::to_string(&Value::Object(doc)).unwrap();

            let encrypted = encrypt_json(&input, &[recipient]);
            prop_assert!(!encrypted.contains("SECRET-"));
            let out = json(&encrypted);
            for (key, value) in &entries {
                let plain = format!("PLAIN-{value}");
                prop_assert_eq!(out[format!("{key}_unencrypted")].as_str(), Some(plain.as_str()));
            }

            let decrypted = Engine::default()
                .decrypt(&encrypted, Format::Json, &identity_text(&identity))
                .unwrap();
            prop_assert_eq!(json(&decrypted), json(&input));
        }
    }
}
