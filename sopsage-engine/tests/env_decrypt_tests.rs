mod support;

use pretty_assertions::assert_eq;
use serial_test::serial;
use sopsage_engine::{AGE_KEY_ENV, AGE_KEY_FILE_ENV, ClassificationRule, Engine, ErrorKind, Format};
use std::io::Write;
use support::{identity_text, keypair};

const INPUT: &str = "KEY=value\nNAME_unencrypted=demo\n";

fn clear_env() {
    // SAFETY: every test touching these variables runs under #[serial].
    unsafe {
        std::env::remove_var(AGE_KEY_ENV);
        std::env::remove_var(AGE_KEY_FILE_ENV);
    }
}

fn encrypted_for(recipient: String) -> String {
    Engine::default()
        .encrypt(INPUT, Format::Dotenv, &[recipient], &ClassificationRule::default())
        .unwrap()
}

#[test]
#[serial]
fn inline_key_from_environment() {
    clear_env();
    let (identity, recipient) = keypair();
    let encrypted = encrypted_for(recipient);
    unsafe { std::env::set_var(AGE_KEY_ENV, identity_text(&identity)) };

    let decrypted = Engine::default().decrypt_with_env(&encrypted, Format::Dotenv).unwrap();
    assert_eq!(decrypted, INPUT);
    clear_env();
}

#[test]
#[serial]
fn key_file_from_environment() {
    clear_env();
    let (identity, recipient) = keypair();
    let encrypted = encrypted_for(recipient);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# created: 2026-10-18T00:00:00Z").unwrap();
    writeln!(file, "{}", identity_text(&identity)).unwrap();
    unsafe { std::env::set_var(AGE_KEY_FILE_ENV, file.path()) };

    let decrypted = Engine::default().decrypt_with_env(&encrypted, Format::Dotenv).unwrap();
    assert_eq!(decrypted, INPUT);
    clear_env();
}

#[test]
#[serial]
fn missing_environment_is_invalid_recipient_key() {
    clear_env();
    let (_, recipient) = keypair();
    let encrypted = encrypted_for(recipient);

    let err = Engine::default().decrypt_with_env(&encrypted, Format::Dotenv).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecipientKey);
}

#[test]
#[serial]
fn plain_decrypt_ignores_environment() {
    clear_env();
    let (identity, recipient) = keypair();
    let (stranger, _) = keypair();
    let encrypted = encrypted_for(recipient);
    unsafe { std::env::set_var(AGE_KEY_ENV, identity_text(&identity)) };

    let err = Engine::default()
        .decrypt(&encrypted, Format::Dotenv, &identity_text(&stranger))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMatchingRecipient);
    clear_env();
}
