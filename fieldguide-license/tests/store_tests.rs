mod common;

use chrono::{DateTime, Duration, Utc};
use common::{plain_tokens, MACHINE_A, MACHINE_B};
use fieldguide_license::{
    ActivationToken, HashProvider, LicenseConfig, LicenseError, LicenseType, StandardHasher,
    StaticDeviceIdentity, TokenClaims, TokenManager,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn token(machine: &str, expiration_date: Option<DateTime<Utc>>) -> ActivationToken {
    let claims = TokenClaims {
        product_key_hash: StandardHasher.sha256_hex(b"13Bxs-3zgxa-UJKEP-My35w-UZw8u"),
        license_type: LicenseType::Tech,
        expiration_date,
        customer_id: "1234".to_string(),
        enabled_features: ["Editor".to_string()].into_iter().collect(),
        machine_id: machine.to_string(),
        validated_date: Utc::now(),
        online_validation: false,
    };
    ActivationToken::seal(claims, &StandardHasher)
}

fn encrypted_tokens(dir: &TempDir, machine: &str) -> TokenManager {
    TokenManager::from_config(
        &LicenseConfig::with_data_dir(dir.path()),
        Arc::new(StaticDeviceIdentity(machine.to_string())),
        Arc::new(StandardHasher),
    )
}

// ── Round trip ───────────────────────────────────────────────────

#[test]
fn missing_file_is_not_activated() {
    let dir = TempDir::new().unwrap();
    let tokens = plain_tokens(&dir.path().join("activation.token"), MACHINE_A);
    assert_eq!(tokens.load().unwrap(), None);
    assert!(!tokens.is_activated());
}

#[test]
fn save_then_load() {
    let dir = TempDir::new().unwrap();
    let tokens = plain_tokens(&dir.path().join("activation.token"), MACHINE_A);
    let saved = token(MACHINE_A, None);

    tokens.save(&saved).unwrap();
    assert_eq!(tokens.load().unwrap(), Some(saved));
    assert!(tokens.is_activated());
}

#[test]
fn save_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("profile").join("activation.token");
    let tokens = plain_tokens(&path, MACHINE_A);
    tokens.save(&token(MACHINE_A, None)).unwrap();
    assert!(path.exists());
}

#[test]
fn save_replaces_previous_token() {
    let dir = TempDir::new().unwrap();
    let tokens = plain_tokens(&dir.path().join("activation.token"), MACHINE_A);
    tokens.save(&token(MACHINE_A, None)).unwrap();

    let newer = token(MACHINE_A, Some(Utc::now() + Duration::days(5)));
    tokens.save(&newer).unwrap();
    assert_eq!(tokens.load().unwrap(), Some(newer));
}

#[test]
fn delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let tokens = plain_tokens(&dir.path().join("activation.token"), MACHINE_A);
    tokens.save(&token(MACHINE_A, None)).unwrap();

    tokens.delete().unwrap();
    tokens.delete().unwrap();
    assert!(!tokens.path().exists());
    assert_eq!(tokens.load().unwrap(), None);
}

// ── Fail closed ──────────────────────────────────────────────────

#[test]
fn token_from_another_machine_is_rejected_and_removed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("activation.token");
    plain_tokens(&path, MACHINE_A)
        .save(&token(MACHINE_A, None))
        .unwrap();

    let other = plain_tokens(&path, MACHINE_B);
    match other.load() {
        Err(LicenseError::MachineMismatch { expected, found }) => {
            assert_eq!(expected, MACHINE_B);
            assert_eq!(found, MACHINE_A);
        }
        other => panic!("expected MachineMismatch, got {other:?}"),
    }
    assert!(!path.exists());
    assert_eq!(other.load().unwrap(), None);
}

#[test]
fn garbage_file_is_corrupted_and_removed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("activation.token");
    std::fs::write(&path, "not json at all").unwrap();

    let tokens = plain_tokens(&path, MACHINE_A);
    assert!(matches!(tokens.load(), Err(LicenseError::CorruptedToken(_))));
    assert!(!path.exists());
}

#[test]
fn edited_claims_fail_the_digest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("activation.token");
    let tokens = plain_tokens(&path, MACHINE_A);
    tokens.save(&token(MACHINE_A, None)).unwrap();

    let edited = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"Tech\"", "\"Admin\"");
    std::fs::write(&path, edited).unwrap();

    match tokens.load() {
        Err(LicenseError::CorruptedToken(reason)) => assert!(reason.contains("digest")),
        other => panic!("expected CorruptedToken, got {other:?}"),
    }
    assert!(!path.exists());
}

#[test]
fn is_activated_swallows_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("activation.token");
    std::fs::write(&path, "{}").unwrap();
    assert!(!plain_tokens(&path, MACHINE_A).is_activated());
}

#[test]
fn expired_token_loads_as_none() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("activation.token");
    let tokens = plain_tokens(&path, MACHINE_A);
    let exp = Utc::now() + Duration::days(2);
    tokens.save(&token(MACHINE_A, Some(exp))).unwrap();

    assert!(tokens.load_at(exp - Duration::seconds(1)).unwrap().is_some());
    assert_eq!(tokens.load_at(exp).unwrap(), None);
    // expiry alone does not remove the file
    assert!(path.exists());
}

// ── Encryption at rest ───────────────────────────────────────────

#[test]
fn encrypted_store_roundtrip() {
    let dir = TempDir::new().unwrap();
    let tokens = encrypted_tokens(&dir, MACHINE_A);
    let saved = token(MACHINE_A, None);
    tokens.save(&saved).unwrap();

    let raw = std::fs::read_to_string(tokens.path()).unwrap();
    assert!(!raw.contains(saved.product_key_hash()));
    assert!(!raw.contains(MACHINE_A));

    // a second manager over the same profile reads it back
    assert_eq!(encrypted_tokens(&dir, MACHINE_A).load().unwrap(), Some(saved));
}

#[test]
fn lost_machine_secret_makes_token_corrupted() {
    let dir = TempDir::new().unwrap();
    let config = LicenseConfig::with_data_dir(dir.path());
    let tokens = encrypted_tokens(&dir, MACHINE_A);
    tokens.save(&token(MACHINE_A, None)).unwrap();

    std::fs::remove_file(config.secret_path()).unwrap();
    assert!(matches!(tokens.load(), Err(LicenseError::CorruptedToken(_))));
    assert!(!config.token_path().exists());
}

#[test]
fn token_copied_into_another_profile_is_corrupted() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    encrypted_tokens(&a, MACHINE_A)
        .save(&token(MACHINE_A, None))
        .unwrap();
    // give profile b its own machine secret
    let tokens_b = encrypted_tokens(&b, MACHINE_A);
    tokens_b.save(&token(MACHINE_A, None)).unwrap();

    let config_a = LicenseConfig::with_data_dir(a.path());
    let config_b = LicenseConfig::with_data_dir(b.path());
    std::fs::copy(config_a.token_path(), config_b.token_path()).unwrap();

    assert!(matches!(tokens_b.load(), Err(LicenseError::CorruptedToken(_))));
}

#[test]
fn unreadable_machine_secret_keeps_the_token() {
    let dir = TempDir::new().unwrap();
    let config = LicenseConfig::with_data_dir(dir.path());
    let tokens = encrypted_tokens(&dir, MACHINE_A);
    let saved = token(MACHINE_A, None);
    tokens.save(&saved).unwrap();

    // a directory where the secret file should be: reads fail with an I/O error
    let secret = std::fs::read(config.secret_path()).unwrap();
    std::fs::remove_file(config.secret_path()).unwrap();
    std::fs::create_dir(config.secret_path()).unwrap();

    assert!(matches!(tokens.load(), Err(LicenseError::Crypto(_))));
    assert!(config.token_path().exists());

    std::fs::remove_dir(config.secret_path()).unwrap();
    std::fs::write(config.secret_path(), secret).unwrap();
    assert_eq!(tokens.load().unwrap(), Some(saved));
}
