use fieldguide_license::{LicenseConfig, Licensing, StaticDeviceIdentity, SignatureTable, Ed25519Verifier};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn paths_are_rooted_at_data_dir() {
    let config = LicenseConfig::with_data_dir("/var/lib/fieldguide");
    assert_eq!(
        config.token_path(),
        std::path::Path::new("/var/lib/fieldguide/activation.token")
    );
    assert_eq!(
        config.secret_path(),
        std::path::Path::new("/var/lib/fieldguide/machine.secret")
    );
}

#[test]
fn config_deserializes_with_defaults() {
    let config: LicenseConfig =
        serde_json::from_str(r#"{"data_dir":"/tmp/fg","token_file":"custom.token"}"#).unwrap();
    assert_eq!(config.token_path(), std::path::Path::new("/tmp/fg/custom.token"));
    assert_eq!(config.secret_file, "machine.secret");
    assert_eq!(config.keychain_service, "com.fieldguide.license");
}

#[test]
fn production_wiring_starts_unactivated() {
    let dir = TempDir::new().unwrap();
    let licensing = Licensing::from_config(&LicenseConfig::with_data_dir(dir.path())).unwrap();
    assert!(!licensing.activation.is_activated());
    assert!(!licensing.manager.license_info().unwrap().is_activated);
}

#[test]
fn custom_wiring_shares_one_token_store() {
    let dir = TempDir::new().unwrap();
    let licensing = Licensing::with_collaborators(
        &LicenseConfig::with_data_dir(dir.path()),
        Arc::new(Ed25519Verifier::embedded().unwrap()),
        Arc::new(SignatureTable::new()),
        Arc::new(StaticDeviceIdentity("m".into())),
    );
    assert_eq!(licensing.tokens.path(), dir.path().join("activation.token"));
}
