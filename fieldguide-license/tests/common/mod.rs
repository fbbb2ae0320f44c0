//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use fieldguide_crypto::PassthroughEncryptor;
use fieldguide_license::{
    ActivationService, Ed25519Verifier, Feature, HashProvider, IssuedKey, KeyIssuer, KeyPayload,
    LicenseManager, LicenseType, ProductKeyValidator, SignatureTable, StandardHasher,
    StaticDeviceIdentity, TokenManager,
};
use std::path::Path;
use std::sync::Arc;

/// Deterministic Ed25519 seed used by every test issuer.
pub const TEST_SEED: [u8; 32] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32,
];

pub const MACHINE_A: &str = "machine-a";
pub const MACHINE_B: &str = "machine-b";

pub fn issuer() -> KeyIssuer {
    KeyIssuer::from_seed(&TEST_SEED)
}

pub fn payload(
    license_type: LicenseType,
    expires_at: Option<DateTime<Utc>>,
    customer_id: u32,
    features: &[Feature],
) -> KeyPayload {
    KeyPayload {
        license_type,
        expires_at,
        customer_id,
        feature_flags: Feature::to_flags(features),
    }
}

/// Issues a key and records its signature in `table`.
pub fn issue_into(table: &mut SignatureTable, payload: &KeyPayload) -> IssuedKey {
    let issued = issuer().issue(payload).unwrap();
    assert!(table.insert(issued.reference.clone(), issued.signature.clone()));
    issued
}

/// Whole-second instant `days` from now.
pub fn days_from_now(days: i64) -> DateTime<Utc> {
    let at = Utc::now() + Duration::days(days);
    DateTime::from_timestamp(at.timestamp(), 0).unwrap()
}

pub fn validator(table: SignatureTable) -> ProductKeyValidator {
    let verifier = Ed25519Verifier::from_bytes(&issuer().public_key()).unwrap();
    ProductKeyValidator::new(Arc::new(verifier), Arc::new(table), Arc::new(StandardHasher))
}

/// Token manager storing plaintext JSON, so tests can read and edit it.
pub fn plain_tokens(path: &Path, machine: &str) -> Arc<TokenManager> {
    Arc::new(TokenManager::new(
        path,
        Arc::new(PassthroughEncryptor),
        Arc::new(StaticDeviceIdentity(machine.to_string())),
        Arc::new(StandardHasher),
    ))
}

/// Activation service and license manager over a shared token store.
pub struct Harness {
    pub service: ActivationService,
    pub manager: LicenseManager,
    pub tokens: Arc<TokenManager>,
}

pub fn harness(table: SignatureTable, tokens: Arc<TokenManager>, machine: &str) -> Harness {
    let hasher: Arc<dyn HashProvider> = Arc::new(StandardHasher);
    let service = ActivationService::new(
        validator(table),
        tokens.clone(),
        Arc::new(StaticDeviceIdentity(machine.to_string())),
        hasher,
    );
    Harness {
        service,
        manager: LicenseManager::new(tokens.clone()),
        tokens,
    }
}
