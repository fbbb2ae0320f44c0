//! Offline product-key activation and licensing for FieldGuide.
//!
//! This crate handles:
//! - Product key decoding (base-58, CRC16) and Ed25519 signature checks
//! - Single activation per machine, with no network access
//! - Machine-bound, encrypted activation tokens
//! - Feature and tier queries for the rest of the app
//!
//! # Design Principles
//!
//! - **Offline-only**: nothing here talks to a server
//! - **Fail closed**: a token that is corrupted, edited, or copied from
//!   another machine is an error, never "not activated"
//! - **No plaintext keys at rest**: tokens store a SHA-256 of the key
//!
//! # Product Key Format
//!
//! `XXXXX-XXXXX-XXXXX-XXXXX-XXXXX` in base-58. The first 17 symbols carry a
//! 12-byte payload (tier, expiration, customer, feature flags, CRC16); the
//! last 8 reference the issued signature in the embedded signature table.

mod activation;
mod codec;
mod config;
mod device;
mod error;
mod hash;
mod issue;
mod key;
mod manager;
mod signature;
mod store;
mod token;
mod validator;

pub use activation::{ActivationErrorCode, ActivationFailure, ActivationOutcome, ActivationService};
pub use codec::{decode as decode_key, encode as encode_key, is_valid_format, DecodedKey, ALPHABET};
pub use config::{LicenseConfig, DATA_DIR_ENV, TOKEN_CONTEXT};
pub use device::{DeviceFingerprint, DeviceIdentity, StaticDeviceIdentity, SystemDeviceIdentity};
pub use error::{LicenseError, LicenseResult, ValidationError, ValidationErrorKind};
pub use hash::{crc16, HashProvider, StandardHasher};
pub use issue::{IssuedKey, KeyIssuer};
pub use key::{Feature, KeyPayload, LicenseType, PAYLOAD_LEN, PERPETUAL_EXPIRATION};
pub use manager::{LicenseInfo, LicenseManager};
pub use signature::{
    signature_reference, Ed25519Verifier, SignatureRegistry, SignatureTable, SignatureVerifier,
};
pub use store::TokenManager;
pub use token::{ActivationToken, TokenClaims};
pub use validator::{ProductKey, ProductKeyValidator};

use std::sync::Arc;

/// The licensing services, wired together over shared collaborators.
pub struct Licensing {
    pub activation: ActivationService,
    pub manager: LicenseManager,
    pub tokens: Arc<TokenManager>,
}

impl Licensing {
    /// Wires production collaborators: embedded public key and signature
    /// table, this machine's fingerprint, and the configured token store.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded key material is malformed.
    pub fn from_config(config: &LicenseConfig) -> LicenseResult<Self> {
        let verifier = Arc::new(Ed25519Verifier::embedded()?);
        let registry = Arc::new(SignatureTable::embedded()?);
        Ok(Self::with_collaborators(
            config,
            verifier,
            registry,
            Arc::new(SystemDeviceIdentity),
        ))
    }

    /// Wires the services with caller-supplied verification and identity.
    pub fn with_collaborators(
        config: &LicenseConfig,
        verifier: Arc<dyn SignatureVerifier>,
        registry: Arc<dyn SignatureRegistry>,
        device: Arc<dyn DeviceIdentity>,
    ) -> Self {
        let hasher: Arc<dyn HashProvider> = Arc::new(StandardHasher);
        let tokens = Arc::new(TokenManager::from_config(config, device.clone(), hasher.clone()));
        let validator = ProductKeyValidator::new(verifier, registry, hasher.clone());
        Self {
            activation: ActivationService::new(validator, tokens.clone(), device, hasher),
            manager: LicenseManager::new(tokens.clone()),
            tokens,
        }
    }
}
