//! Error types for the licensing module.

use fieldguide_crypto::CryptoError;
use std::fmt;
use thiserror::Error;

/// Licensing-specific errors.
///
/// These are faults the caller cannot interpret on the user's behalf. Key
/// validation failures are not errors in this sense; they are reported as
/// [`ValidationError`] values or activation outcomes.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// A key could not be built from the supplied parts.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// Public key or signature bytes are malformed.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The signature manifest is malformed.
    #[error("invalid signature table: {0}")]
    InvalidSignatureTable(String),

    /// The stored activation token could not be decrypted, parsed or
    /// authenticated. It has been removed.
    #[error("activation token is corrupted ({0}); re-activate with your product key")]
    CorruptedToken(String),

    /// The stored activation token belongs to another machine. It has been
    /// removed.
    #[error("activation token is bound to another machine (expected {expected}, found {found})")]
    MachineMismatch { expected: String, found: String },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Machine-scoped encryption failed while sealing.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// What went wrong while validating a product key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// Not five groups of five base-58 characters, or undecodable.
    Format,
    /// The license type byte is not a known code.
    LicenseType,
    /// CRC16 over the payload does not match (usually a typo).
    Checksum,
    /// No signature on file for the key, or it does not verify.
    Signature,
    /// The key's expiration has passed.
    Expired,
}

/// A product key validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    kind: ValidationErrorKind,
    message: String,
}

impl ValidationError {
    pub(crate) fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the failure category.
    #[must_use]
    pub fn kind(&self) -> ValidationErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}
