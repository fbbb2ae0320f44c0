//! Product key validation.
//!
//! Validation runs in a fixed order and stops at the first failure:
//!
//! 1. format (five groups of five base-58 symbols)
//! 2. base-58 decode into a 12-byte payload
//! 3. license type code is known
//! 4. CRC16 over bytes 0..10 matches bytes 10..12
//! 5. the reference resolves to an issued signature, and it verifies
//! 6. the expiration, if any, is strictly after "now"

use crate::codec;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::hash::HashProvider;
use crate::key::{
    checksum_from_bytes, customer_id_from_bytes, expiration_from_bytes, Feature, LicenseType,
    CHECKSUMMED_LEN, PAYLOAD_LEN,
};
use crate::signature::{signature_reference, SignatureRegistry, SignatureVerifier};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The outcome of validating a key string.
///
/// Fields are filled in as validation progresses, so a key that fails late
/// (say, on expiry) still exposes its decoded payload.
#[derive(Clone)]
pub struct ProductKey {
    original_key: String,
    payload: Option<[u8; PAYLOAD_LEN]>,
    signature: Option<Vec<u8>>,
    license_type: Option<LicenseType>,
    expiration_date: Option<DateTime<Utc>>,
    customer_id: u32,
    feature_flags: u8,
    validation_error: Option<ValidationError>,
}

impl ProductKey {
    fn unvalidated(original_key: &str) -> Self {
        Self {
            original_key: original_key.trim().to_string(),
            payload: None,
            signature: None,
            license_type: None,
            expiration_date: None,
            customer_id: 0,
            feature_flags: 0,
            validation_error: None,
        }
    }

    /// The key as entered, trimmed. Only ever used for hashing.
    #[must_use]
    pub fn original_key(&self) -> &str {
        &self.original_key
    }

    /// The decoded payload, once decoding has succeeded.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8; PAYLOAD_LEN]> {
        self.payload.as_ref()
    }

    /// The resolved issuer signature, once resolution has succeeded.
    #[must_use]
    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    #[must_use]
    pub fn license_type(&self) -> Option<LicenseType> {
        self.license_type
    }

    /// Expiration, or `None` for a perpetual (or undecoded) key.
    #[must_use]
    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        self.expiration_date
    }

    /// True if decoding succeeded and the key never expires.
    #[must_use]
    pub fn is_perpetual(&self) -> bool {
        self.payload.is_some() && self.expiration_date.is_none()
    }

    #[must_use]
    pub fn customer_id(&self) -> u32 {
        self.customer_id
    }

    #[must_use]
    pub fn feature_flags(&self) -> u8 {
        self.feature_flags
    }

    /// Features unlocked by the flag byte.
    #[must_use]
    pub fn features(&self) -> Vec<Feature> {
        Feature::from_flags(self.feature_flags)
    }

    /// True only if every validation step passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation_error.is_none()
    }

    #[must_use]
    pub fn validation_error(&self) -> Option<&ValidationError> {
        self.validation_error.as_ref()
    }

    /// Converts into a tagged result.
    pub fn into_result(self) -> Result<ProductKey, ValidationError> {
        match self.validation_error.clone() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

impl fmt::Debug for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductKey")
            .field("original_key", &"[REDACTED]")
            .field("license_type", &self.license_type)
            .field("expiration_date", &self.expiration_date)
            .field("customer_id", &self.customer_id)
            .field("feature_flags", &self.feature_flags)
            .field("validation_error", &self.validation_error)
            .finish()
    }
}

/// Turns raw key strings into validated [`ProductKey`]s.
///
/// Holds no state besides its collaborators: the same input and instant
/// always produce the same result.
#[derive(Clone)]
pub struct ProductKeyValidator {
    verifier: Arc<dyn SignatureVerifier>,
    registry: Arc<dyn SignatureRegistry>,
    hasher: Arc<dyn HashProvider>,
}

impl ProductKeyValidator {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        registry: Arc<dyn SignatureRegistry>,
        hasher: Arc<dyn HashProvider>,
    ) -> Self {
        Self {
            verifier,
            registry,
            hasher,
        }
    }

    /// Structural check only; does not decode.
    #[must_use]
    pub fn is_valid_format(&self, key: &str) -> bool {
        codec::is_valid_format(key)
    }

    /// Validates `key` against the current time.
    #[must_use]
    pub fn parse_and_validate(&self, key: &str) -> ProductKey {
        self.parse_and_validate_at(key, Utc::now())
    }

    /// Validates `key` as of `now`. Never panics on malformed input.
    #[must_use]
    pub fn parse_and_validate_at(&self, key: &str, now: DateTime<Utc>) -> ProductKey {
        let mut product_key = ProductKey::unvalidated(key);
        if let Err(err) = self.run(key, now, &mut product_key) {
            debug!(kind = ?err.kind(), "product key rejected");
            product_key.validation_error = Some(err);
        }
        product_key
    }

    /// Tagged-result form of [`ProductKeyValidator::parse_and_validate`].
    pub fn validate(&self, key: &str) -> Result<ProductKey, ValidationError> {
        self.parse_and_validate(key).into_result()
    }

    /// Tagged-result form of [`ProductKeyValidator::parse_and_validate_at`].
    pub fn validate_at(&self, key: &str, now: DateTime<Utc>) -> Result<ProductKey, ValidationError> {
        self.parse_and_validate_at(key, now).into_result()
    }

    fn run(
        &self,
        key: &str,
        now: DateTime<Utc>,
        out: &mut ProductKey,
    ) -> Result<(), ValidationError> {
        let decoded = codec::decode(key)?;
        let payload = decoded.payload;
        out.payload = Some(payload);

        let license_type = LicenseType::from_code(payload[0]).ok_or_else(|| {
            ValidationError::new(
                ValidationErrorKind::LicenseType,
                format!("unknown license type code 0x{:02x}", payload[0]),
            )
        })?;
        out.license_type = Some(license_type);
        out.expiration_date = expiration_from_bytes(&payload);
        out.customer_id = customer_id_from_bytes(&payload);
        out.feature_flags = payload[9];

        if !self
            .hasher
            .verify_crc16(&payload[..CHECKSUMMED_LEN], checksum_from_bytes(&payload))
        {
            return Err(ValidationError::new(
                ValidationErrorKind::Checksum,
                "invalid checksum: the key was probably mistyped",
            ));
        }

        let signature = self.registry.resolve(&decoded.reference).ok_or_else(|| {
            ValidationError::new(
                ValidationErrorKind::Signature,
                "invalid signature: no issued signature matches this key",
            )
        })?;
        if signature_reference(self.hasher.as_ref(), &signature) != decoded.reference {
            return Err(ValidationError::new(
                ValidationErrorKind::Signature,
                "invalid signature: signature table entry does not match its reference",
            ));
        }
        let verified = self.verifier.verify(&payload, &signature);
        out.signature = Some(signature);
        if !verified {
            return Err(ValidationError::new(
                ValidationErrorKind::Signature,
                "invalid signature: signature verification failed",
            ));
        }

        if let Some(expires_at) = out.expiration_date {
            // A key expiring exactly now is already expired.
            if expires_at <= now {
                return Err(ValidationError::new(
                    ValidationErrorKind::Expired,
                    format!("license expired on {}", expires_at.format("%Y-%m-%d")),
                ));
            }
        }

        Ok(())
    }
}
