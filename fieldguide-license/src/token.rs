//! Activation tokens: the persisted proof that this machine was activated.

use crate::error::{LicenseError, LicenseResult};
use crate::hash::HashProvider;
use crate::key::{Feature, LicenseType};
use crate::validator::ProductKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything a token asserts, minus its tamper digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Hex SHA-256 of the product key. The key itself is never stored.
    pub product_key_hash: String,
    pub license_type: LicenseType,
    /// `None` for perpetual licenses.
    pub expiration_date: Option<DateTime<Utc>>,
    pub customer_id: String,
    pub enabled_features: BTreeSet<String>,
    /// Identifier of the machine the token was issued on.
    pub machine_id: String,
    pub validated_date: DateTime<Utc>,
    pub online_validation: bool,
}

/// A sealed activation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationToken {
    #[serde(flatten)]
    claims: TokenClaims,
    /// SHA-256 over the claims, for detecting edits to the stored file.
    signature: String,
}

impl ActivationToken {
    /// Seals `claims` with a tamper digest.
    pub fn seal(claims: TokenClaims, hasher: &dyn HashProvider) -> Self {
        let signature = Self::compute_signature(&claims, hasher);
        Self { claims, signature }
    }

    /// Builds a token from a validated key for the given machine.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` did not pass validation.
    pub fn from_product_key(
        key: &ProductKey,
        machine_id: impl Into<String>,
        validated_date: DateTime<Utc>,
        hasher: &dyn HashProvider,
    ) -> LicenseResult<Self> {
        let license_type = key
            .license_type()
            .filter(|_| key.is_valid())
            .ok_or_else(|| {
                LicenseError::InvalidKeyFormat("key has not passed validation".to_string())
            })?;

        let claims = TokenClaims {
            product_key_hash: hasher.sha256_hex(key.original_key().as_bytes()),
            license_type,
            expiration_date: key.expiration_date(),
            customer_id: key.customer_id().to_string(),
            enabled_features: Feature::names_from_flags(key.feature_flags()),
            machine_id: machine_id.into(),
            validated_date,
            online_validation: false,
        };
        Ok(Self::seal(claims, hasher))
    }

    /// Digest over `keyHash|machineId|timestamp` followed by the
    /// entitlement fields.
    #[must_use]
    pub fn compute_signature(claims: &TokenClaims, hasher: &dyn HashProvider) -> String {
        let features: Vec<&str> = claims.enabled_features.iter().map(String::as_str).collect();
        let material = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            claims.product_key_hash,
            claims.machine_id,
            claims.validated_date.timestamp_micros(),
            claims.license_type.name(),
            claims
                .expiration_date
                .map_or_else(|| "perpetual".to_string(), |d| d.timestamp().to_string()),
            claims.customer_id,
            features.join(","),
            claims.online_validation,
        );
        hasher.sha256_hex(material.as_bytes())
    }

    /// Returns true if the stored digest matches the claims.
    #[must_use]
    pub fn verify_signature(&self, hasher: &dyn HashProvider) -> bool {
        Self::compute_signature(&self.claims, hasher) == self.signature
    }

    #[must_use]
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    #[must_use]
    pub fn product_key_hash(&self) -> &str {
        &self.claims.product_key_hash
    }

    #[must_use]
    pub fn license_type(&self) -> LicenseType {
        self.claims.license_type
    }

    #[must_use]
    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        self.claims.expiration_date
    }

    #[must_use]
    pub fn customer_id(&self) -> &str {
        &self.claims.customer_id
    }

    #[must_use]
    pub fn enabled_features(&self) -> &BTreeSet<String> {
        &self.claims.enabled_features
    }

    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.claims.machine_id
    }

    #[must_use]
    pub fn validated_date(&self) -> DateTime<Utc> {
        self.claims.validated_date
    }

    #[must_use]
    pub fn online_validation(&self) -> bool {
        self.claims.online_validation
    }

    /// Case-insensitive feature check. Ignores expiry.
    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        let name = name.trim();
        self.claims
            .enabled_features
            .iter()
            .any(|f| f.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn is_perpetual(&self) -> bool {
        self.claims.expiration_date.is_none()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expired once `now` reaches the expiration instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.claims.expiration_date.is_some_and(|exp| exp <= now)
    }

    /// Whole days left, or `None` for perpetual. Never negative.
    #[must_use]
    pub fn days_until_expiration(&self) -> Option<i64> {
        self.days_until_expiration_at(Utc::now())
    }

    #[must_use]
    pub fn days_until_expiration_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.claims
            .expiration_date
            .map(|exp| (exp - now).num_days().max(0))
    }
}
