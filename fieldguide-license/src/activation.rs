//! License activation.
//!
//! Activation is fully offline: the key is validated locally, a token is
//! built and bound to this machine, and the token is stored encrypted.
//! A machine holds at most one activation at a time; activating again
//! requires deactivating first.

use crate::device::DeviceIdentity;
use crate::error::{LicenseResult, ValidationError, ValidationErrorKind};
use crate::hash::HashProvider;
use crate::manager::LicenseInfo;
use crate::store::{short_hash, TokenManager};
use crate::token::ActivationToken;
use crate::validator::ProductKeyValidator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Machine-checkable reason an activation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationErrorCode {
    InvalidFormat,
    InvalidChecksum,
    InvalidSignature,
    Expired,
    AlreadyActivated,
    NetworkError,
    Unknown,
}

impl From<ValidationErrorKind> for ActivationErrorCode {
    fn from(kind: ValidationErrorKind) -> Self {
        match kind {
            ValidationErrorKind::Format => Self::InvalidFormat,
            ValidationErrorKind::Checksum => Self::InvalidChecksum,
            ValidationErrorKind::Signature => Self::InvalidSignature,
            ValidationErrorKind::Expired => Self::Expired,
            ValidationErrorKind::LicenseType => Self::Unknown,
        }
    }
}

/// A refused activation: a code plus a message fit for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFailure {
    pub code: ActivationErrorCode,
    pub message: String,
}

impl ActivationFailure {
    fn new(code: ActivationErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ActivationFailure {
    fn from(err: ValidationError) -> Self {
        Self::new(err.kind().into(), err.message())
    }
}

impl fmt::Display for ActivationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Result of an activation attempt that did not hit a storage fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The key was accepted; the stored token is returned.
    Activated(ActivationToken),
    /// The key was refused.
    Rejected(ActivationFailure),
}

impl ActivationOutcome {
    fn rejected(code: ActivationErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected(ActivationFailure::new(code, message))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Activated(_))
    }

    #[must_use]
    pub fn token(&self) -> Option<&ActivationToken> {
        match self {
            Self::Activated(token) => Some(token),
            Self::Rejected(_) => None,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> Option<ActivationErrorCode> {
        match self {
            Self::Activated(_) => None,
            Self::Rejected(failure) => Some(failure.code),
        }
    }

    /// A human-readable summary of the outcome.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Activated(token) => {
                format!("{} license activated", token.license_type().name())
            }
            Self::Rejected(failure) => failure.message.clone(),
        }
    }
}

/// Orchestrates activation, deactivation and status queries.
pub struct ActivationService {
    validator: ProductKeyValidator,
    tokens: Arc<TokenManager>,
    device: Arc<dyn DeviceIdentity>,
    hasher: Arc<dyn HashProvider>,
}

impl ActivationService {
    pub fn new(
        validator: ProductKeyValidator,
        tokens: Arc<TokenManager>,
        device: Arc<dyn DeviceIdentity>,
        hasher: Arc<dyn HashProvider>,
    ) -> Self {
        Self {
            validator,
            tokens,
            device,
            hasher,
        }
    }

    /// Activates this machine with `key`.
    ///
    /// Validation failures come back as [`ActivationOutcome::Rejected`].
    ///
    /// # Errors
    ///
    /// Storage faults from the token manager (corrupted or foreign token,
    /// unreadable or unwritable file) are propagated.
    pub fn activate(&self, key: &str, force_online: bool) -> LicenseResult<ActivationOutcome> {
        self.activate_at(key, force_online, Utc::now())
    }

    /// [`ActivationService::activate`] with an explicit "now".
    pub fn activate_at(
        &self,
        key: &str,
        force_online: bool,
        now: DateTime<Utc>,
    ) -> LicenseResult<ActivationOutcome> {
        if key.trim().is_empty() {
            return Ok(ActivationOutcome::rejected(
                ActivationErrorCode::InvalidFormat,
                "invalid key format: product key is empty",
            ));
        }

        if let Some(existing) = self.tokens.load_at(now)? {
            warn!(
                key_hash = %short_hash(existing.product_key_hash()),
                "activation refused: already activated"
            );
            return Ok(ActivationOutcome::rejected(
                ActivationErrorCode::AlreadyActivated,
                "this machine is already activated; deactivate it before using another key",
            ));
        }

        if force_online {
            return Ok(self.activate_online(key));
        }

        let product_key = match self.validator.validate_at(key, now) {
            Ok(product_key) => product_key,
            Err(err) => {
                info!(kind = ?err.kind(), "activation refused");
                return Ok(ActivationOutcome::Rejected(err.into()));
            }
        };

        let token = ActivationToken::from_product_key(
            &product_key,
            self.device.machine_id(),
            now,
            self.hasher.as_ref(),
        )?;
        self.tokens.save(&token)?;

        info!(
            key_hash = %short_hash(token.product_key_hash()),
            license_type = token.license_type().name(),
            "machine activated"
        );
        Ok(ActivationOutcome::Activated(token))
    }

    /// Online registry check (revocation, activation limits). There is no
    /// registry service yet, so this always reports a network error.
    fn activate_online(&self, _key: &str) -> ActivationOutcome {
        warn!("online activation requested but no activation registry is available");
        ActivationOutcome::rejected(
            ActivationErrorCode::NetworkError,
            "online activation is not available; activate offline instead",
        )
    }

    /// Removes the activation. Succeeds if there was none.
    pub fn deactivate(&self) -> LicenseResult<()> {
        self.tokens.delete()
    }

    /// Describes the current license.
    ///
    /// # Errors
    ///
    /// Propagates token-manager faults, so a corrupted token surfaces as an
    /// error instead of "not activated".
    pub fn license_info(&self) -> LicenseResult<LicenseInfo> {
        Ok(LicenseInfo::from_token(self.tokens.load()?.as_ref()))
    }

    /// True iff an unexpired token for this machine is stored.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.tokens.is_activated()
    }
}
