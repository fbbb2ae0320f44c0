//! Read-only entitlement queries for the rest of the application.

use crate::error::LicenseResult;
use crate::key::LicenseType;
use crate::store::TokenManager;
use crate::token::ActivationToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A view of the current license, suitable for display.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseInfo {
    pub is_activated: bool,
    pub license_type: Option<LicenseType>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Whole days left; `None` if perpetual or not activated.
    pub days_remaining: Option<i64>,
    pub customer_id: Option<String>,
    pub enabled_features: BTreeSet<String>,
}

impl LicenseInfo {
    /// Projects a loaded token; `None` means "not activated".
    #[must_use]
    pub fn from_token(token: Option<&ActivationToken>) -> Self {
        let Some(token) = token.filter(|t| !t.is_expired()) else {
            return Self::default();
        };
        Self {
            is_activated: true,
            license_type: Some(token.license_type()),
            expiration_date: token.expiration_date(),
            days_remaining: token.days_until_expiration(),
            customer_id: Some(token.customer_id().to_string()),
            enabled_features: token.enabled_features().clone(),
        }
    }
}

/// Answers "what is this installation allowed to do?".
#[derive(Clone)]
pub struct LicenseManager {
    tokens: Arc<TokenManager>,
}

impl LicenseManager {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }

    /// Describes the current license.
    pub fn license_info(&self) -> LicenseResult<LicenseInfo> {
        Ok(LicenseInfo::from_token(self.tokens.load()?.as_ref()))
    }

    /// Case-insensitive feature check; false when not activated or expired.
    pub fn is_feature_enabled(&self, name: &str) -> LicenseResult<bool> {
        Ok(self
            .tokens
            .load()?
            .is_some_and(|token| token.has_feature(name)))
    }

    /// True for an unexpired administrator license.
    pub fn is_admin_license(&self) -> LicenseResult<bool> {
        Ok(self
            .tokens
            .load()?
            .is_some_and(|token| token.license_type().is_admin()))
    }
}
