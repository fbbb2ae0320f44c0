//! The binary payload carried inside a product key.
//!
//! Payload layout (12 bytes, big-endian):
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 1 | license type code |
//! | 1 | 4 | expiration, Unix seconds (`0xFFFFFFFF` = perpetual) |
//! | 5 | 4 | customer id |
//! | 9 | 1 | feature-flag bitmask |
//! | 10 | 2 | CRC16 over bytes 0..10 |

use crate::error::{LicenseError, LicenseResult};
use crate::hash::crc16;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Size of the decoded payload in bytes.
pub const PAYLOAD_LEN: usize = 12;

/// Number of payload bytes covered by the checksum.
pub const CHECKSUMMED_LEN: usize = 10;

/// Expiration sentinel for licenses that never expire.
pub const PERPETUAL_EXPIRATION: u32 = 0xFFFF_FFFF;

/// The license tier encoded in the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseType {
    /// Field technician: browse and follow guides.
    Tech,
    /// Administrator: author and publish guides.
    Admin,
    /// Time-limited evaluation.
    Trial,
}

impl LicenseType {
    /// Returns the wire code for this tier.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Tech => 0x01,
            Self::Admin => 0x02,
            Self::Trial => 0x03,
        }
    }

    /// Maps a wire code back to a tier. Unknown codes yield `None`.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Tech),
            0x02 => Some(Self::Admin),
            0x03 => Some(Self::Trial),
            _ => None,
        }
    }

    /// Returns true for the administrative tier.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Display name, as stored in activation tokens.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Tech => "Tech",
            Self::Admin => "Admin",
            Self::Trial => "Trial",
        }
    }
}

/// An optional capability unlocked by a bit in the feature-flag byte.
///
/// Bits 3-7 are reserved and ignored when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    /// Guide authoring (bit 0).
    Editor,
    /// Extended usage reports (bit 1).
    AdvancedReporting,
    /// Programmatic access (bit 2).
    ApiAccess,
}

impl Feature {
    /// All known features, in bit order.
    pub const ALL: [Feature; 3] = [Self::Editor, Self::AdvancedReporting, Self::ApiAccess];

    /// Returns the mask bit for this feature.
    #[must_use]
    pub fn bit(self) -> u8 {
        match self {
            Self::Editor => 1 << 0,
            Self::AdvancedReporting => 1 << 1,
            Self::ApiAccess => 1 << 2,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Editor => "Editor",
            Self::AdvancedReporting => "AdvancedReporting",
            Self::ApiAccess => "ApiAccess",
        }
    }

    /// Case-insensitive lookup by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Decodes the features set in `flags`.
    #[must_use]
    pub fn from_flags(flags: u8) -> Vec<Feature> {
        Self::ALL
            .into_iter()
            .filter(|f| flags & f.bit() != 0)
            .collect()
    }

    /// Decodes `flags` into the feature names stored in tokens.
    #[must_use]
    pub fn names_from_flags(flags: u8) -> BTreeSet<String> {
        Self::from_flags(flags)
            .into_iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Encodes a feature list as a bitmask.
    #[must_use]
    pub fn to_flags(features: &[Feature]) -> u8 {
        features.iter().fold(0, |acc, f| acc | f.bit())
    }
}

/// The structured fields of a key payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPayload {
    /// License tier.
    pub license_type: LicenseType,
    /// Expiration (whole seconds), or `None` for perpetual.
    pub expires_at: Option<DateTime<Utc>>,
    /// Customer account number.
    pub customer_id: u32,
    /// Raw feature bitmask, reserved bits included.
    pub feature_flags: u8,
}

impl KeyPayload {
    /// Serializes the payload and appends its checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the expiration does not fit an unsigned 32-bit
    /// Unix timestamp below the perpetual sentinel.
    pub fn to_bytes(&self) -> LicenseResult<[u8; PAYLOAD_LEN]> {
        let expiration = match self.expires_at {
            None => PERPETUAL_EXPIRATION,
            Some(at) => u32::try_from(at.timestamp())
                .ok()
                .filter(|&secs| secs != PERPETUAL_EXPIRATION)
                .ok_or_else(|| {
                    LicenseError::InvalidKeyFormat(format!("expiration {at} is out of range"))
                })?,
        };

        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[0] = self.license_type.code();
        bytes[1..5].copy_from_slice(&expiration.to_be_bytes());
        bytes[5..9].copy_from_slice(&self.customer_id.to_be_bytes());
        bytes[9] = self.feature_flags;
        let checksum = crc16(&bytes[..CHECKSUMMED_LEN]);
        bytes[CHECKSUMMED_LEN..].copy_from_slice(&checksum.to_be_bytes());
        Ok(bytes)
    }

    /// Returns the features enabled by this payload.
    #[must_use]
    pub fn features(&self) -> Vec<Feature> {
        Feature::from_flags(self.feature_flags)
    }
}

/// Reads the expiration field; `None` means perpetual.
pub(crate) fn expiration_from_bytes(payload: &[u8; PAYLOAD_LEN]) -> Option<DateTime<Utc>> {
    let secs = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    if secs == PERPETUAL_EXPIRATION {
        return None;
    }
    DateTime::from_timestamp(i64::from(secs), 0)
}

pub(crate) fn customer_id_from_bytes(payload: &[u8; PAYLOAD_LEN]) -> u32 {
    u32::from_be_bytes([payload[5], payload[6], payload[7], payload[8]])
}

pub(crate) fn checksum_from_bytes(payload: &[u8; PAYLOAD_LEN]) -> u16 {
    u16::from_be_bytes([payload[10], payload[11]])
}
