//! Product key text encoding.
//!
//! A key is five hyphen-separated groups of five symbols from the Bitcoin
//! base-58 alphabet (no `0`, `O`, `I` or `l`):
//!
//! ```text
//! PPPPP-PPPPP-PPPPP-PPRRR-RRRRR
//! ```
//!
//! The first 17 symbols (`P`) are the 12-byte payload as a fixed-width
//! base-58 number, left-padded with the zero symbol `1`. The last 8 symbols
//! (`R`) are the signature reference used to look up the issued signature.
//! 17 symbols is the shortest width that holds every 96-bit value.

use crate::error::{LicenseError, LicenseResult, ValidationError, ValidationErrorKind};
use crate::key::PAYLOAD_LEN;
use regex::Regex;
use std::sync::LazyLock;

/// Base-58 alphabet, in digit order.
pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Symbols carrying the payload.
pub const PAYLOAD_SYMBOLS: usize = 17;

/// Symbols carrying the signature reference.
pub const REFERENCE_SYMBOLS: usize = 8;

const GROUPS: usize = 5;
const GROUP_LEN: usize = 5;

static KEY_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    let class = "[1-9A-HJ-NP-Za-km-z]";
    Regex::new(&format!("^{class}{{5}}(?:-{class}{{5}}){{4}}$")).expect("static key pattern")
});

/// A key split into its binary payload and signature reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub payload: [u8; PAYLOAD_LEN],
    pub reference: String,
}

/// Cheap structural check: five groups of five base-58 symbols.
#[must_use]
pub fn is_valid_format(key: &str) -> bool {
    KEY_FORMAT.is_match(key.trim())
}

/// Decodes a key string into its payload and reference.
///
/// # Errors
///
/// Fails with [`ValidationErrorKind::Format`] if the text does not match the
/// key format or the payload field does not fit in 12 bytes.
pub fn decode(key: &str) -> Result<DecodedKey, ValidationError> {
    let key = key.trim();
    if !is_valid_format(key) {
        return Err(ValidationError::new(
            ValidationErrorKind::Format,
            "invalid key format: expected five groups of five base-58 characters (XXXXX-XXXXX-XXXXX-XXXXX-XXXXX)",
        ));
    }

    let symbols: String = key.chars().filter(|c| *c != '-').collect();
    let (payload_part, reference) = symbols.split_at(PAYLOAD_SYMBOLS);

    let value = decode_fixed(payload_part).ok_or_else(|| {
        ValidationError::new(ValidationErrorKind::Format, "invalid key format: undecodable payload")
    })?;
    if value >> (PAYLOAD_LEN * 8) != 0 {
        return Err(ValidationError::new(
            ValidationErrorKind::Format,
            format!("invalid key format: payload is longer than {PAYLOAD_LEN} bytes"),
        ));
    }

    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(&value.to_be_bytes()[16 - PAYLOAD_LEN..]);

    Ok(DecodedKey {
        payload,
        reference: reference.to_string(),
    })
}

/// Encodes a payload and reference as a grouped key string.
///
/// # Errors
///
/// Returns an error if `reference` is not exactly eight base-58 symbols.
pub fn encode(payload: &[u8; PAYLOAD_LEN], reference: &str) -> LicenseResult<String> {
    if reference.len() != REFERENCE_SYMBOLS || decode_fixed(reference).is_none() {
        return Err(LicenseError::InvalidKeyFormat(format!(
            "reference must be {REFERENCE_SYMBOLS} base-58 characters"
        )));
    }

    let mut wide = [0u8; 16];
    wide[16 - PAYLOAD_LEN..].copy_from_slice(payload);
    let body = encode_fixed(u128::from_be_bytes(wide), PAYLOAD_SYMBOLS)
        .ok_or_else(|| LicenseError::InvalidKeyFormat("payload does not fit".to_string()))?;

    let symbols = format!("{body}{reference}");
    Ok(group(&symbols))
}

/// Reduces a digest to a reference: its leading eight bytes, big-endian,
/// modulo 58^8, as eight symbols.
pub(crate) fn reference_from_digest(digest: &[u8; 32]) -> String {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let space = 58u128.pow(REFERENCE_SYMBOLS as u32);
    let value = u128::from(u64::from_be_bytes(head)) % space;
    encode_fixed(value, REFERENCE_SYMBOLS).unwrap_or_default()
}

fn group(symbols: &str) -> String {
    symbols
        .as_bytes()
        .chunks(GROUP_LEN)
        .take(GROUPS)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

fn digit(symbol: u8) -> Option<u128> {
    ALPHABET
        .iter()
        .position(|&a| a == symbol)
        .map(|d| d as u128)
}

/// Big-endian base-58 to integer. `None` on a foreign symbol or overflow.
fn decode_fixed(symbols: &str) -> Option<u128> {
    symbols.bytes().try_fold(0u128, |acc, s| {
        acc.checked_mul(58)?.checked_add(digit(s)?)
    })
}

/// Integer to base-58, left-padded with `1` to `width`. `None` if it does
/// not fit.
fn encode_fixed(mut value: u128, width: usize) -> Option<String> {
    let mut out = vec![ALPHABET[0]; width];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(value % 58) as usize];
        value /= 58;
    }
    if value != 0 {
        return None;
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_padding() {
        assert_eq!(encode_fixed(0, 4).as_deref(), Some("1111"));
        assert_eq!(encode_fixed(57, 2).as_deref(), Some("1z"));
        assert_eq!(encode_fixed(58, 2).as_deref(), Some("21"));
        assert_eq!(encode_fixed(58 * 58, 2), None);
    }

    #[test]
    fn decode_fixed_rejects_foreign_symbols() {
        assert_eq!(decode_fixed("21"), Some(58));
        assert_eq!(decode_fixed("0"), None);
        assert_eq!(decode_fixed("l"), None);
    }

    #[test]
    fn seventeen_symbols_hold_any_payload() {
        assert!(encode_fixed(u128::MAX >> 32, PAYLOAD_SYMBOLS).is_some());
    }

    #[test]
    fn grouping() {
        assert_eq!(
            group("1234567891234567891234567"),
            "12345-67891-23456-78912-34567"
        );
    }
}
