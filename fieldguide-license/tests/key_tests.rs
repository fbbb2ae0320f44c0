mod common;

use chrono::{DateTime, TimeZone, Utc};
use common::{issue_into, issuer, payload};
use fieldguide_license::{
    crc16, decode_key, encode_key, is_valid_format, Feature, KeyPayload, LicenseError,
    LicenseType, SignatureTable, ValidationErrorKind, ALPHABET, PAYLOAD_LEN,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const TECH_KEY: &str = "13Bxs-3zgxa-UJKEP-My35w-UZw8u";
const ADMIN_KEY: &str = "13fx4-SXk1n-gbzWi-dnjEb-XukZs";

fn hex_payload(hex_str: &str) -> [u8; PAYLOAD_LEN] {
    let mut out = [0u8; PAYLOAD_LEN];
    out.copy_from_slice(&hex::decode(hex_str).unwrap());
    out
}

// ── LicenseType ──────────────────────────────────────────────────

#[test]
fn license_type_codes() {
    assert_eq!(LicenseType::Tech.code(), 0x01);
    assert_eq!(LicenseType::Admin.code(), 0x02);
    assert_eq!(LicenseType::Trial.code(), 0x03);
    for t in [LicenseType::Tech, LicenseType::Admin, LicenseType::Trial] {
        assert_eq!(LicenseType::from_code(t.code()), Some(t));
    }
    assert_eq!(LicenseType::from_code(0x00), None);
    assert_eq!(LicenseType::from_code(0x04), None);
}

#[test]
fn only_admin_is_admin() {
    assert!(LicenseType::Admin.is_admin());
    assert!(!LicenseType::Tech.is_admin());
    assert!(!LicenseType::Trial.is_admin());
}

#[test]
fn license_type_serde() {
    let json = serde_json::to_string(&LicenseType::Admin).unwrap();
    assert_eq!(json, "\"Admin\"");
    let parsed: LicenseType = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, LicenseType::Admin);
}

// ── Feature ──────────────────────────────────────────────────────

#[test]
fn feature_bits() {
    assert_eq!(Feature::Editor.bit(), 0b001);
    assert_eq!(Feature::AdvancedReporting.bit(), 0b010);
    assert_eq!(Feature::ApiAccess.bit(), 0b100);
}

#[test]
fn reserved_feature_bits_are_ignored() {
    assert_eq!(Feature::from_flags(0b1111_1000), Vec::<Feature>::new());
    assert_eq!(
        Feature::from_flags(0b1000_0101),
        vec![Feature::Editor, Feature::ApiAccess]
    );
}

#[test]
fn feature_lookup_is_case_insensitive() {
    assert_eq!(Feature::from_name("editor"), Some(Feature::Editor));
    assert_eq!(Feature::from_name("APIACCESS"), Some(Feature::ApiAccess));
    assert_eq!(
        Feature::from_name(" advancedReporting "),
        Some(Feature::AdvancedReporting)
    );
    assert_eq!(Feature::from_name("Publishing"), None);
}

#[test]
fn feature_names_from_flags() {
    let names = Feature::names_from_flags(0b111);
    assert_eq!(
        names.into_iter().collect::<Vec<_>>(),
        vec!["AdvancedReporting", "ApiAccess", "Editor"]
    );
}

// ── KeyPayload ───────────────────────────────────────────────────

#[test]
fn crc16_check_value() {
    assert_eq!(crc16(b"123456789"), 0x29B1);
}

#[test]
fn payload_layout_perpetual() {
    let p = payload(
        LicenseType::Tech,
        None,
        1234,
        &[Feature::Editor, Feature::ApiAccess],
    );
    assert_eq!(p.to_bytes().unwrap(), hex_payload("01ffffffff000004d20598e0"));
}

#[test]
fn payload_layout_with_expiration() {
    let exp = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let p = payload(LicenseType::Admin, Some(exp), 7, &Feature::ALL);
    assert_eq!(p.to_bytes().unwrap(), hex_payload("0270dbd88000000007079bb1"));
}

#[test]
fn payload_rejects_unrepresentable_expiration() {
    let before_epoch = DateTime::from_timestamp(-1, 0).unwrap();
    let sentinel = DateTime::from_timestamp(0xFFFF_FFFF, 0).unwrap();
    let too_late = DateTime::from_timestamp(0x1_0000_0000, 0).unwrap();
    for exp in [before_epoch, sentinel, too_late] {
        let p = payload(LicenseType::Trial, Some(exp), 1, &[]);
        assert!(matches!(p.to_bytes(), Err(LicenseError::InvalidKeyFormat(_))));
    }
}

// ── Codec ────────────────────────────────────────────────────────

#[test]
fn alphabet_excludes_ambiguous_symbols() {
    assert_eq!(ALPHABET.len(), 58);
    for c in [b'0', b'O', b'I', b'l'] {
        assert!(!ALPHABET.contains(&c));
    }
}

#[test]
fn issued_keys_match_golden_vectors() {
    let tech = issuer()
        .issue(&payload(
            LicenseType::Tech,
            None,
            1234,
            &[Feature::Editor, Feature::ApiAccess],
        ))
        .unwrap();
    assert_eq!(tech.key, TECH_KEY);
    assert_eq!(tech.reference, "35wUZw8u");

    let exp = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let admin = issuer()
        .issue(&payload(LicenseType::Admin, Some(exp), 7, &Feature::ALL))
        .unwrap();
    assert_eq!(admin.key, ADMIN_KEY);
    assert_eq!(admin.reference, "jEbXukZs");
}

#[test]
fn golden_signature() {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let tech = issuer()
        .issue(&payload(
            LicenseType::Tech,
            None,
            1234,
            &[Feature::Editor, Feature::ApiAccess],
        ))
        .unwrap();
    assert_eq!(
        STANDARD.encode(&tech.signature),
        "wJSvd8GupAAeA/X7RJKULAkiDrhBNJ/IwJK4UY32iWcKi5KZPzURq3x2JzB9qnJd9nud/fAhHLUDyOWhTtSdAw=="
    );
}

#[test]
fn decode_golden_key() {
    let decoded = decode_key(TECH_KEY).unwrap();
    assert_eq!(decoded.payload, hex_payload("01ffffffff000004d20598e0"));
    assert_eq!(decoded.reference, "35wUZw8u");
}

#[test]
fn decode_tolerates_surrounding_whitespace() {
    let decoded = decode_key(&format!("  {TECH_KEY}\n")).unwrap();
    assert_eq!(decoded.reference, "35wUZw8u");
}

#[test]
fn format_check() {
    assert!(is_valid_format(TECH_KEY));
    assert!(is_valid_format(ADMIN_KEY));
    assert!(!is_valid_format(""));
    assert!(!is_valid_format("ABCD-12345-12345-12345-12345"));
    assert!(!is_valid_format("13Bxs-3zgxa-UJKEP-My35w"));
    assert!(!is_valid_format("13Bxs3zgxaUJKEPMy35wUZw8u"));
    assert!(!is_valid_format("13Bxs-3zgxa-UJKEP-My35w-UZw8u-11111"));
    // '0' is not a base-58 symbol
    assert!(!is_valid_format("03Bxs-3zgxa-UJKEP-My35w-UZw8u"));
}

#[test]
fn short_first_group_is_a_format_error() {
    let err = decode_key("ABCD-12345-12345-12345-12345").unwrap_err();
    assert_eq!(err.kind(), ValidationErrorKind::Format);
    assert!(err.message().starts_with("invalid key format"));
}

#[test]
fn oversized_payload_is_a_format_error() {
    // 17 'z' symbols encode a value far above 2^96
    let err = decode_key("zzzzz-zzzzz-zzzzz-zz111-11111").unwrap_err();
    assert_eq!(err.kind(), ValidationErrorKind::Format);
}

#[test]
fn encode_rejects_bad_reference() {
    let bytes = hex_payload("01ffffffff000004d20598e0");
    assert!(encode_key(&bytes, "short").is_err());
    assert!(encode_key(&bytes, "0OIl0OIl").is_err());
    assert_eq!(encode_key(&bytes, "35wUZw8u").unwrap(), TECH_KEY);
}

#[test]
fn issued_signature_lands_in_table() {
    let mut table = SignatureTable::new();
    let issued = issue_into(&mut table, &payload(LicenseType::Trial, None, 99, &[]));
    assert_eq!(table.len(), 1);
    assert!(issued.key.ends_with(&issued.reference[3..]));
}

// ── Properties ───────────────────────────────────────────────────

fn arb_payload() -> impl Strategy<Value = KeyPayload> {
    (
        prop_oneof![
            Just(LicenseType::Tech),
            Just(LicenseType::Admin),
            Just(LicenseType::Trial)
        ],
        prop::option::of(0u32..0xFFFF_FFFF),
        any::<u32>(),
        any::<u8>(),
    )
        .prop_map(|(license_type, exp, customer_id, feature_flags)| KeyPayload {
            license_type,
            expires_at: exp.and_then(|s| DateTime::from_timestamp(i64::from(s), 0)),
            customer_id,
            feature_flags,
        })
}

proptest! {
    #[test]
    fn encoded_keys_decode_to_their_payload(p in arb_payload(), reference in "[1-9A-HJ-NP-Za-km-z]{8}") {
        let bytes = p.to_bytes().unwrap();
        let key = encode_key(&bytes, &reference).unwrap();
        prop_assert!(is_valid_format(&key));
        let decoded = decode_key(&key).unwrap();
        prop_assert_eq!(decoded.payload, bytes);
        prop_assert_eq!(decoded.reference, reference);
    }

    #[test]
    fn any_single_byte_change_breaks_the_checksum(
        p in arb_payload(),
        index in 0usize..10,
        delta in 1u8..=255,
    ) {
        let mut bytes = p.to_bytes().unwrap();
        bytes[index] = bytes[index].wrapping_add(delta);
        let stored = u16::from_be_bytes([bytes[10], bytes[11]]);
        prop_assert_ne!(crc16(&bytes[..10]), stored);
    }

    #[test]
    fn decode_never_panics(input in "\\PC{0,40}") {
        let _ = decode_key(&input);
    }
}
