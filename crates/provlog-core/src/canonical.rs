//! RFC 8785 (JCS) canonical serialization.
//!
//! Every hash in the system is computed over canonical bytes produced here.
//! The sealer, the verifier, and the export writer all route through this
//! module, and the encoding must stay bit-identical across those call sites:
//! two canonicalizations of the same value are the same byte sequence, on any
//! platform, in any process.
//!
//! Profile notes:
//! - Object keys sort by their UTF-16 code-unit sequence, not by code point.
//! - Numbers follow the ECMAScript serialization RFC 8785 mandates
//!   (lowercase exponent marker, no `e+`, `-0` prints as `0`).
//! - Strings are emitted verbatim as UTF-8; no NFC normalization is applied.
//! - No insignificant whitespace anywhere.

use serde::Serialize;
use serde_json::Value;

/// Canonicalization failure. Maps to the `jcs-invalid` wire code.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    #[error("value has no RFC 8785 canonical form: {0}")]
    Unrepresentable(String),
}

/// Canonical bytes of any serializable value.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    serde_jcs::to_vec(value).map_err(|e| CanonicalError::Unrepresentable(e.to_string()))
}

/// Canonical form as a UTF-8 string.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    serde_jcs::to_string(value).map_err(|e| CanonicalError::Unrepresentable(e.to_string()))
}

/// Parse a canonical payload string back into a JSON value.
///
/// Committed events store their payload as canonical text; consumers that
/// need structured access go through here.
pub fn parse_canonical(text: &str) -> Result<Value, CanonicalError> {
    serde_json::from_str(text).map_err(|e| CanonicalError::Unrepresentable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn literals() {
        assert_eq!(to_canonical_string(&json!(null)).unwrap(), "null");
        assert_eq!(to_canonical_string(&json!(true)).unwrap(), "true");
        assert_eq!(to_canonical_string(&json!(false)).unwrap(), "false");
    }

    #[test]
    fn integers_have_no_decoration() {
        assert_eq!(to_canonical_string(&json!(0)).unwrap(), "0");
        assert_eq!(to_canonical_string(&json!(42)).unwrap(), "42");
        assert_eq!(to_canonical_string(&json!(-7)).unwrap(), "-7");
        assert_eq!(
            to_canonical_string(&json!(9007199254740991i64)).unwrap(),
            "9007199254740991"
        );
    }

    #[test]
    fn negative_zero_prints_as_zero() {
        assert_eq!(to_canonical_string(&json!(-0.0)).unwrap(), "0");
    }

    #[test]
    fn float_with_integral_value_drops_fraction() {
        assert_eq!(to_canonical_string(&json!(2.0)).unwrap(), "2");
    }

    #[test]
    fn keys_sort_and_whitespace_is_absent() {
        let v = json!({"b": 1, "a": [1, 2, {"z": null, "y": "x"}]});
        assert_eq!(
            to_canonical_string(&v).unwrap(),
            r#"{"a":[1,2,{"y":"x","z":null}],"b":1}"#
        );
    }

    #[test]
    fn non_ascii_stays_verbatim_utf8() {
        let v = json!({"name": "café", "emoji": "🦀"});
        assert_eq!(
            to_canonical_string(&v).unwrap(),
            "{\"emoji\":\"🦀\",\"name\":\"café\"}"
        );
    }

    #[test]
    fn supplementary_plane_keys_sort_by_utf16_units() {
        // U+10000 encodes as the surrogate pair D800 DC00, which sorts below
        // U+E000 in UTF-16 code-unit order even though its code point is higher.
        let v = json!({"\u{e000}": 1, "\u{10000}": 2});
        assert_eq!(
            to_canonical_string(&v).unwrap(),
            "{\"\u{10000}\":2,\"\u{e000}\":1}"
        );
    }

    #[test]
    fn control_characters_escape_and_quotes_escape() {
        let v = json!({"s": "line\nbreak \"quoted\""});
        assert_eq!(
            to_canonical_string(&v).unwrap(),
            r#"{"s":"line\nbreak \"quoted\""}"#
        );
    }

    #[test]
    fn round_trip_is_stable() {
        let v = json!({"k": [1.5, "two", {"nested": true}], "n": 1e3});
        let first = to_canonical_string(&v).unwrap();
        let reparsed = parse_canonical(&first).unwrap();
        assert_eq!(to_canonical_string(&reparsed).unwrap(), first);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 é🦀]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonicalization_is_deterministic(v in arb_json()) {
            let a = to_canonical_bytes(&v).unwrap();
            let b = to_canonical_bytes(&v).unwrap();
            prop_assert_eq!(&a, &b);

            // parse(canonicalize(v)) canonicalizes back to the same bytes
            let reparsed = parse_canonical(std::str::from_utf8(&a).unwrap()).unwrap();
            prop_assert_eq!(to_canonical_bytes(&reparsed).unwrap(), a);
        }
    }
}
