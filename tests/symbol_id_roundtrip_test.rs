//! Compact symbol id and base-63 codec end-to-end checks.

use lci::encoding::{decode, encode};
use lci::{CompositeSymbolId, FileId};

#[test]
fn test_round_trip_symbol_id() {
    let id = CompositeSymbolId::new(FileId::new(42).unwrap(), 123);
    let encoded = id.compact();
    let parsed = CompositeSymbolId::parse_compact(&encoded).unwrap();
    assert_eq!(parsed, Some(id));
}

#[test]
fn test_base63_small_cases() {
    assert_eq!(encode(0), "A");
    assert_eq!(encode(62), "_");
    assert_eq!(encode(63), "BA");
    assert_eq!(encode(5130), "BSb");
}

#[test]
fn test_decode_inverts_encode_across_ranges() {
    let mut v: u64 = 1;
    while v < u64::MAX / 63 {
        assert_eq!(decode(&encode(v)).unwrap(), v);
        assert_eq!(decode(&encode(v - 1)).unwrap(), v - 1);
        assert_eq!(decode(&encode(v + 1)).unwrap(), v + 1);
        v *= 63;
    }
    assert_eq!(decode(&encode(u64::MAX)).unwrap(), u64::MAX);
}

#[test]
fn test_compact_form_is_filename_safe() {
    for local in [0u32, 1, 62, 63, 4096, u32::MAX] {
        let id = CompositeSymbolId::new(FileId::new(u32::MAX).unwrap(), local);
        let encoded = id.compact();
        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "unsafe character in {encoded:?}"
        );
    }
}

#[test]
fn test_zero_sentinel_is_invalid_id() {
    assert_eq!(CompositeSymbolId::parse_compact("A").unwrap(), None);
}

#[test]
fn test_malformed_ids_rejected() {
    assert!(CompositeSymbolId::parse_compact("hello world").is_err());
    assert!(CompositeSymbolId::parse_compact("B-").is_err());
    assert!(CompositeSymbolId::parse_compact("").is_err());
}
