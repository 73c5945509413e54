// SPDX-License-Identifier: MIT

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_hash_map_lookup() {
    let mut map = HashMap::new();
    let id = TestId::new();
    map.insert(id, 42);
    assert_eq!(map.get(id.as_str()), Some(&42));
}

#[test]
fn define_id_round_trips_through_string() {
    let id = TestId::new();
    let parsed = TestId::from_string(id.as_str());
    assert_eq!(id, parsed);
}

#[test]
fn define_id_carries_prefix() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn define_id_suffix_strips_prefix() {
    let id = TestId::from_string("tst-abc");
    assert_eq!(id.suffix(), "abc");
}

#[test]
fn define_id_short_truncates_suffix() {
    let id = TestId::from_string("tst-abcdefghijklmnop");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn define_id_new_produces_unique_values() {
    let a = TestId::new();
    let b = TestId::new();
    assert_ne!(a, b);
}

#[test]
fn short_fn_on_str() {
    let s = "abcdefghijklmnop";
    assert_eq!(short(s, 8), "abcdefgh");
    assert_eq!(short(s, 100), s);
    assert_eq!(short("abc", 8), "abc");
}

#[test]
fn idbuf_rejects_oversized_string_on_deserialize() {
    let oversized = "x".repeat(ID_MAX_LEN + 1);
    let json = serde_json::to_string(&oversized).unwrap();
    let result: Result<IdBuf, _> = serde_json::from_str(&json);
    assert!(result.is_err());
}
