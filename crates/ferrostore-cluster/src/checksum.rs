//! Canonical checksums for cluster entity sync (§4.11, §9).
//!
//! `serde_json::Value`'s object map is a `BTreeMap` (this workspace never
//! enables the `preserve_order` feature), so routing a struct through
//! `to_value` before `to_vec` sorts its keys regardless of field
//! declaration order — the "sorted keys, fixed number formatting"
//! stability the sync protocol needs, no hand-rolled walk required.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ClusterResult;

/// Hex-encoded SHA-256 of `value`'s canonical JSON serialization.
pub fn canonical_checksum<T: Serialize>(value: &T) -> ClusterResult<String> {
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Entity {
        b: i32,
        a: i32,
    }

    #[test]
    fn test_checksum_is_stable_regardless_of_struct_field_order() {
        let a = canonical_checksum(&Entity { b: 2, a: 1 }).unwrap();
        let b = canonical_checksum(&serde_json::json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let a = canonical_checksum(&serde_json::json!({"a": 1})).unwrap();
        let b = canonical_checksum(&serde_json::json!({"a": 2})).unwrap();
        assert_ne!(a, b);
    }
}
