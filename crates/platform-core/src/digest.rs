//! Canonical digests used to bind tokens to exact payloads.
//!
//! Callers serialize a dedicated canonical struct (fixed field order, sorted
//! collections) so the JSON bytes, and therefore the hash, depend only on
//! content.

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of the compact JSON encoding of `value`.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}
