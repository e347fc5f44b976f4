//! Request fingerprinting
//!
//! A fingerprint is the SHA-256 digest of
//! `subject_id \0 session_id \0 canonical(snapshot)`.
//!
//! Canonical form is compact JSON with object keys sorted at every depth, so
//! two snapshots with identical content in different field order hash
//! identically.

use crate::types::HealthSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Deterministic digest identifying a cacheable request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestFingerprint([u8; 32]);

/// Fingerprint parse failure
#[derive(Debug, Error, PartialEq)]
pub enum FingerprintError {
    #[error("Fingerprint is not valid hex: {0}")]
    InvalidHex(String),

    #[error("Fingerprint must be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Snapshot could not be canonicalized: {0}")]
    Canonicalization(String),
}

impl RequestFingerprint {
    /// Compute the fingerprint for one request
    pub fn compute(
        subject_id: &str,
        session_id: &str,
        snapshot: &HealthSnapshot,
    ) -> Result<Self, FingerprintError> {
        let canonical = canonical_snapshot(snapshot)?;

        let mut hasher = Sha256::new();
        hasher.update(subject_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(session_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());

        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for RequestFingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| FingerprintError::InvalidHex(e.to_string()))?;
        let len = bytes.len();
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FingerprintError::InvalidLength(len))?;
        Ok(Self(array))
    }
}

impl Serialize for RequestFingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RequestFingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical JSON text of a snapshot
pub fn canonical_snapshot(snapshot: &HealthSnapshot) -> Result<String, FingerprintError> {
    let value = serde_json::to_value(snapshot)
        .map_err(|e| FingerprintError::Canonicalization(e.to_string()))?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
