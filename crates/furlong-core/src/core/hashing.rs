// crates/furlong-core/src/core/hashing.rs
// ============================================================================
// Module: Furlong Canonical Hashing
// Description: RFC 8785 canonical JSON hashing and identifier derivation.
// Purpose: Give every record, artifact, and fingerprint a stable digest.
// Dependencies: serde, serde_jcs, serde_json, sha2, thiserror
// ============================================================================

//! ## Overview
//! All Furlong digests are computed over RFC 8785 canonical JSON bytes so the
//! same logical value hashes identically regardless of field ordering or
//! platform. Engine run ids, feature hashes, episode context hashes, and
//! proposal fingerprints are all short (16 hex) or full (64 hex) SHA-256
//! digests over canonical bytes. Non-finite floats are rejected rather than
//! silently normalized.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

use crate::core::identifiers::EngineRunId;
use crate::core::identifiers::RaceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default hash algorithm for all Furlong digests.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Length in hex characters of short derived identifiers.
pub const SHORT_DIGEST_LEN: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonicalization and hashing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashError {
    /// Value could not be canonicalized (non-finite float, serialization
    /// failure).
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Supported hash algorithms.
///
/// # Invariants
/// - Variants are stable for serialization and audit matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Returns a stable label for the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// Hash digest with its algorithm and lowercase hex value.
///
/// # Invariants
/// - `value` is lowercase hex of the raw digest bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Algorithm that produced the digest.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest value.
    pub value: String,
}

impl HashDigest {
    /// Creates a digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        let mut value = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            value.push_str(&format!("{byte:02x}"));
        }
        Self {
            algorithm,
            value,
        }
    }

    /// Returns the first [`SHORT_DIGEST_LEN`] hex characters of the digest.
    #[must_use]
    pub fn short(&self) -> String {
        self.value.chars().take(SHORT_DIGEST_LEN).collect()
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.value)
    }
}

// ============================================================================
// SECTION: Canonical JSON
// ============================================================================

/// Serializes a value as RFC 8785 canonical JSON bytes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the value contains non-finite
/// floats or cannot be serialized.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with the given algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            HashDigest::new(algorithm, &hasher.finalize())
        }
    }
}

/// Hashes a value over its canonical JSON bytes.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn hash_canonical_json<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

// ============================================================================
// SECTION: Derived Identifiers
// ============================================================================

/// Derives the engine run identifier from race id and decision timestamp.
///
/// The derivation is `sha256(race_id ++ "_" ++ rfc3339(decision_timestamp))`
/// truncated to [`SHORT_DIGEST_LEN`] hex characters, so replays of the same
/// race at the same decision instant share one run identity.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the decision timestamp cannot
/// be rendered.
pub fn derive_engine_run_id(
    race_id: &RaceId,
    decision_timestamp: Timestamp,
) -> Result<EngineRunId, HashError> {
    let rendered = decision_timestamp
        .to_rfc3339()
        .map_err(|err| HashError::Canonicalization(err.to_string()))?;
    let raw = format!("{}_{rendered}", race_id.as_str());
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, raw.as_bytes());
    Ok(EngineRunId::new(digest.short()))
}

/// Derives the short feature hash over both canonical context payloads.
///
/// # Errors
///
/// Returns [`HashError`] when either context cannot be canonicalized.
pub fn derive_features_hash<R: Serialize, M: Serialize>(
    race_ctx: &R,
    market_ctx: &M,
) -> Result<String, HashError> {
    let mut bytes = canonical_json_bytes(race_ctx)?;
    bytes.extend(canonical_json_bytes(market_ctx)?);
    Ok(hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes).short())
}

/// Derives the short context hash used for episode records.
///
/// # Errors
///
/// Returns [`HashError`] when the context cannot be canonicalized.
pub fn derive_context_hash<T: Serialize>(context: &T) -> Result<String, HashError> {
    Ok(hash_canonical_json(DEFAULT_HASH_ALGORITHM, context)?.short())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use serde_json::json;

    use super::DEFAULT_HASH_ALGORITHM;
    use super::HashDigest;
    use super::derive_engine_run_id;
    use super::hash_bytes;
    use super::hash_canonical_json;
    use crate::core::identifiers::RaceId;
    use crate::core::time::Timestamp;

    #[test]
    fn canonical_hash_is_order_independent_for_maps() {
        let value_a = json!({"b": 2, "a": 1});
        let value_b = json!({"a": 1, "b": 2});
        let hash_a = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &value_a).expect("hash a");
        let hash_b = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &value_b).expect("hash b");
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn golden_hash_empty_object() {
        // SHA-256 of "{}".
        let digest = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &json!({})).expect("hash");
        assert_eq!(
            digest.value,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn golden_hash_bytes_direct() {
        // SHA-256 of "test".
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, b"test");
        assert_eq!(
            digest.value,
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn canonical_hash_rejects_nan() {
        let err = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &f64::NAN).unwrap_err();
        assert!(matches!(err, super::HashError::Canonicalization(_)));
    }

    #[test]
    fn digest_short_is_sixteen_hex_chars() {
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, b"short");
        assert_eq!(digest.short().len(), 16);
    }

    #[test]
    fn digest_hex_is_lowercase() {
        let digest = HashDigest::new(DEFAULT_HASH_ALGORITHM, &[0xAB, 0xCD, 0xEF, 0x12]);
        assert_eq!(digest.value, "abcdef12");
    }

    #[test]
    fn engine_run_id_is_stable_across_calls() {
        let race_id = RaceId::new("CHE_2026-03-14_1430");
        let decision = Timestamp::parse_rfc3339("2026-03-14T14:20:00Z").expect("parse");
        let first = derive_engine_run_id(&race_id, decision).expect("first");
        let second = derive_engine_run_id(&race_id, decision).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 16);
    }

    #[test]
    fn engine_run_id_varies_with_decision_time() {
        let race_id = RaceId::new("CHE_2026-03-14_1430");
        let first = derive_engine_run_id(
            &race_id,
            Timestamp::parse_rfc3339("2026-03-14T14:20:00Z").expect("parse"),
        )
        .expect("first");
        let second = derive_engine_run_id(
            &race_id,
            Timestamp::parse_rfc3339("2026-03-14T14:21:00Z").expect("parse"),
        )
        .expect("second");
        assert_ne!(first, second);
    }
}
