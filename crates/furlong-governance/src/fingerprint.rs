// crates/furlong-governance/src/fingerprint.rs
// ============================================================================
// Module: Proposal Fingerprinting
// Description: Deterministic hashes for cross-episode deduplication.
// Purpose: Identical findings across episodes share one proposal row.
// Dependencies: furlong-core, serde_json
// ============================================================================

//! ## Overview
//! The fingerprint covers the critic type, the finding type, and the
//! canonical form of the proposed change, and nothing else. Episode ids,
//! timestamps, and free-text descriptions are deliberately excluded so the
//! same finding emitted by different episodes (or re-worded by a critic)
//! still collapses onto one row. Canonicalization is RFC 8785: sorted keys,
//! UTF-8, no whitespace; any deviation would bifurcate the dedup set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use furlong_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use furlong_core::core::hashing::HashError;
use furlong_core::core::hashing::hash_canonical_json;
use serde_json::Value;
use serde_json::json;

use crate::types::CriticType;

// ============================================================================
// SECTION: Fingerprint
// ============================================================================

/// Computes the deduplication fingerprint for a proposal.
///
/// The digest is SHA-256 over the canonical JSON of
/// `{critic_type, finding_type, proposed_change}` (64 lowercase hex chars).
///
/// # Errors
///
/// Returns [`HashError`] when the payload cannot be canonicalized (e.g.
/// non-finite floats inside the proposed change).
pub fn fingerprint_proposal(
    critic_type: CriticType,
    finding_type: &str,
    proposed_change: &Value,
) -> Result<String, HashError> {
    let payload = json!({
        "critic_type": critic_type.as_str(),
        "finding_type": finding_type,
        "proposed_change": proposed_change,
    });
    Ok(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &payload)?.value)
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

    use super::fingerprint_proposal;
    use crate::types::CriticType;

    #[test]
    fn identical_payloads_share_a_fingerprint() {
        let change = json!({"rule_type": "temporal_validation"});
        let first = fingerprint_proposal(CriticType::Leakage, "FUTURE_MARKET", &change)
            .expect("first");
        let second = fingerprint_proposal(CriticType::Leakage, "FUTURE_MARKET", &change)
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn key_order_does_not_bifurcate_the_dedup_set() {
        let ordered = json!({"action": "reject_snapshot", "rule_type": "temporal_validation"});
        let reordered = json!({"rule_type": "temporal_validation", "action": "reject_snapshot"});
        let first = fingerprint_proposal(CriticType::Leakage, "FUTURE_MARKET", &ordered)
            .expect("first");
        let second = fingerprint_proposal(CriticType::Leakage, "FUTURE_MARKET", &reordered)
            .expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn different_changes_produce_different_fingerprints() {
        let first = fingerprint_proposal(
            CriticType::Leakage,
            "FUTURE_MARKET",
            &json!({"rule": "validate_time"}),
        )
        .expect("first");
        let second = fingerprint_proposal(
            CriticType::Leakage,
            "FUTURE_MARKET",
            &json!({"rule": "reject_future"}),
        )
        .expect("second");
        assert_ne!(first, second);
    }

    #[test]
    fn critic_type_is_part_of_the_identity() {
        let change = json!({"rule": "x"});
        let leakage =
            fingerprint_proposal(CriticType::Leakage, "F", &change).expect("leakage");
        let bias = fingerprint_proposal(CriticType::Bias, "F", &change).expect("bias");
        assert_ne!(leakage, bias);
    }
}
