// crates/furlong-governance/src/doctrine.rs
// ============================================================================
// Module: Doctrine Version Management
// Description: Semantic versioning of doctrine with bumps and rollbacks.
// Purpose: Exactly one active version; every change is a new row.
// Dependencies: crate::{store, types}, furlong-core, serde_json
// ============================================================================

//! ## Overview
//! Doctrine is the active set of rules and thresholds governing the
//! engine, versioned and human-approved. Bumps create a new row with a
//! parent pointer and activate it via compare-and-set; rollback reactivates
//! a prior row. Bumping never applies rule changes; engine rule changes
//! derived from accepted proposals live outside this layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use furlong_core::Timestamp;
use serde_json::Value;
use serde_json::json;

use crate::store::GovernanceError;
use crate::store::GovernanceStore;
use crate::types::ChangeType;
use crate::types::DoctrineVersion;
use crate::types::SemVer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// First doctrine version seeded on first use.
pub const SEED_VERSION: SemVer = SemVer::new(13, 0, 0);

/// Description of the seed version.
const SEED_DESCRIPTION: &str =
    "Constitutional baseline - episodic memory + read-only critics + doctrine guards";

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Returns the active doctrine version, seeding the baseline on first call.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn active_version(
    store: &dyn GovernanceStore,
    now: Timestamp,
) -> Result<SemVer, GovernanceError> {
    if let Some(active) = store.get_active_doctrine()? {
        return Ok(active.version);
    }
    let seed = DoctrineVersion {
        version: SEED_VERSION,
        created_at: now,
        created_by: "system".to_string(),
        description: SEED_DESCRIPTION.to_string(),
        rules_snapshot: json!({}),
        parent_version: None,
        active: true,
    };
    match store.insert_doctrine(&seed) {
        Ok(()) => Ok(SEED_VERSION),
        // Another worker seeded concurrently: read back the active row.
        Err(GovernanceError::Conflict(_)) => store
            .get_active_doctrine()?
            .map(|version| version.version)
            .ok_or_else(|| {
                GovernanceError::NotFound("active doctrine vanished after seed conflict".to_string())
            }),
        Err(err) => Err(err),
    }
}

/// Bumps the doctrine version and activates the new row.
///
/// Returns the new version. The rules snapshot defaults to an empty object;
/// no rule application happens here.
///
/// # Errors
///
/// Returns [`GovernanceError`] on storage failure.
pub fn bump_version(
    store: &dyn GovernanceStore,
    change: ChangeType,
    description: &str,
    created_by: &str,
    rules_snapshot: Option<Value>,
    now: Timestamp,
) -> Result<SemVer, GovernanceError> {
    let current = active_version(store, now)?;
    let next = current.bump(change);
    let row = DoctrineVersion {
        version: next,
        created_at: now,
        created_by: created_by.to_string(),
        description: description.to_string(),
        rules_snapshot: rules_snapshot.unwrap_or_else(|| json!({})),
        parent_version: Some(current),
        active: false,
    };
    store.insert_doctrine(&row)?;
    store.activate_doctrine(next)?;
    Ok(next)
}

/// Rolls the active doctrine back to a prior version.
///
/// # Errors
///
/// Returns [`GovernanceError::NotFound`] when the target version does not
/// exist.
pub fn rollback_to_version(
    store: &dyn GovernanceStore,
    target: SemVer,
) -> Result<(), GovernanceError> {
    if store.get_doctrine(target)?.is_none() {
        return Err(GovernanceError::NotFound(format!("doctrine version {target}")));
    }
    store.activate_doctrine(target)
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

    use furlong_core::Timestamp;

    use super::active_version;
    use super::bump_version;
    use super::rollback_to_version;
    use crate::store::GovernanceStore;
    use crate::store::MemoryGovernanceStore;
    use crate::types::ChangeType;
    use crate::types::SemVer;

    fn now() -> Timestamp {
        Timestamp::from_unix_millis(1_700_000_000_000)
    }

    #[test]
    fn first_call_seeds_the_baseline() {
        let store = MemoryGovernanceStore::new();
        let version = active_version(&store, now()).expect("active");
        assert_eq!(version, SemVer::new(13, 0, 0));
        assert_eq!(store.count_doctrine_versions().expect("count"), 1);
    }

    #[test]
    fn minor_bump_resets_patch_and_activates() {
        let store = MemoryGovernanceStore::new();
        let next = bump_version(&store, ChangeType::Minor, "new rule", "reviewer", None, now())
            .expect("bump");
        assert_eq!(next, SemVer::new(13, 1, 0));
        let active = store.get_active_doctrine().expect("get").expect("present");
        assert_eq!(active.version, next);
        assert_eq!(active.parent_version, Some(SemVer::new(13, 0, 0)));
        // The previous version is deactivated.
        let seed = store.get_doctrine(SemVer::new(13, 0, 0)).expect("get").expect("present");
        assert!(!seed.active);
    }

    #[test]
    fn exactly_one_active_row_across_bumps() {
        let store = MemoryGovernanceStore::new();
        bump_version(&store, ChangeType::Minor, "a", "r", None, now()).expect("first");
        bump_version(&store, ChangeType::Patch, "b", "r", None, now()).expect("second");
        bump_version(&store, ChangeType::Major, "c", "r", None, now()).expect("third");
        let active: Vec<_> = store
            .list_doctrine_versions(50)
            .expect("list")
            .into_iter()
            .filter(|version| version.active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version, SemVer::new(14, 0, 0));
    }

    #[test]
    fn rollback_reactivates_the_target() {
        let store = MemoryGovernanceStore::new();
        bump_version(&store, ChangeType::Minor, "a", "r", None, now()).expect("bump");
        rollback_to_version(&store, SemVer::new(13, 0, 0)).expect("rollback");
        let active = store.get_active_doctrine().expect("get").expect("present");
        assert_eq!(active.version, SemVer::new(13, 0, 0));
    }

    #[test]
    fn rollback_to_unknown_version_is_rejected() {
        let store = MemoryGovernanceStore::new();
        active_version(&store, now()).expect("seed");
        assert!(rollback_to_version(&store, SemVer::new(9, 9, 9)).is_err());
    }
}
