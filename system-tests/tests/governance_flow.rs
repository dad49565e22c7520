// system-tests/tests/governance_flow.rs
// ============================================================================
// Module: Governance Flow Tests
// Description: Shadow episodes through dedup, finalization, and review.
// Purpose: Pin scenarios S5/S6 and properties P10 through P13.
// Dependencies: furlong-core, furlong-governance, furlong-store-sqlite,
// system-tests
// ============================================================================

//! Full governance loop over the durable store: two episodes deduplicate
//! an identical leakage finding, finalization moves drafts to pending, a
//! review accept bumps doctrine and writes exactly one ledger row.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use furlong_core::EngineConfig;
use furlong_core::RaceId;
use furlong_core::RaceOutcome;
use furlong_core::Timestamp;
use furlong_core::runtime::InMemoryEngineRunStore;
use furlong_core::runtime::Pipeline;
use furlong_governance::CriticType;
use furlong_governance::GovernanceStore;
use furlong_governance::ProposalStatus;
use furlong_governance::SemVer;
use furlong_governance::ShadowRunner;
use furlong_governance::accept_proposal;
use furlong_governance::get_proposal;
use furlong_governance::list_proposals;
use furlong_governance::reject_proposal;
use furlong_store_sqlite::SqliteGovernanceStore;
use system_tests::market_ctx;
use system_tests::race_ctx;
use system_tests::runner;

/// Builds a shadow runner over a shared durable store.
fn shadow(store: Arc<SqliteGovernanceStore>) -> ShadowRunner {
    let pipeline =
        Pipeline::new(EngineConfig::default(), Arc::new(InMemoryEngineRunStore::new()))
            .expect("pipeline");
    ShadowRunner::new(store, pipeline)
}

/// Runs one shadow race and returns its episode id.
fn run_episode(runner_instance: &ShadowRunner, race: &str) -> furlong_core::EpisodeId {
    let race_id = RaceId::new(race);
    let card = [("r1", 1.8), ("r2", 4.0), ("r3", 8.0), ("r4", 15.0)];
    let runners = card.iter().map(|(id, odds)| runner(id, *odds)).collect();
    let off_time = system_tests::decision_time().plus_minutes(10);
    let (episode_id, _) = runner_instance
        .run_race(
            &race_id,
            off_time,
            race_ctx(race, card.len(), 0.75, 0.70),
            market_ctx(race, &card),
            runners,
            off_time.plus_minutes(-9),
        )
        .expect("shadow run");
    episode_id
}

#[test]
fn s5_identical_findings_across_episodes_share_one_proposal_row() {
    let store = Arc::new(SqliteGovernanceStore::open_in_memory().expect("open"));
    let runner_instance = shadow(store.clone());

    let e1 = run_episode(&runner_instance, "E1_RACE");
    let e2 = run_episode(&runner_instance, "E2_RACE");
    assert_ne!(e1, e2);

    // Both episodes emit the identical FUTURE_MARKET_LEAKAGE finding; the
    // fingerprint collapses them onto one row with two junction links.
    let leakage = list_proposals(store.as_ref(), None, Some(CriticType::Leakage), 10, 0)
        .expect("list");
    assert_eq!(leakage.len(), 1);
    assert_eq!(leakage[0].finding_type, "FUTURE_MARKET_LEAKAGE");

    let episodes = store.episodes_for_proposal(&leakage[0].id).expect("episodes");
    assert_eq!(episodes.len(), 2);
    assert!(episodes.contains(&e1));
    assert!(episodes.contains(&e2));
}

#[test]
fn s6_accept_bumps_doctrine_minor_with_single_ledger_row() {
    let store = Arc::new(SqliteGovernanceStore::open_in_memory().expect("open"));
    let runner_instance = shadow(store.clone());
    let episode_id = run_episode(&runner_instance, "E1_RACE");

    // Finalize: outcome artifact, finalized flag, drafts to pending.
    let outcome = RaceOutcome {
        race_id: RaceId::new("E1_RACE"),
        winner_id: Some(furlong_core::RunnerId::new("r1")),
        positions: BTreeMap::new(),
        verified: true,
        starting_prices: None,
    };
    let moved = runner_instance
        .finalize_race(&episode_id, &outcome, system_tests::decision_time().plus_minutes(40))
        .expect("finalize");
    assert!(moved > 0);
    assert_eq!(
        store.count_proposals_by_status(ProposalStatus::Draft).expect("count"),
        0
    );

    // Accept the leakage proposal: 13.0.0 -> 13.1.0 with one ACCEPT row.
    let leakage = list_proposals(
        store.as_ref(),
        Some(ProposalStatus::Pending),
        Some(CriticType::Leakage),
        10,
        0,
    )
    .expect("list");
    let now = Timestamp::from_unix_millis(1_773_502_000_000);
    let accept = accept_proposal(
        store.as_ref(),
        &leakage[0].id,
        "reviewer",
        "finding reproduced in shadow",
        None,
        now,
    )
    .expect("accept");
    assert_eq!(accept.previous_version, SemVer::new(13, 0, 0));
    assert_eq!(accept.doctrine_version, SemVer::new(13, 1, 0));

    let active = store.get_active_doctrine().expect("get").expect("present");
    assert_eq!(active.version, SemVer::new(13, 1, 0));
    let seed = store
        .get_doctrine(SemVer::new(13, 0, 0))
        .expect("get")
        .expect("present");
    assert!(!seed.active);

    let enriched = get_proposal(store.as_ref(), &leakage[0].id).expect("get").expect("present");
    assert_eq!(enriched.proposal.status, ProposalStatus::Accepted);
    assert_eq!(enriched.proposal.doctrine_version_after, Some(SemVer::new(13, 1, 0)));
    assert_eq!(enriched.ledger_history.len(), 1);
    assert_eq!(enriched.ledger_history[0].action.as_str(), "ACCEPT");
    assert_eq!(enriched.ledger_history[0].episode_count_at_decision, 1);
}

#[test]
fn p11_rejected_proposals_never_become_accepted() {
    let store = Arc::new(SqliteGovernanceStore::open_in_memory().expect("open"));
    let runner_instance = shadow(store.clone());
    let episode_id = run_episode(&runner_instance, "E1_RACE");
    let outcome = RaceOutcome {
        race_id: RaceId::new("E1_RACE"),
        winner_id: Some(furlong_core::RunnerId::new("r1")),
        positions: BTreeMap::new(),
        verified: true,
        starting_prices: None,
    };
    runner_instance
        .finalize_race(&episode_id, &outcome, system_tests::decision_time().plus_minutes(40))
        .expect("finalize");

    let pending = list_proposals(store.as_ref(), Some(ProposalStatus::Pending), None, 10, 0)
        .expect("list");
    let now = Timestamp::from_unix_millis(1_773_502_000_000);
    reject_proposal(store.as_ref(), &pending[0].id, "reviewer", "not reproducible", None, now)
        .expect("reject");

    let err = accept_proposal(
        store.as_ref(),
        &pending[0].id,
        "reviewer",
        "second thoughts",
        None,
        now.plus_minutes(1),
    )
    .unwrap_err();
    assert!(err.to_string().contains("REJECTED"));
}

#[test]
fn p12_ledger_rows_accumulate_append_only() {
    let store = Arc::new(SqliteGovernanceStore::open_in_memory().expect("open"));
    let runner_instance = shadow(store.clone());
    let episode_id = run_episode(&runner_instance, "E1_RACE");
    let outcome = RaceOutcome {
        race_id: RaceId::new("E1_RACE"),
        winner_id: Some(furlong_core::RunnerId::new("r1")),
        positions: BTreeMap::new(),
        verified: true,
        starting_prices: None,
    };
    runner_instance
        .finalize_race(&episode_id, &outcome, system_tests::decision_time().plus_minutes(40))
        .expect("finalize");

    let pending = list_proposals(store.as_ref(), Some(ProposalStatus::Pending), None, 10, 0)
        .expect("list");
    let now = Timestamp::from_unix_millis(1_773_502_000_000);
    let before = store.recent_ledger(100).expect("before").len();
    accept_proposal(store.as_ref(), &pending[0].id, "reviewer", "sound", None, now)
        .expect("accept");
    let after_accept = store.recent_ledger(100).expect("after accept");
    assert_eq!(after_accept.len(), before + 1);

    furlong_governance::rollback_proposal(
        store.as_ref(),
        &pending[0].id,
        "reviewer",
        "regressed",
        None,
        now.plus_minutes(5),
    )
    .expect("rollback");
    let after_rollback = store.recent_ledger(100).expect("after rollback");
    assert_eq!(after_rollback.len(), before + 2);
    // Earlier entries are untouched.
    assert!(after_rollback.iter().any(|entry| entry.id == after_accept[0].id));
}

#[test]
fn p13_exactly_one_active_doctrine_version() {
    let store = Arc::new(SqliteGovernanceStore::open_in_memory().expect("open"));
    let now = Timestamp::from_unix_millis(1_773_502_000_000);
    furlong_governance::bump_version(
        store.as_ref(),
        furlong_governance::ChangeType::Minor,
        "rule a",
        "reviewer",
        None,
        now,
    )
    .expect("first bump");
    furlong_governance::bump_version(
        store.as_ref(),
        furlong_governance::ChangeType::Patch,
        "rule b",
        "reviewer",
        None,
        now.plus_minutes(1),
    )
    .expect("second bump");

    let versions = store.list_doctrine_versions(100).expect("list");
    assert_eq!(versions.iter().filter(|version| version.active).count(), 1);
}
