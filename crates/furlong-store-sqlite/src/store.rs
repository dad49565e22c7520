// crates/furlong-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Governance Store
// Description: Durable GovernanceStore backed by SQLite WAL.
// Purpose: Persist episodes, artifacts, proposals, doctrine, and ledger with
// the exact published table layout.
// Dependencies: furlong-core, furlong-governance, rusqlite, serde_json,
// thiserror
// ============================================================================

//! ## Overview
//! One logical writer with per-row upsert semantics is sufficient for the
//! governance workload: all writes are idempotent thanks to stable ids and
//! fingerprints. The connection runs WAL with a busy timeout; proposal
//! dedup rides the unique fingerprint index (the losing racer re-reads and
//! links); doctrine activation flips the single active row inside one
//! transaction; ledger rows are insert-only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use furlong_core::EpisodeId;
use furlong_core::ProposalId;
use furlong_core::Timestamp;
use furlong_governance::ArtifactType;
use furlong_governance::CriticType;
use furlong_governance::DoctrineVersion;
use furlong_governance::Episode;
use furlong_governance::EpisodeArtifact;
use furlong_governance::GovernanceError;
use furlong_governance::GovernanceStore;
use furlong_governance::LedgerAction;
use furlong_governance::LedgerEntry;
use furlong_governance::Proposal;
use furlong_governance::ProposalStatus;
use furlong_governance::SemVer;
use furlong_governance::Severity;
use furlong_governance::StatusUpdate;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version recorded via `user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Table creation statements for the published layout.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS episodes (
    id TEXT PRIMARY KEY,
    decision_time TEXT NOT NULL,
    created_at TEXT NOT NULL,
    context_hash TEXT NOT NULL,
    finalized INTEGER NOT NULL DEFAULT 0,
    finalized_at TEXT
);
CREATE TABLE IF NOT EXISTS episode_artifacts (
    id TEXT PRIMARY KEY,
    episode_id TEXT NOT NULL REFERENCES episodes(id),
    artifact_type TEXT NOT NULL,
    content TEXT NOT NULL,
    checksum TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS patch_proposals (
    id TEXT PRIMARY KEY,
    episode_id TEXT NOT NULL,
    critic_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    finding_type TEXT NOT NULL,
    description TEXT NOT NULL,
    proposed_change TEXT NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    reviewed_at TEXT,
    reviewer_id TEXT,
    review_rationale TEXT,
    doctrine_version_before TEXT,
    doctrine_version_after TEXT
);
CREATE TABLE IF NOT EXISTS proposal_episodes (
    proposal_id TEXT NOT NULL,
    episode_id TEXT NOT NULL,
    PRIMARY KEY (proposal_id, episode_id)
);
CREATE TABLE IF NOT EXISTS doctrine_versions (
    version TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL,
    description TEXT NOT NULL,
    rules_snapshot TEXT NOT NULL,
    parent_version TEXT,
    active INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS governance_ledger (
    id TEXT PRIMARY KEY,
    proposal_id TEXT NOT NULL,
    action TEXT NOT NULL,
    actor TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    rationale TEXT NOT NULL,
    doctrine_version_snapshot TEXT NOT NULL,
    episode_count_at_decision INTEGER NOT NULL,
    metadata TEXT NOT NULL
);
";

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable governance store backed by SQLite.
///
/// # Invariants
/// - Writes are serialized through one connection behind a mutex.
/// - Database contents are treated as untrusted on load.
#[derive(Debug)]
pub struct SqliteGovernanceStore {
    /// Serialized connection.
    conn: Mutex<Connection>,
    /// Database path for diagnostics.
    path: PathBuf,
}

impl SqliteGovernanceStore {
    /// Opens (and bootstraps) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Io`] when the database cannot be opened
    /// or the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GovernanceError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|err| GovernanceError::Io(format!("open {}: {err}", path.display())))?;
        let store = Self {
            conn: Mutex::new(conn),
            path,
        };
        store.bootstrap()?;
        Ok(store)
    }

    /// Opens an in-memory store (tests and dry runs).
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Io`] when the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, GovernanceError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| GovernanceError::Io(format!("open :memory:: {err}")))?;
        let store = Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        };
        store.bootstrap()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies pragmas and creates the schema.
    fn bootstrap(&self) -> Result<(), GovernanceError> {
        let conn = self.lock()?;
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(Self::io_error)?;
        conn.pragma_update(None, "synchronous", "full")
            .map_err(Self::io_error)?;
        conn.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .map_err(Self::io_error)?;
        conn.execute_batch(SCHEMA_SQL).map_err(Self::io_error)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(Self::io_error)?;
        Ok(())
    }

    /// Locks the connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, GovernanceError> {
        self.conn
            .lock()
            .map_err(|_| GovernanceError::Io("sqlite connection lock poisoned".to_string()))
    }

    /// Maps a rusqlite error to the store error taxonomy.
    fn io_error(err: rusqlite::Error) -> GovernanceError {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err
            && failure.code == ErrorCode::ConstraintViolation
        {
            return GovernanceError::Conflict(err.to_string());
        }
        GovernanceError::Io(err.to_string())
    }

    /// Renders a timestamp for storage.
    fn text(timestamp: Timestamp) -> Result<String, GovernanceError> {
        timestamp
            .to_rfc3339()
            .map_err(|err| GovernanceError::Serialization(err.to_string()))
    }

    /// Parses a stored timestamp.
    fn parse_time(raw: &str) -> Result<Timestamp, GovernanceError> {
        Timestamp::parse_rfc3339(raw)
            .map_err(|err| GovernanceError::Serialization(err.to_string()))
    }

    /// Parses a stored JSON column.
    fn parse_json(raw: &str) -> Result<serde_json::Value, GovernanceError> {
        serde_json::from_str(raw)
            .map_err(|err| GovernanceError::Serialization(err.to_string()))
    }

    /// Parses a stored semver column.
    fn parse_semver(raw: &str) -> Result<SemVer, GovernanceError> {
        raw.parse().map_err(GovernanceError::Serialization)
    }

    /// Maps a proposal row.
    fn proposal_from_row(row: &Row<'_>) -> rusqlite::Result<RawProposal> {
        Ok(RawProposal {
            id: row.get(0)?,
            episode_id: row.get(1)?,
            critic_type: row.get(2)?,
            severity: row.get(3)?,
            finding_type: row.get(4)?,
            description: row.get(5)?,
            proposed_change: row.get(6)?,
            fingerprint: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
            reviewed_at: row.get(10)?,
            reviewer_id: row.get(11)?,
            review_rationale: row.get(12)?,
            doctrine_version_before: row.get(13)?,
            doctrine_version_after: row.get(14)?,
        })
    }
}

/// Proposal row as stored, before typed decoding.
struct RawProposal {
    /// `id` column.
    id: String,
    /// `episode_id` column.
    episode_id: String,
    /// `critic_type` column.
    critic_type: String,
    /// `severity` column.
    severity: String,
    /// `finding_type` column.
    finding_type: String,
    /// `description` column.
    description: String,
    /// `proposed_change` column (JSON text).
    proposed_change: String,
    /// `fingerprint` column.
    fingerprint: String,
    /// `status` column.
    status: String,
    /// `created_at` column.
    created_at: String,
    /// `reviewed_at` column.
    reviewed_at: Option<String>,
    /// `reviewer_id` column.
    reviewer_id: Option<String>,
    /// `review_rationale` column.
    review_rationale: Option<String>,
    /// `doctrine_version_before` column.
    doctrine_version_before: Option<String>,
    /// `doctrine_version_after` column.
    doctrine_version_after: Option<String>,
}

impl RawProposal {
    /// Decodes the raw row into the typed record.
    fn decode(self) -> Result<Proposal, GovernanceError> {
        let critic_type = match self.critic_type.as_str() {
            "LEAKAGE" => CriticType::Leakage,
            "BIAS" => CriticType::Bias,
            "FEATURE" => CriticType::Feature,
            "DECISION" => CriticType::Decision,
            other => {
                return Err(GovernanceError::Serialization(format!(
                    "unknown critic type: {other}"
                )));
            }
        };
        let severity = match self.severity.as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            other => {
                return Err(GovernanceError::Serialization(format!(
                    "unknown severity: {other}"
                )));
            }
        };
        let status: ProposalStatus =
            self.status.parse().map_err(GovernanceError::Serialization)?;
        Ok(Proposal {
            id: ProposalId::new(self.id),
            episode_id: EpisodeId::new(self.episode_id),
            critic_type,
            severity,
            finding_type: self.finding_type,
            description: self.description,
            proposed_change: SqliteGovernanceStore::parse_json(&self.proposed_change)?,
            fingerprint: self.fingerprint,
            status,
            created_at: SqliteGovernanceStore::parse_time(&self.created_at)?,
            reviewed_at: self
                .reviewed_at
                .as_deref()
                .map(SqliteGovernanceStore::parse_time)
                .transpose()?,
            reviewer_id: self.reviewer_id,
            review_rationale: self.review_rationale,
            doctrine_version_before: self
                .doctrine_version_before
                .as_deref()
                .map(SqliteGovernanceStore::parse_semver)
                .transpose()?,
            doctrine_version_after: self
                .doctrine_version_after
                .as_deref()
                .map(SqliteGovernanceStore::parse_semver)
                .transpose()?,
        })
    }
}

/// Columns selected for every proposal read.
const PROPOSAL_COLUMNS: &str = "id, episode_id, critic_type, severity, finding_type, \
                                description, proposed_change, fingerprint, status, created_at, \
                                reviewed_at, reviewer_id, review_rationale, \
                                doctrine_version_before, doctrine_version_after";

// ============================================================================
// SECTION: GovernanceStore Implementation
// ============================================================================

impl GovernanceStore for SqliteGovernanceStore {
    fn insert_episode_if_absent(&self, episode: &Episode) -> Result<bool, GovernanceError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO episodes (id, decision_time, created_at, context_hash, \
                 finalized, finalized_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    episode.id.as_str(),
                    Self::text(episode.decision_time)?,
                    Self::text(episode.created_at)?,
                    episode.context_hash,
                    i64::from(episode.finalized),
                    episode.finalized_at.map(Self::text).transpose()?,
                ],
            )
            .map_err(Self::io_error)?;
        Ok(changed > 0)
    }

    fn get_episode(&self, id: &EpisodeId) -> Result<Option<Episode>, GovernanceError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, decision_time, created_at, context_hash, finalized, finalized_at \
                 FROM episodes WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(Self::io_error)?;
        let Some((id, decision_time, created_at, context_hash, finalized, finalized_at)) = row
        else {
            return Ok(None);
        };
        Ok(Some(Episode {
            id: EpisodeId::new(id),
            decision_time: Self::parse_time(&decision_time)?,
            created_at: Self::parse_time(&created_at)?,
            context_hash,
            finalized: finalized != 0,
            finalized_at: finalized_at.as_deref().map(Self::parse_time).transpose()?,
        }))
    }

    fn finalize_episode(
        &self,
        id: &EpisodeId,
        finalized_at: Timestamp,
    ) -> Result<(), GovernanceError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE episodes SET finalized = 1, finalized_at = ?2 WHERE id = ?1",
                params![id.as_str(), Self::text(finalized_at)?],
            )
            .map_err(Self::io_error)?;
        if changed == 0 {
            return Err(GovernanceError::NotFound(format!("episode {id}")));
        }
        Ok(())
    }

    fn count_finalized_episodes(&self) -> Result<u64, GovernanceError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM episodes WHERE finalized = 1", [], |row| {
                row.get(0)
            })
            .map_err(Self::io_error)?;
        Ok(count.max(0) as u64)
    }

    fn upsert_artifact(&self, artifact: &EpisodeArtifact) -> Result<(), GovernanceError> {
        let content = serde_json::to_string(&artifact.content)
            .map_err(|err| GovernanceError::Serialization(err.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO episode_artifacts (id, episode_id, artifact_type, content, \
             checksum, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                artifact.id,
                artifact.episode_id.as_str(),
                artifact.artifact_type.as_str(),
                content,
                artifact.checksum,
                Self::text(artifact.created_at)?,
            ],
        )
        .map_err(Self::io_error)?;
        Ok(())
    }

    fn get_artifact(
        &self,
        episode_id: &EpisodeId,
        artifact_type: ArtifactType,
    ) -> Result<Option<EpisodeArtifact>, GovernanceError> {
        let id = format!("{episode_id}_{}", artifact_type.as_str());
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, episode_id, content, checksum, created_at FROM episode_artifacts \
                 WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(Self::io_error)?;
        let Some((id, episode, content, checksum, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(EpisodeArtifact {
            id,
            episode_id: EpisodeId::new(episode),
            artifact_type,
            content: Self::parse_json(&content)?,
            checksum,
            created_at: Self::parse_time(&created_at)?,
        }))
    }

    fn find_proposal_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<Proposal>, GovernanceError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {PROPOSAL_COLUMNS} FROM patch_proposals WHERE fingerprint = ?1"),
                params![fingerprint],
                Self::proposal_from_row,
            )
            .optional()
            .map_err(Self::io_error)?;
        raw.map(RawProposal::decode).transpose()
    }

    fn insert_proposal(&self, proposal: &Proposal) -> Result<(), GovernanceError> {
        let change = serde_json::to_string(&proposal.proposed_change)
            .map_err(|err| GovernanceError::Serialization(err.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO patch_proposals (id, episode_id, critic_type, severity, finding_type, \
             description, proposed_change, fingerprint, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                proposal.id.as_str(),
                proposal.episode_id.as_str(),
                proposal.critic_type.as_str(),
                proposal.severity.as_str(),
                proposal.finding_type,
                proposal.description,
                change,
                proposal.fingerprint,
                proposal.status.as_str(),
                Self::text(proposal.created_at)?,
            ],
        )
        .map_err(Self::io_error)?;
        Ok(())
    }

    fn link_proposal_episode(
        &self,
        proposal_id: &ProposalId,
        episode_id: &EpisodeId,
    ) -> Result<(), GovernanceError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO proposal_episodes (proposal_id, episode_id) VALUES (?1, ?2)",
            params![proposal_id.as_str(), episode_id.as_str()],
        )
        .map_err(Self::io_error)?;
        Ok(())
    }

    fn episodes_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<EpisodeId>, GovernanceError> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(
                "SELECT episode_id FROM proposal_episodes WHERE proposal_id = ?1 \
                 ORDER BY episode_id",
            )
            .map_err(Self::io_error)?;
        let rows = statement
            .query_map(params![proposal_id.as_str()], |row| row.get::<_, String>(0))
            .map_err(Self::io_error)?;
        let mut episodes = Vec::new();
        for row in rows {
            episodes.push(EpisodeId::new(row.map_err(Self::io_error)?));
        }
        Ok(episodes)
    }

    fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, GovernanceError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {PROPOSAL_COLUMNS} FROM patch_proposals WHERE id = ?1"),
                params![id.as_str()],
                Self::proposal_from_row,
            )
            .optional()
            .map_err(Self::io_error)?;
        raw.map(RawProposal::decode).transpose()
    }

    fn list_proposals(
        &self,
        status: Option<ProposalStatus>,
        critic_type: Option<CriticType>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Proposal>, GovernanceError> {
        let mut sql =
            format!("SELECT {PROPOSAL_COLUMNS} FROM patch_proposals WHERE 1 = 1");
        let mut bound: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            bound.push(rusqlite::types::Value::Text(status.as_str().to_string()));
        }
        if let Some(critic) = critic_type {
            sql.push_str(" AND critic_type = ?");
            bound.push(rusqlite::types::Value::Text(critic.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
        bound.push(rusqlite::types::Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        bound.push(rusqlite::types::Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let conn = self.lock()?;
        let mut statement = conn.prepare(&sql).map_err(Self::io_error)?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(bound), Self::proposal_from_row)
            .map_err(Self::io_error)?;
        let mut proposals = Vec::new();
        for row in rows {
            proposals.push(row.map_err(Self::io_error)?.decode()?);
        }
        Ok(proposals)
    }

    fn update_proposal_status(
        &self,
        id: &ProposalId,
        expected: ProposalStatus,
        update: &StatusUpdate,
    ) -> Result<Proposal, GovernanceError> {
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE patch_proposals SET status = ?3, \
                 reviewed_at = COALESCE(?4, reviewed_at), \
                 reviewer_id = COALESCE(?5, reviewer_id), \
                 review_rationale = COALESCE(?6, review_rationale), \
                 doctrine_version_before = COALESCE(?7, doctrine_version_before), \
                 doctrine_version_after = COALESCE(?8, doctrine_version_after) \
                 WHERE id = ?1 AND status = ?2",
                params![
                    id.as_str(),
                    expected.as_str(),
                    update.status.as_str(),
                    update.reviewed_at.map(Self::text).transpose()?,
                    update.reviewer_id,
                    update.review_rationale,
                    update.doctrine_version_before.map(|version| version.to_string()),
                    update.doctrine_version_after.map(|version| version.to_string()),
                ],
            )
            .map_err(Self::io_error)?
        };
        if changed == 0 {
            // Distinguish a missing row from a wrong-state transition.
            return match self.get_proposal(id)? {
                None => Err(GovernanceError::NotFound(format!("proposal {id}"))),
                Some(current) => Err(GovernanceError::InvalidState {
                    proposal_id: id.clone(),
                    current: current.status.as_str().to_string(),
                    expected: expected.as_str().to_string(),
                }),
            };
        }
        self.get_proposal(id)?
            .ok_or_else(|| GovernanceError::NotFound(format!("proposal {id}")))
    }

    fn transition_drafts_to_pending(
        &self,
        episode_id: &EpisodeId,
    ) -> Result<u64, GovernanceError> {
        let conn = self.lock()?;
        // One statement covering direct anchors and junction links; the
        // execute return value is the explicit per-batch row count.
        let moved = conn
            .execute(
                "UPDATE patch_proposals SET status = 'PENDING' \
                 WHERE status = 'DRAFT' AND (episode_id = ?1 OR id IN ( \
                     SELECT proposal_id FROM proposal_episodes WHERE episode_id = ?1))",
                params![episode_id.as_str()],
            )
            .map_err(Self::io_error)?;
        Ok(moved as u64)
    }

    fn count_proposals_by_status(
        &self,
        status: ProposalStatus,
    ) -> Result<u64, GovernanceError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM patch_proposals WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .map_err(Self::io_error)?;
        Ok(count.max(0) as u64)
    }

    fn get_active_doctrine(&self) -> Result<Option<DoctrineVersion>, GovernanceError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT version, created_at, created_by, description, rules_snapshot, \
                 parent_version, active FROM doctrine_versions WHERE active = 1",
                [],
                doctrine_from_row,
            )
            .optional()
            .map_err(Self::io_error)?;
        raw.map(decode_doctrine).transpose()
    }

    fn get_doctrine(&self, version: SemVer) -> Result<Option<DoctrineVersion>, GovernanceError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT version, created_at, created_by, description, rules_snapshot, \
                 parent_version, active FROM doctrine_versions WHERE version = ?1",
                params![version.to_string()],
                doctrine_from_row,
            )
            .optional()
            .map_err(Self::io_error)?;
        raw.map(decode_doctrine).transpose()
    }

    fn insert_doctrine(&self, version: &DoctrineVersion) -> Result<(), GovernanceError> {
        let snapshot = serde_json::to_string(&version.rules_snapshot)
            .map_err(|err| GovernanceError::Serialization(err.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO doctrine_versions (version, created_at, created_by, description, \
             rules_snapshot, parent_version, active) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                version.version.to_string(),
                Self::text(version.created_at)?,
                version.created_by,
                version.description,
                snapshot,
                version.parent_version.map(|parent| parent.to_string()),
                i64::from(version.active),
            ],
        )
        .map_err(Self::io_error)?;
        Ok(())
    }

    fn activate_doctrine(&self, version: SemVer) -> Result<(), GovernanceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(Self::io_error)?;
        let exists: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM doctrine_versions WHERE version = ?1",
                params![version.to_string()],
                |row| row.get(0),
            )
            .map_err(Self::io_error)?;
        if exists == 0 {
            return Err(GovernanceError::NotFound(format!("doctrine version {version}")));
        }
        tx.execute("UPDATE doctrine_versions SET active = 0 WHERE active = 1", [])
            .map_err(Self::io_error)?;
        tx.execute(
            "UPDATE doctrine_versions SET active = 1 WHERE version = ?1",
            params![version.to_string()],
        )
        .map_err(Self::io_error)?;
        tx.commit().map_err(Self::io_error)?;
        Ok(())
    }

    fn list_doctrine_versions(
        &self,
        limit: usize,
    ) -> Result<Vec<DoctrineVersion>, GovernanceError> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(
                "SELECT version, created_at, created_by, description, rules_snapshot, \
                 parent_version, active FROM doctrine_versions \
                 ORDER BY created_at DESC, version DESC LIMIT ?1",
            )
            .map_err(Self::io_error)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = statement
            .query_map(params![limit], doctrine_from_row)
            .map_err(Self::io_error)?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(decode_doctrine(row.map_err(Self::io_error)?)?);
        }
        Ok(versions)
    }

    fn count_doctrine_versions(&self) -> Result<u64, GovernanceError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM doctrine_versions", [], |row| row.get(0))
            .map_err(Self::io_error)?;
        Ok(count.max(0) as u64)
    }

    fn append_ledger(&self, entry: &LedgerEntry) -> Result<(), GovernanceError> {
        let metadata = serde_json::to_string(&entry.metadata)
            .map_err(|err| GovernanceError::Serialization(err.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO governance_ledger (id, proposal_id, action, actor, timestamp, \
             rationale, doctrine_version_snapshot, episode_count_at_decision, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.proposal_id.as_str(),
                entry.action.as_str(),
                entry.actor,
                Self::text(entry.timestamp)?,
                entry.rationale,
                entry.doctrine_version_snapshot.to_string(),
                i64::try_from(entry.episode_count_at_decision).unwrap_or(i64::MAX),
                metadata,
            ],
        )
        .map_err(Self::io_error)?;
        Ok(())
    }

    fn ledger_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<LedgerEntry>, GovernanceError> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(
                "SELECT id, proposal_id, action, actor, timestamp, rationale, \
                 doctrine_version_snapshot, episode_count_at_decision, metadata \
                 FROM governance_ledger WHERE proposal_id = ?1 \
                 ORDER BY timestamp DESC, id DESC",
            )
            .map_err(Self::io_error)?;
        let rows = statement
            .query_map(params![proposal_id.as_str()], ledger_from_row)
            .map_err(Self::io_error)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(decode_ledger(row.map_err(Self::io_error)?)?);
        }
        Ok(entries)
    }

    fn recent_ledger(&self, limit: usize) -> Result<Vec<LedgerEntry>, GovernanceError> {
        let conn = self.lock()?;
        let mut statement = conn
            .prepare(
                "SELECT id, proposal_id, action, actor, timestamp, rationale, \
                 doctrine_version_snapshot, episode_count_at_decision, metadata \
                 FROM governance_ledger ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )
            .map_err(Self::io_error)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = statement
            .query_map(params![limit], ledger_from_row)
            .map_err(Self::io_error)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(decode_ledger(row.map_err(Self::io_error)?)?);
        }
        Ok(entries)
    }

    fn count_ledger_by_action(&self, action: LedgerAction) -> Result<u64, GovernanceError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM governance_ledger WHERE action = ?1",
                params![action.as_str()],
                |row| row.get(0),
            )
            .map_err(Self::io_error)?;
        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// SECTION: Row Decoders
// ============================================================================

/// Doctrine row as stored, before typed decoding.
type RawDoctrine = (String, String, String, String, String, Option<String>, i64);

/// Maps a doctrine row.
fn doctrine_from_row(row: &Row<'_>) -> rusqlite::Result<RawDoctrine> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

/// Decodes a doctrine row into the typed record.
fn decode_doctrine(raw: RawDoctrine) -> Result<DoctrineVersion, GovernanceError> {
    let (version, created_at, created_by, description, snapshot, parent, active) = raw;
    Ok(DoctrineVersion {
        version: SqliteGovernanceStore::parse_semver(&version)?,
        created_at: SqliteGovernanceStore::parse_time(&created_at)?,
        created_by,
        description,
        rules_snapshot: SqliteGovernanceStore::parse_json(&snapshot)?,
        parent_version: parent
            .as_deref()
            .map(SqliteGovernanceStore::parse_semver)
            .transpose()?,
        active: active != 0,
    })
}

/// Ledger row as stored, before typed decoding.
type RawLedger = (String, String, String, String, String, String, String, i64, String);

/// Maps a ledger row.
fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<RawLedger> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

/// Decodes a ledger row into the typed record.
fn decode_ledger(raw: RawLedger) -> Result<LedgerEntry, GovernanceError> {
    let (id, proposal_id, action, actor, timestamp, rationale, snapshot, episodes, metadata) = raw;
    let action = match action.as_str() {
        "ACCEPT" => LedgerAction::Accept,
        "REJECT" => LedgerAction::Reject,
        "ROLLBACK" => LedgerAction::Rollback,
        other => {
            return Err(GovernanceError::Serialization(format!(
                "unknown ledger action: {other}"
            )));
        }
    };
    Ok(LedgerEntry {
        id,
        proposal_id: ProposalId::new(proposal_id),
        action,
        actor,
        timestamp: SqliteGovernanceStore::parse_time(&timestamp)?,
        rationale,
        doctrine_version_snapshot: SqliteGovernanceStore::parse_semver(&snapshot)?,
        episode_count_at_decision: episodes.max(0) as u64,
        metadata: SqliteGovernanceStore::parse_json(&metadata)?,
    })
}
