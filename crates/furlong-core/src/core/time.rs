// crates/furlong-core/src/core/time.rs
// ============================================================================
// Module: Furlong Time Model
// Description: Canonical timestamp representation for decision and audit times.
// Purpose: Provide deterministic, replayable time values across Furlong records.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Furlong uses explicit time values embedded in contexts and records to keep
//! replay deterministic. The core engine never reads wall-clock time directly;
//! hosts must supply timestamps. The wire form is RFC 3339 with an explicit
//! UTC offset so serialized records hash identically across platforms.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as DeError;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Shadow-mode decision offset before the advertised off time.
pub const SHADOW_DECISION_OFFSET_MINUTES: i64 = 10;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp parsing and formatting errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TimeError {
    /// Input string is not valid RFC 3339.
    #[error("invalid rfc3339 timestamp: {0}")]
    Parse(String),
    /// Value cannot be represented as unix milliseconds.
    #[error("timestamp out of representable range: {0}")]
    Range(String),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in Furlong contexts, records, and audit blobs.
///
/// # Invariants
/// - Stored as unix epoch milliseconds (UTC); sub-millisecond precision is
///   dropped at construction.
/// - Values are explicitly provided by callers; the core never reads
///   wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Parses an RFC 3339 timestamp string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the input is not valid RFC 3339, or
    /// [`TimeError::Range`] when the instant cannot be represented.
    pub fn parse_rfc3339(input: &str) -> Result<Self, TimeError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339)
            .map_err(|err| TimeError::Parse(format!("{input}: {err}")))?;
        let nanos = parsed.unix_timestamp_nanos();
        let millis = nanos / 1_000_000;
        let millis =
            i64::try_from(millis).map_err(|_| TimeError::Range(input.to_string()))?;
        Ok(Self(millis))
    }

    /// Renders the timestamp as RFC 3339 with an explicit UTC offset.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Range`] when the instant cannot be represented,
    /// which only occurs for values far outside the supported calendar range.
    pub fn to_rfc3339(self) -> Result<String, TimeError> {
        let nanos = i128::from(self.0) * 1_000_000;
        let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|err| TimeError::Range(format!("{}: {err}", self.0)))?;
        datetime
            .format(&Rfc3339)
            .map_err(|err| TimeError::Range(format!("{}: {err}", self.0)))
    }

    /// Returns the UTC calendar date of this instant as `YYYY-MM-DD`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Range`] when the instant cannot be represented.
    pub fn utc_date(self) -> Result<String, TimeError> {
        let nanos = i128::from(self.0) * 1_000_000;
        let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|err| TimeError::Range(format!("{}: {err}", self.0)))?;
        let date = datetime.date();
        Ok(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        ))
    }

    /// Returns a timestamp shifted by whole minutes (negative shifts earlier).
    #[must_use]
    pub const fn plus_minutes(self, minutes: i64) -> Self {
        Self(self.0 + minutes * 60_000)
    }

    /// Derives the shadow-mode decision time from an advertised off time.
    ///
    /// Decision time is the knowledge cutoff used everywhere downstream; in
    /// shadow mode it is the off time minus
    /// [`SHADOW_DECISION_OFFSET_MINUTES`].
    #[must_use]
    pub const fn shadow_decision_time(off_time: Self) -> Self {
        off_time.plus_minutes(-SHADOW_DECISION_OFFSET_MINUTES)
    }

    /// Returns the signed difference `self - other` as a [`Duration`].
    #[must_use]
    pub fn since(self, other: Self) -> Duration {
        Duration::milliseconds(self.0 - other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => write!(f, "unix_millis:{}", self.0),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rendered = self.to_rfc3339().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&rendered)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&raw).map_err(DeError::custom)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
