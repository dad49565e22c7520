// crates/furlong-config/src/lib.rs
// ============================================================================
// Module: Furlong Config
// Description: Canonical application configuration with strict validation.
// Purpose: One fully enumerated option set; unknown keys are rejected.
// Dependencies: furlong-core, serde, serde_json, thiserror, toml
// ============================================================================

//! ## Overview
//! The application configuration layers deployment concerns on top of the
//! engine thresholds: where engine runs are written, where the governance
//! database lives, the leakage schema manifest, and the review-API bind
//! address. Everything is declared; deserialization rejects unknown keys,
//! and validation runs before any component accepts the config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use furlong_core::EngineConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Configuration file could not be read.
    #[error("config read failed: {path}: {message}")]
    Read {
        /// Offending path.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Configuration file could not be parsed.
    #[error("config parse failed: {path}: {message}")]
    Parse {
        /// Offending path.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// A configuration value is invalid.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Server Options
// ============================================================================

/// Review-API server options.
///
/// # Invariants
/// - `bind` is a socket address string; validation checks non-emptiness
///   only, leaving resolution to the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Returns the default bind address.
fn default_bind() -> String {
    "127.0.0.1:8090".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ============================================================================
// SECTION: Application Config
// ============================================================================

/// Full application configuration.
///
/// # Invariants
/// - Unknown keys are rejected at deserialization time.
/// - `validate` must pass before components accept the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Engine thresholds and caps.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Directory for engine-run JSON records.
    #[serde(default = "default_engine_run_dir")]
    pub engine_run_dir: PathBuf,
    /// Path to the governance SQLite database.
    #[serde(default = "default_governance_db")]
    pub governance_db: PathBuf,
    /// Optional leakage schema manifest path (JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leakage_manifest: Option<PathBuf>,
    /// Review-API server options.
    #[serde(default)]
    pub api: ApiConfig,
}

/// Returns the default engine-run directory.
fn default_engine_run_dir() -> PathBuf {
    PathBuf::from("data/engine_runs")
}

/// Returns the default governance database path.
fn default_governance_db() -> PathBuf {
    PathBuf::from("data/governance.db")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            engine_run_dir: default_engine_run_dir(),
            governance_db: default_governance_db(),
            leakage_manifest: None,
            api: ApiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError`] when the file cannot be read or parsed,
    /// or when validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let raw = fs::read_to_string(path).map_err(|err| ConfigFileError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|err| ConfigFileError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the leakage schema manifest, when one is configured.
    ///
    /// The manifest is read once at startup and merged with the built-in
    /// blocklist by the firewall.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError`] when the configured manifest cannot be
    /// read or parsed.
    pub fn load_leakage_manifest(
        &self,
    ) -> Result<Option<furlong_core::runtime::LeakageManifest>, ConfigFileError> {
        let Some(path) = self.leakage_manifest.as_ref() else {
            return Ok(None);
        };
        let raw = fs::read_to_string(path).map_err(|err| ConfigFileError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        furlong_core::runtime::LeakageManifest::from_json(&raw)
            .map(Some)
            .map_err(|message| ConfigFileError::Parse {
                path: path.display().to_string(),
                message,
            })
    }

    /// Validates every option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Invalid`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        self.engine
            .validate()
            .map_err(|err| ConfigFileError::Invalid(err.to_string()))?;
        if self.engine_run_dir.as_os_str().is_empty() {
            return Err(ConfigFileError::Invalid(
                "engine_run_dir must not be empty".to_string(),
            ));
        }
        if self.governance_db.as_os_str().is_empty() {
            return Err(ConfigFileError::Invalid(
                "governance_db must not be empty".to_string(),
            ));
        }
        if self.api.bind.is_empty() {
            return Err(ConfigFileError::Invalid("api.bind must not be empty".to_string()));
        }
        Ok(())
    }
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

    use std::io::Write;

    use super::AppConfig;

    #[test]
    fn defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn toml_round_trip_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            r#"
engine_run_dir = "/var/furlong/runs"

[engine]
chaos_threshold = 0.55
manipulation_threshold = 0.65

[api]
bind = "0.0.0.0:9001"
"#
        )
        .expect("write");
        let config = AppConfig::load(file.path()).expect("load");
        assert!((config.engine.chaos_threshold - 0.55).abs() < f64::EPSILON);
        assert_eq!(config.api.bind, "0.0.0.0:9001");
        assert_eq!(config.engine_run_dir.to_str(), Some("/var/furlong/runs"));
        // Untouched options keep their defaults.
        assert_eq!(config.engine.stage_timeout_ms, 5_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "mystery_option = true").expect("write");
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn unknown_engine_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[engine]\nsecret_knob = 1.0").expect("write");
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn out_of_range_engine_threshold_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[engine]\nchaos_threshold = 7.5").expect("write");
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = AppConfig::load(std::path::Path::new("/nonexistent/furlong.toml")).unwrap_err();
        assert!(matches!(err, super::ConfigFileError::Read { .. }));
    }

    #[test]
    fn leakage_manifest_loads_and_merges() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, r#"{{"blocked_fields": ["tote_return"]}}"#).expect("write");
        let config = AppConfig {
            leakage_manifest: Some(file.path().to_path_buf()),
            ..AppConfig::default()
        };
        let manifest = config.load_leakage_manifest().expect("load").expect("present");
        assert_eq!(manifest.blocked_fields, vec!["tote_return".to_string()]);
    }

    #[test]
    fn absent_leakage_manifest_is_none() {
        let manifest = AppConfig::default().load_leakage_manifest().expect("load");
        assert!(manifest.is_none());
    }
}
