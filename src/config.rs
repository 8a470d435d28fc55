//! Top-level configuration file.
//!
//! A single TOML document configures supervision, the pipeline, the summary
//! stage and the services:
//!
//! ```toml
//! [supervisor]
//! readiness_timeout_ms = 10000
//! max_restarts = 3
//!
//! [pipeline]
//! per_service_cap = 3
//!
//! [services.github]
//! mode = "real"
//! command = "github-mcp-server"
//! args = ["stdio"]
//! env = { GITHUB_PERSONAL_ACCESS_TOKEN = "${GITHUB_TOKEN}" }
//! ```
//!
//! Every key is optional; durations are integer milliseconds.

use crate::search::services::{DEFAULT_PER_SERVICE_CAP, PipelineSettings, RetryPolicy};
use crate::service::config::ServicesConfig;
use crate::summary::DEFAULT_SUMMARY_TIMEOUT;
use crate::supervisor::services::SupervisorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: Arc<std::io::Error>,
    },

    /// The document is not valid configuration.
    #[error("invalid config: {0}")]
    Parse(Arc<toml::de::Error>),
}

/// `[supervisor]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    /// Bound on waiting for readiness.
    pub readiness_timeout_ms: u64,
    /// Bound on the `initialize` handshake.
    pub handshake_timeout_ms: u64,
    /// Default RPC call timeout.
    pub call_timeout_ms: u64,
    /// Restarts allowed before a crash becomes permanent.
    pub max_restarts: u32,
    /// First restart delay; doubled for each later one.
    pub restart_backoff_ms: u64,
    /// Grace period between the termination signal and a kill.
    pub shutdown_grace_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            call_timeout_ms: 30_000,
            max_restarts: 3,
            restart_backoff_ms: 500,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl SupervisorSection {
    /// Converts the section into supervisor settings.
    #[must_use]
    pub const fn settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            readiness_timeout: Duration::from_millis(self.readiness_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            max_restarts: self.max_restarts,
            restart_backoff: Duration::from_millis(self.restart_backoff_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Hits fetched per service.
    pub per_service_cap: usize,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// First retry delay; doubled for each later one.
    pub backoff_ms: u64,
    /// Bound on a single attempt.
    pub attempt_timeout_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            per_service_cap: DEFAULT_PER_SERVICE_CAP,
            max_retries: 2,
            backoff_ms: 500,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl PipelineSection {
    /// Converts the section into pipeline settings.
    #[must_use]
    pub const fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            per_service_cap: self.per_service_cap,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff_base: Duration::from_millis(self.backoff_ms),
                attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            },
        }
    }
}

/// `[summary]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySection {
    /// Bound on a summarizer call.
    pub timeout_ms: u64,
}

impl Default for SummarySection {
    fn default() -> Self {
        Self {
            timeout_ms: u64::try_from(DEFAULT_SUMMARY_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl SummarySection {
    /// Returns the summarizer timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Supervision timing and restart policy.
    pub supervisor: SupervisorSection,
    /// Pipeline cap and retry policy.
    pub pipeline: PipelineSection,
    /// Summary stage.
    pub summary: SummarySection,
    /// Per-service launch sections.
    pub services: ServicesConfig,
}

impl FinderConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(Arc::new(err)))
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            source: Arc::new(err),
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::config::ResolveOptions;
    use crate::service::domain::{RunMode, ServiceKind};
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = FinderConfig::from_toml_str("").expect("empty config is valid");

        assert_eq!(config.supervisor.settings(), SupervisorSettings::default());
        assert_eq!(config.pipeline.settings(), PipelineSettings::default());
        assert_eq!(config.summary.timeout(), DEFAULT_SUMMARY_TIMEOUT);
        assert!(config.services.is_empty());
    }

    #[test]
    fn sections_override_defaults() {
        let config = FinderConfig::from_toml_str(
            r#"
            [supervisor]
            max_restarts = 5
            restart_backoff_ms = 50

            [pipeline]
            per_service_cap = 2
            attempt_timeout_ms = 250

            [services.gdrive]
            mode = "mock"
            "#,
        )
        .expect("config should parse");

        let supervisor = config.supervisor.settings();
        assert_eq!(supervisor.max_restarts, 5);
        assert_eq!(supervisor.restart_backoff, Duration::from_millis(50));
        assert_eq!(supervisor.readiness_timeout, Duration::from_secs(10));

        let pipeline = config.pipeline.settings();
        assert_eq!(pipeline.per_service_cap, 2);
        assert_eq!(pipeline.retry.attempt_timeout, Duration::from_millis(250));
        assert_eq!(pipeline.retry.max_retries, 2);

        assert!(config.services.section(ServiceKind::Drive).is_some());
    }

    #[test]
    fn load_reads_files_and_resolves_services() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[services.slack]\nmode = \"mock\"").expect("write config");

        let config = FinderConfig::load(file.path()).expect("config should load");
        let resolution = config
            .services
            .resolve(&ResolveOptions::default(), |_| None)
            .expect("services should resolve");

        let [definition] = resolution.definitions.as_slice() else {
            panic!("expected one definition, got {:?}", resolution.definitions);
        };
        assert_eq!(definition.service(), ServiceKind::Slack);
        assert_eq!(definition.mode(), RunMode::Mock);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = FinderConfig::load(&dir.path().join("absent.toml"))
            .expect_err("file does not exist");
        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_values_are_parse_errors() {
        let error = FinderConfig::from_toml_str("[pipeline]\nper_service_cap = \"three\"")
            .expect_err("cap must be a number");
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
