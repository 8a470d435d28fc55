//! Readiness predicates for freshly spawned backends.

use super::ParseReadinessProbeError;
use std::fmt;

/// How the supervisor decides that a spawned backend accepts requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// Any line on stdout signals readiness; the line is consumed.
    FirstStdoutLine,
    /// A stdout line containing the pattern signals readiness; earlier
    /// lines are discarded.
    StdoutPattern(String),
    /// A stderr line containing the pattern signals readiness.
    StderrPattern(String),
    /// A successful `initialize` round trip signals readiness.
    Handshake,
}

impl ReadinessProbe {
    /// Returns the canonical probe name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FirstStdoutLine => "first_stdout_line",
            Self::StdoutPattern(_) => "stdout_pattern",
            Self::StderrPattern(_) => "stderr_pattern",
            Self::Handshake => "handshake",
        }
    }

    /// Builds a probe from its canonical name and optional pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ParseReadinessProbeError`] for unknown names or when a
    /// pattern probe has no pattern.
    pub fn parse(name: &str, pattern: Option<&str>) -> Result<Self, ParseReadinessProbeError> {
        let pattern_value = pattern.map(str::trim).filter(|value| !value.is_empty());
        match (name.trim().to_ascii_lowercase().as_str(), pattern_value) {
            ("first_stdout_line", _) => Ok(Self::FirstStdoutLine),
            ("handshake", _) => Ok(Self::Handshake),
            ("stdout_pattern", Some(value)) => Ok(Self::StdoutPattern(value.to_owned())),
            ("stderr_pattern", Some(value)) => Ok(Self::StderrPattern(value.to_owned())),
            _ => Err(ParseReadinessProbeError(name.to_owned())),
        }
    }

    /// Returns whether a stdout line satisfies this probe.
    #[must_use]
    pub fn matches_stdout(&self, line: &str) -> bool {
        match self {
            Self::FirstStdoutLine => true,
            Self::StdoutPattern(pattern) => line.contains(pattern.as_str()),
            Self::StderrPattern(_) | Self::Handshake => false,
        }
    }

    /// Returns whether a stderr line satisfies this probe.
    #[must_use]
    pub fn matches_stderr(&self, line: &str) -> bool {
        match self {
            Self::StderrPattern(pattern) => line.contains(pattern.as_str()),
            Self::FirstStdoutLine | Self::StdoutPattern(_) | Self::Handshake => false,
        }
    }
}

impl fmt::Display for ReadinessProbe {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
