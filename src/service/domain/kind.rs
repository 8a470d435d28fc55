//! Backend identity and run mode.

use super::{ParseRunModeError, ParseServiceKindError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the search backends driven by the finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Chat history.
    Slack,
    /// Code hosting: code, issues and pull requests.
    Github,
    /// Document storage.
    #[serde(alias = "gdrive")]
    Drive,
}

impl ServiceKind {
    /// Every service, in pipeline output order.
    pub const ALL: [Self; 3] = [Self::Slack, Self::Github, Self::Drive];

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Github => "github",
            Self::Drive => "drive",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServiceKind {
    type Error = ParseServiceKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "slack" => Ok(Self::Slack),
            "github" => Ok(Self::Github),
            "drive" | "gdrive" => Ok(Self::Drive),
            _ => Err(ParseServiceKindError(value.to_owned())),
        }
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = ParseServiceKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(value)
    }
}

/// Whether a service runs against the real backend or its mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// The real MCP server with the caller's credentials.
    Real,
    /// The bundled mock server.
    #[default]
    Mock,
}

impl RunMode {
    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RunMode {
    type Error = ParseRunModeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "real" => Ok(Self::Real),
            "mock" => Ok(Self::Mock),
            _ => Err(ParseRunModeError(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("slack", ServiceKind::Slack)]
    #[case(" GitHub ", ServiceKind::Github)]
    #[case("drive", ServiceKind::Drive)]
    #[case("gdrive", ServiceKind::Drive)]
    fn service_names_parse(#[case] raw: &str, #[case] expected: ServiceKind) {
        assert_eq!(ServiceKind::try_from(raw), Ok(expected));
    }

    #[test]
    fn unknown_service_is_rejected() {
        assert_eq!(
            ServiceKind::try_from("jira"),
            Err(ParseServiceKindError("jira".to_owned()))
        );
    }

    #[test]
    fn gdrive_alias_deserialises_to_drive() {
        let kind: ServiceKind = serde_json::from_str("\"gdrive\"").expect("alias accepted");
        assert_eq!(kind, ServiceKind::Drive);
        assert_eq!(kind.to_string(), "drive");
    }

    #[rstest]
    #[case("real", Ok(RunMode::Real))]
    #[case("MOCK", Ok(RunMode::Mock))]
    #[case("live", Err(ParseRunModeError("live".to_owned())))]
    fn run_modes_parse(#[case] raw: &str, #[case] expected: Result<RunMode, ParseRunModeError>) {
        assert_eq!(RunMode::try_from(raw), expected);
    }
}
