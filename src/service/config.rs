//! Service configuration sections and run-mode resolution.
//!
//! Sections are read from `[services.<name>]` tables. Resolution turns them
//! into [`ServiceDefinition`]s with a final run mode: real services whose
//! credentials are incomplete fall back to their mock with a warning rather
//! than failing at spawn time.

use super::domain::{
    LaunchCommand, ParseReadinessProbeError, ReadinessProbe, RunMode, ServiceDefinition,
    ServiceDomainError, ServiceKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Program used for mock backends when a section has no `[mock]` table.
pub const DEFAULT_MOCK_PROGRAM: &str = "mock-backend";

/// Launch settings as written in configuration, before templating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSection {
    /// Executable; may contain `${VAR}` placeholders.
    pub command: Option<String>,
    /// Arguments; may contain placeholders.
    pub args: Vec<String>,
    /// Environment overrides; values may contain placeholders.
    pub env: BTreeMap<String, String>,
    /// Optional working directory.
    pub working_directory: Option<String>,
}

/// One `[services.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Declared mode; unknown values fall back to `mock`.
    pub mode: String,
    /// Real backend launch settings.
    #[serde(flatten)]
    pub launch: CommandSection,
    /// Credential files the real backend reads.
    pub auth_files: Vec<String>,
    /// Readiness probe name.
    pub readiness: Option<String>,
    /// Pattern for the `stdout_pattern` and `stderr_pattern` probes.
    pub readiness_pattern: Option<String>,
    /// Mock backend launch settings.
    pub mock: Option<CommandSection>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            mode: RunMode::Mock.as_str().to_owned(),
            launch: CommandSection::default(),
            auth_files: Vec::new(),
            readiness: None,
            readiness_pattern: None,
            mock: None,
        }
    }
}

/// All `[services.*]` tables keyed by service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServicesConfig {
    sections: BTreeMap<ServiceKind, ServiceSection>,
}

/// Caller-level switches for mode resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Run every service against its mock.
    pub force_mock: bool,
    /// Permit services declared `real` to run for real.
    pub allow_real: bool,
    /// Program used for mocks without an explicit `[mock]` table.
    pub mock_program: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            force_mock: false,
            allow_real: true,
            mock_program: DEFAULT_MOCK_PROGRAM.to_owned(),
        }
    }
}

/// Outcome of resolving every configured service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Definitions in service order.
    pub definitions: Vec<ServiceDefinition>,
    /// Human-readable notes about mode fallbacks.
    pub warnings: Vec<String>,
}

/// Errors raised while resolving service sections.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceConfigError {
    /// A real-mode section has no `command`.
    #[error("service {0} has no command configured")]
    MissingCommand(ServiceKind),
    /// Placeholders could not be rendered for a real-mode service.
    #[error("service {service} references unset variables: {}", names.join(", "))]
    MissingVariables {
        /// Affected service.
        service: ServiceKind,
        /// Unset variable names.
        names: Vec<String>,
    },
    /// The readiness probe setting is invalid.
    #[error("service {service}: {source}")]
    Readiness {
        /// Affected service.
        service: ServiceKind,
        /// Parse failure.
        source: ParseReadinessProbeError,
    },
    /// A launch command failed validation.
    #[error("service {service}: {source}")]
    Domain {
        /// Affected service.
        service: ServiceKind,
        /// Validation failure.
        source: ServiceDomainError,
    },
}

impl ServicesConfig {
    /// Creates a configuration from explicit sections.
    #[must_use]
    pub fn new(sections: impl IntoIterator<Item = (ServiceKind, ServiceSection)>) -> Self {
        Self {
            sections: sections.into_iter().collect(),
        }
    }

    /// Returns the section for `service`, if configured.
    #[must_use]
    pub fn section(&self, service: ServiceKind) -> Option<&ServiceSection> {
        self.sections.get(&service)
    }

    /// Returns whether no service is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Resolves every section into a definition with its final mode.
    ///
    /// `lookup` supplies environment values for `${VAR}` placeholders; empty
    /// values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceConfigError`] when a section cannot produce a valid
    /// launch command for its resolved mode.
    pub fn resolve(
        &self,
        options: &ResolveOptions,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Resolution, ServiceConfigError> {
        let mut resolution = Resolution::default();
        for (service, section) in &self.sections {
            let (mode, note) = resolve_mode(*service, section, options, &lookup);
            if let Some(message) = note {
                warn!(service = %service, "{message}");
                resolution.warnings.push(message);
            }
            resolution
                .definitions
                .push(build_definition(*service, section, mode, options, &lookup)?);
        }
        Ok(resolution)
    }
}

fn resolve_mode(
    service: ServiceKind,
    section: &ServiceSection,
    options: &ResolveOptions,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> (RunMode, Option<String>) {
    let Ok(declared) = RunMode::try_from(section.mode.as_str()) else {
        return (
            RunMode::Mock,
            Some(format!(
                "{service}: unknown mode '{}', using mock",
                section.mode
            )),
        );
    };
    if declared == RunMode::Mock {
        return (RunMode::Mock, None);
    }
    if options.force_mock {
        return (
            RunMode::Mock,
            Some(format!("{service}: mock mode forced, ignoring real configuration")),
        );
    }
    if !options.allow_real {
        return (
            RunMode::Mock,
            Some(format!("{service}: real mode not allowed, using mock")),
        );
    }

    let mut missing = Vec::new();
    if section.launch.command.is_none() {
        missing.push("command".to_owned());
    }
    let mut unset = Vec::new();
    render_section(&section.launch, lookup, &mut unset);
    missing.extend(unset);
    for file in &section.auth_files {
        let mut file_unset = Vec::new();
        let path = render_template(file, lookup, &mut file_unset);
        if !file_unset.is_empty() || !is_readable_file(Path::new(&path)) {
            missing.push(path);
        }
    }

    if missing.is_empty() {
        (RunMode::Real, None)
    } else {
        (
            RunMode::Mock,
            Some(format!(
                "{service}: falling back to mock, missing {}",
                missing.join(", ")
            )),
        )
    }
}

fn build_definition(
    service: ServiceKind,
    section: &ServiceSection,
    mode: RunMode,
    options: &ResolveOptions,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<ServiceDefinition, ServiceConfigError> {
    let mut unset = Vec::new();
    let command = match mode {
        RunMode::Real => {
            let rendered = render_section(&section.launch, lookup, &mut unset);
            if !unset.is_empty() {
                return Err(ServiceConfigError::MissingVariables {
                    service,
                    names: unset,
                });
            }
            rendered
        }
        RunMode::Mock => match &section.mock {
            Some(mock) => render_section(mock, lookup, &mut unset),
            None => CommandSection {
                command: Some(options.mock_program.clone()),
                args: vec!["--service".to_owned(), service.as_str().to_owned()],
                ..CommandSection::default()
            },
        },
    };

    let mut definition =
        ServiceDefinition::new(service, mode, to_launch_command(service, &command)?);
    if mode == RunMode::Real {
        definition = definition.with_auth_files(
            section
                .auth_files
                .iter()
                .map(|file| PathBuf::from(render_template(file, lookup, &mut Vec::new()))),
        );
    }
    if let Some(name) = &section.readiness {
        let probe = ReadinessProbe::parse(name, section.readiness_pattern.as_deref())
            .map_err(|source| ServiceConfigError::Readiness { service, source })?;
        definition = definition.with_readiness(probe);
    }
    Ok(definition)
}

fn to_launch_command(
    service: ServiceKind,
    section: &CommandSection,
) -> Result<LaunchCommand, ServiceConfigError> {
    let program = section
        .command
        .as_deref()
        .ok_or(ServiceConfigError::MissingCommand(service))?;
    let domain_error = |source| ServiceConfigError::Domain { service, source };
    let mut command = LaunchCommand::new(program)
        .map_err(domain_error)?
        .with_args(section.args.iter().cloned())
        .with_env(section.env.clone());
    if let Some(directory) = &section.working_directory {
        command = command
            .with_working_directory(directory.clone())
            .map_err(domain_error)?;
    }
    Ok(command)
}

fn render_section(
    section: &CommandSection,
    lookup: &dyn Fn(&str) -> Option<String>,
    unset: &mut Vec<String>,
) -> CommandSection {
    CommandSection {
        command: section
            .command
            .as_deref()
            .map(|value| render_template(value, lookup, unset)),
        args: section
            .args
            .iter()
            .map(|value| render_template(value, lookup, unset))
            .collect(),
        env: section
            .env
            .iter()
            .map(|(key, value)| (key.clone(), render_template(value, lookup, unset)))
            .collect(),
        working_directory: section
            .working_directory
            .as_deref()
            .map(|value| render_template(value, lookup, unset)),
    }
}

/// Replaces `${NAME}` placeholders with values from `lookup`.
///
/// Unset or empty variables render as empty text and are appended to
/// `unset`. An unterminated `${` is kept literally.
pub fn render_template(
    template: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    unset: &mut Vec<String>,
) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after)) = rest.split_once("${") {
        rendered.push_str(before);
        let Some((name, tail)) = after.split_once('}') else {
            rendered.push_str("${");
            rest = after;
            break;
        };
        match lookup(name.trim()).filter(|value| !value.is_empty()) {
            Some(value) => rendered.push_str(&value),
            None => {
                if !unset.iter().any(|known| known == name.trim()) {
                    unset.push(name.trim().to_owned());
                }
            }
        }
        rest = tail;
    }
    rendered.push_str(rest);
    rendered
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |name: &str| values.get(name).cloned()
    }

    fn parse(toml_text: &str) -> ServicesConfig {
        toml::from_str(toml_text).expect("services table parses")
    }

    #[rstest]
    #[case("plain", "plain", &[])]
    #[case("Bearer ${TOKEN}", "Bearer secret", &[])]
    #[case("${MISSING}/path", "/path", &["MISSING"])]
    #[case("${EMPTY}", "", &["EMPTY"])]
    #[case("broken ${TOKEN", "broken ${TOKEN", &[])]
    fn templates_render(#[case] template: &str, #[case] expected: &str, #[case] missing: &[&str]) {
        let lookup = lookup_from(&[("TOKEN", "secret"), ("EMPTY", "")]);
        let mut unset = Vec::new();
        assert_eq!(render_template(template, &lookup, &mut unset), expected);
        assert_eq!(unset, missing);
    }

    #[test]
    fn real_service_with_complete_credentials_stays_real() {
        let mut auth = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(auth, "{{}}").expect("write credentials");
        let config = parse(&format!(
            r#"
            [slack]
            mode = "real"
            command = "slack-mcp"
            env = {{ SLACK_TOKEN = "${{SLACK_TOKEN}}" }}
            auth_files = ["{}"]
            "#,
            auth.path().display()
        ));

        let resolution = config
            .resolve(&ResolveOptions::default(), lookup_from(&[("SLACK_TOKEN", "xoxp")]))
            .expect("resolution succeeds");

        assert!(resolution.warnings.is_empty());
        let definition = resolution.definitions.first().expect("one definition");
        assert_eq!(definition.mode(), RunMode::Real);
        assert_eq!(
            definition.command().env().get("SLACK_TOKEN").map(String::as_str),
            Some("xoxp")
        );
        assert_eq!(definition.readiness(), ReadinessProbe::Handshake);
    }

    #[test]
    fn real_service_missing_credentials_falls_back_to_mock() {
        let config = parse(
            r#"
            [github]
            mode = "real"
            command = "github-mcp"
            env = { GITHUB_TOKEN = "${GITHUB_TOKEN}" }
            auth_files = ["/nonexistent/credentials.json"]
            "#,
        );

        let resolution = config
            .resolve(&ResolveOptions::default(), lookup_from(&[]))
            .expect("resolution succeeds");

        let definition = resolution.definitions.first().expect("one definition");
        assert_eq!(definition.mode(), RunMode::Mock);
        assert_eq!(definition.command().program(), DEFAULT_MOCK_PROGRAM);
        assert_eq!(definition.command().args(), ["--service", "github"]);
        let warning = resolution.warnings.first().expect("fallback warning");
        assert!(warning.contains("GITHUB_TOKEN"));
        assert!(warning.contains("/nonexistent/credentials.json"));
    }

    #[test]
    fn force_mock_overrides_real_mode_and_uses_mock_table() {
        let config = parse(
            r#"
            [gdrive]
            mode = "real"
            command = "npx"
            readiness = "stdout_pattern"
            readiness_pattern = "ready"

            [gdrive.mock]
            command = "/opt/mock-backend"
            args = ["--service", "drive", "--results", "${RESULTS}"]
            "#,
        );
        let options = ResolveOptions {
            force_mock: true,
            ..ResolveOptions::default()
        };

        let resolution = config
            .resolve(&options, lookup_from(&[("RESULTS", "7")]))
            .expect("resolution succeeds");

        let definition = resolution.definitions.first().expect("one definition");
        assert_eq!(definition.service(), ServiceKind::Drive);
        assert_eq!(definition.mode(), RunMode::Mock);
        assert_eq!(definition.command().program(), "/opt/mock-backend");
        assert_eq!(
            definition.command().args(),
            ["--service", "drive", "--results", "7"]
        );
        assert_eq!(
            definition.readiness(),
            ReadinessProbe::StdoutPattern("ready".to_owned())
        );
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[test]
    fn unknown_mode_falls_back_to_mock() {
        let config = parse("[slack]\nmode = \"live\"\n");

        let resolution = config
            .resolve(&ResolveOptions::default(), lookup_from(&[]))
            .expect("resolution succeeds");

        assert_eq!(
            resolution.definitions.first().map(ServiceDefinition::mode),
            Some(RunMode::Mock)
        );
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[test]
    fn invalid_readiness_is_reported() {
        let config = parse("[slack]\nreadiness = \"stdout_pattern\"\n");

        let result = config.resolve(&ResolveOptions::default(), lookup_from(&[]));

        assert!(matches!(
            result,
            Err(ServiceConfigError::Readiness {
                service: ServiceKind::Slack,
                ..
            })
        ));
    }
}
