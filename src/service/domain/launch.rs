//! Child-process launch settings.

use super::ServiceDomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Command, arguments and environment used to spawn a backend over stdio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl LaunchCommand {
    /// Creates a launch command for `program`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceDomainError::EmptyCommand`] when `program` is empty
    /// after trimming.
    pub fn new(program: impl Into<String>) -> Result<Self, ServiceDomainError> {
        let normalized = program.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ServiceDomainError::EmptyCommand);
        }

        Ok(Self {
            program: normalized,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = values.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces environment overrides.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceDomainError::EmptyWorkingDirectory`] when the value
    /// is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, ServiceDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ServiceDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns environment overrides.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_program_is_rejected() {
        assert_eq!(
            LaunchCommand::new("   "),
            Err(ServiceDomainError::EmptyCommand)
        );
    }

    #[test]
    fn builder_keeps_arguments_in_order() {
        let command = LaunchCommand::new(" npx ")
            .expect("valid command")
            .with_args(["-y", "@modelcontextprotocol/server-gdrive"])
            .with_env([("TOKEN".to_owned(), "abc".to_owned())]);

        assert_eq!(command.program(), "npx");
        assert_eq!(command.args(), ["-y", "@modelcontextprotocol/server-gdrive"]);
        assert_eq!(command.env().get("TOKEN").map(String::as_str), Some("abc"));
    }

    #[test]
    fn blank_working_directory_is_rejected() {
        let result = LaunchCommand::new("node")
            .expect("valid command")
            .with_working_directory(" ");
        assert_eq!(result, Err(ServiceDomainError::EmptyWorkingDirectory));
    }
}
