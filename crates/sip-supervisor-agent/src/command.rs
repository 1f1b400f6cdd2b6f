//! Agent invocation building.

use std::{fmt, path::PathBuf};

use sip_supervisor_core::{LaunchError, SipCredentials};
use thiserror::Error;

use crate::resolve::resolve_executable_path;

/// Console log verbosity passed to the agent.
pub const LOG_LEVEL: u8 = 3;

const PASSWORD_FLAG: &str = "--password";

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
}

impl From<CommandBuildError> for LaunchError {
    fn from(err: CommandBuildError) -> Self {
        Self::InvalidCommand(err.to_string())
    }
}

/// Parsed command parts (program + args).
#[derive(Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns [`LaunchError::NotFound`] if the executable cannot be located.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), LaunchError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(LaunchError::NotFound(program))?;
        Ok((executable, args))
    }
}

// Keeps the password out of logs.
impl fmt::Debug for CommandParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut redact_next = false;
        let args: Vec<&str> = self
            .args
            .iter()
            .map(|arg| {
                let shown = if redact_next { "<redacted>" } else { arg.as_str() };
                redact_next = arg == PASSWORD_FLAG;
                shown
            })
            .collect();
        f.debug_struct("CommandParts")
            .field("program", &self.program)
            .field("args", &args)
            .finish()
    }
}

/// Builder for constructing the agent command line.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Base executable command, split with shell quoting rules.
    pub base: String,
    /// Optional parameters to append.
    pub params: Option<Vec<String>>,
}

impl CommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: None,
        }
    }

    /// Builder for registering `credentials` with the agent at `base`.
    #[must_use]
    pub fn registration<S: Into<String>>(base: S, credentials: &SipCredentials) -> Self {
        Self::new(base).params(registration_args(credentials))
    }

    /// Add parameters.
    #[must_use]
    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Build the command.
    ///
    /// # Errors
    /// Returns error if the base command is invalid.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        if let Some(ref params) = self.params {
            parts.extend(params.iter().cloned());
        }

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

/// Arguments that register the account and keep the agent running.
#[must_use]
pub fn registration_args(credentials: &SipCredentials) -> Vec<String> {
    vec![
        "--id".into(),
        credentials.identity(),
        "--registrar".into(),
        credentials.registrar(),
        "--realm".into(),
        "*".into(),
        "--username".into(),
        credentials.user.clone(),
        PASSWORD_FLAG.into(),
        credentials.password.clone(),
        "--log-level".into(),
        LOG_LEVEL.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> SipCredentials {
        SipCredentials {
            user: "1001".into(),
            password: "s3cret".into(),
            domain: "pbx.local".into(),
            server: "10.0.0.5".into(),
        }
    }

    #[test]
    fn test_registration_invocation() {
        let parts = CommandBuilder::registration("pjsua", &credentials()).build().unwrap();
        assert_eq!(parts.program, "pjsua");
        assert_eq!(
            parts.args,
            [
                "--id",
                "sip:1001@pbx.local",
                "--registrar",
                "sip:10.0.0.5",
                "--realm",
                "*",
                "--username",
                "1001",
                "--password",
                "s3cret",
                "--log-level",
                "3",
            ]
        );
    }

    #[test]
    fn test_base_with_leading_args() {
        let parts = CommandBuilder::registration("'/opt/pj sip/pjsua' --null-audio", &credentials())
            .build()
            .unwrap();
        assert_eq!(parts.program, "/opt/pj sip/pjsua");
        assert_eq!(parts.args[0], "--null-audio");
        assert_eq!(parts.args[1], "--id");
    }

    #[test]
    fn test_invalid_and_empty_base() {
        assert!(matches!(
            CommandBuilder::new("'unterminated").build(),
            Err(CommandBuildError::InvalidBase(_))
        ));
        assert!(matches!(
            CommandBuilder::new("   ").build(),
            Err(CommandBuildError::EmptyCommand)
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let parts = CommandBuilder::registration("pjsua", &credentials()).build().unwrap();
        let rendered = format!("{parts:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_unresolvable_program() {
        let parts = CommandParts::new("definitely-not-a-sip-agent".into(), vec![]);
        let err = parts.into_resolved().await.unwrap_err();
        assert_eq!(err.to_string(), "agent not found: definitely-not-a-sip-agent");
    }
}
