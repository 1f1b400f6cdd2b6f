//! Command seam and launch errors.

use async_trait::async_trait;
use thiserror::Error;

use crate::ConfigError;

/// Command accepted by the agent on its standard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCommand {
    /// Answer the ringing call.
    Answer,
    /// Hang up the current call.
    HangUp,
    /// Quit the agent.
    Quit,
}

impl AgentCommand {
    /// Single-character token understood by the agent console.
    #[must_use]
    pub const fn token(self) -> char {
        match self {
            Self::Answer => 'a',
            Self::HangUp => 'h',
            Self::Quit => 'q',
        }
    }
}

/// Launch error.
///
/// The display text doubles as the `last_event` recorded in the state store.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("agent not found: {0}")]
    NotFound(String),
    #[error("invalid agent command: {0}")]
    InvalidCommand(String),
    #[error("start failed: {0}")]
    SpawnFailed(String),
}

/// Error returned when the agent cannot be started.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Sanctioned channel into the agent's standard input.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Deliver a command to the agent.
    ///
    /// Returns `false` if there is no live agent or the write failed;
    /// callers treat that as "not handled".
    async fn send_command(&self, command: AgentCommand) -> bool;
}
