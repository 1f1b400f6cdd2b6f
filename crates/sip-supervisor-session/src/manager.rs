//! Supervisor manager for orchestrating the agent lifecycle.

use std::{future::Future, sync::Arc, time::Duration};

use sip_supervisor_agent::{AgentSupervisor, CommandChannel};
use sip_supervisor_core::{AgentSettings, ConfigError, LaunchError, StartError, StateStore};

/// Default bound on stopping the agent after a shutdown request.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervisor manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// How a supervised run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The agent terminated on its own.
    Exited(Option<i32>),
    /// The agent could not be launched.
    LaunchFailed(LaunchError),
    /// A shutdown was requested and the agent was stopped.
    Shutdown(Option<i32>),
}

impl RunOutcome {
    /// Whether the run ended because the caller asked it to.
    #[must_use]
    pub const fn caller_initiated(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }
}

/// Runs one agent instance from launch to exit.
pub struct SupervisorManager {
    settings: AgentSettings,
    store: Arc<StateStore>,
    commands: CommandChannel,
    stop_timeout: Duration,
}

impl SupervisorManager {
    /// Create a new supervisor manager.
    #[must_use]
    pub const fn new(settings: AgentSettings, store: Arc<StateStore>, commands: CommandChannel) -> Self {
        Self {
            settings,
            store,
            commands,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Override the stop timeout.
    #[must_use]
    pub const fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Shared state store.
    #[must_use]
    pub const fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Launch the agent and supervise it until it exits or `shutdown`
    /// resolves.
    ///
    /// Launch failures are recorded in the store and reported as an
    /// outcome; the agent is not respawned.
    ///
    /// # Errors
    /// Returns error if the SIP credentials are incomplete.
    pub async fn run<F>(&self, shutdown: F) -> Result<RunOutcome, ManagerError>
    where
        F: Future<Output = ()>,
    {
        let supervisor = AgentSupervisor::new(Arc::clone(&self.store), self.commands.clone());
        let mut agent = match supervisor.start(&self.settings).await {
            Ok(agent) => agent,
            Err(StartError::Configuration(e)) => return Err(e.into()),
            Err(StartError::Launch(e)) => {
                tracing::error!("Failed to launch agent: {e}");
                self.store.record_launch_failure(e.to_string());
                return Ok(RunOutcome::LaunchFailed(e));
            }
        };

        tokio::pin!(shutdown);
        let outcome = tokio::select! {
            code = agent.await_exit() => RunOutcome::Exited(code),
            () = &mut shutdown => {
                tracing::info!("Shutdown requested; stopping agent");
                RunOutcome::Shutdown(agent.shutdown(self.stop_timeout).await)
            }
        };
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::future;

    use super::*;

    fn settings(binary: &str) -> AgentSettings {
        AgentSettings {
            binary: binary.to_string(),
            user: Some("1001".into()),
            password: Some("secret".into()),
            domain: Some("pbx.local".into()),
            server: Some("10.0.0.5".into()),
        }
    }

    fn manager(binary: &str) -> SupervisorManager {
        SupervisorManager::new(
            settings(binary),
            Arc::new(StateStore::new()),
            CommandChannel::default(),
        )
        .with_stop_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_launch_failure_is_recorded() {
        let manager = manager("no-such-sip-agent-binary");
        let outcome = manager.run(future::pending()).await.unwrap();

        assert!(matches!(outcome, RunOutcome::LaunchFailed(LaunchError::NotFound(_))));
        assert!(!outcome.caller_initiated());
        let state = manager.store().snapshot();
        assert!(!state.registered);
        assert_eq!(state.last_event, "agent not found: no-such-sip-agent-binary");
    }

    #[tokio::test]
    async fn test_missing_credentials_are_fatal() {
        let mut incomplete = settings("sh");
        incomplete.server = None;
        let manager = SupervisorManager::new(incomplete, Arc::new(StateStore::new()), CommandChannel::default());

        let err = manager.run(future::pending()).await.unwrap_err();
        assert!(matches!(err, ManagerError::Configuration(ConfigError::MissingFields(_))));
        assert_eq!(manager.store().snapshot().last_event, "starting");
    }

    #[tokio::test]
    async fn test_agent_exit() {
        let manager = manager("sh -c 'echo Registration complete; exit 2'");
        let outcome = manager.run(future::pending()).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Exited(Some(2))));
        let state = manager.store().snapshot();
        assert!(!state.registered);
        assert_eq!(state.last_event, "agent exited (2)");
    }

    #[tokio::test]
    async fn test_shutdown_stops_agent() {
        let manager = manager("sh -c 'read cmd; [ \"$cmd\" = q ] && exit 0; exit 9'");
        let outcome = manager.run(async {}).await.unwrap();

        assert!(outcome.caller_initiated());
        assert!(matches!(outcome, RunOutcome::Shutdown(Some(0))));
    }
}
