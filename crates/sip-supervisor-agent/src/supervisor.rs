//! Agent process supervision.

use std::{process::Stdio, sync::Arc, time::Duration};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use sip_supervisor_core::{
    AgentCommand, AgentSettings, CommandSink, LaunchError, StartError, StateStore,
};
use tokio::{process::Command, task::JoinHandle};

use crate::{
    channel::CommandChannel,
    command::CommandBuilder,
    pump::{StreamKind, spawn_reader},
};

/// How long readers may keep draining after the agent exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Launches the agent and wires its streams.
pub struct AgentSupervisor {
    store: Arc<StateStore>,
    commands: CommandChannel,
}

impl AgentSupervisor {
    /// Create a supervisor that reports into `store` and routes commands
    /// through `commands`.
    #[must_use]
    pub const fn new(store: Arc<StateStore>, commands: CommandChannel) -> Self {
        Self { store, commands }
    }

    /// Launch the agent.
    ///
    /// On success the command channel is attached to the agent's stdin and
    /// one reader task is running per output stream.
    ///
    /// # Errors
    /// Returns [`StartError::Configuration`] if credentials are missing and
    /// [`StartError::Launch`] if the binary cannot be found or started.
    pub async fn start(&self, settings: &AgentSettings) -> Result<RunningAgent, StartError> {
        let credentials = settings.credentials()?;
        let parts = CommandBuilder::registration(settings.binary.as_str(), &credentials)
            .build()
            .map_err(LaunchError::from)?;

        tracing::info!(
            program = %parts.program,
            identity = %credentials.identity(),
            registrar = %credentials.registrar(),
            "Starting agent"
        );
        let (executable, args) = parts.into_resolved().await?;

        let mut command = Command::new(&executable);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .group_spawn()
            .map_err(|e| LaunchError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        let inner = child.inner();
        let (stdin, stdout, stderr) = (inner.stdin.take(), inner.stdout.take(), inner.stderr.take());

        if let Some(stdin) = stdin {
            self.commands.attach(stdin).await;
        }

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            readers.push(spawn_reader(stdout, StreamKind::Stdout, Arc::clone(&self.store)));
        }
        if let Some(stderr) = stderr {
            readers.push(spawn_reader(stderr, StreamKind::Stderr, Arc::clone(&self.store)));
        }

        tracing::info!(?pid, executable = %executable.display(), "Agent started");

        Ok(RunningAgent {
            child,
            pid,
            commands: self.commands.clone(),
            readers,
            store: Arc::clone(&self.store),
            exit: None,
        })
    }
}

/// Handle to a launched agent process.
///
/// Owns the child and its reader tasks. The exit is recorded in the store
/// exactly once, whichever of [`Self::await_exit`] or [`Self::shutdown`]
/// observes it.
pub struct RunningAgent {
    child: AsyncGroupChild,
    pid: Option<u32>,
    commands: CommandChannel,
    readers: Vec<JoinHandle<()>>,
    store: Arc<StateStore>,
    exit: Option<Option<i32>>,
}

impl RunningAgent {
    /// OS process id, if still known.
    #[must_use]
    pub const fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Channel attached to this agent's stdin.
    #[must_use]
    pub fn commands(&self) -> CommandChannel {
        self.commands.clone()
    }

    /// Send a command to the agent. Never fails loudly.
    pub async fn send_command(&self, command: AgentCommand) -> bool {
        self.commands.send_command(command).await
    }

    /// Wait for the agent to terminate and record the exit.
    ///
    /// Returns the exit code, or `None` if the agent was killed by a signal.
    pub async fn await_exit(&mut self) -> Option<i32> {
        if let Some(code) = self.exit {
            return code;
        }
        let code = match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::error!("Failed to wait for agent: {e}");
                None
            }
        };
        self.finish(code).await
    }

    /// Ask the agent to quit, killing its process group if it has not
    /// exited within `timeout`.
    pub async fn shutdown(&mut self, timeout: Duration) -> Option<i32> {
        if let Some(code) = self.exit {
            return code;
        }

        if self.send_command(AgentCommand::Quit).await {
            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(Ok(status)) => return self.finish(status.code()).await,
                Ok(Err(e)) => tracing::warn!("Failed to wait for agent: {e}"),
                Err(_) => tracing::warn!(?timeout, "Agent did not quit in time"),
            }
        }

        tracing::info!(pid = ?self.pid, "Killing agent process group");
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("Failed to kill agent: {e}");
        }
        let code = match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for agent: {e}");
                None
            }
            Err(_) => {
                tracing::error!(pid = ?self.pid, "Agent still running after kill");
                None
            }
        };
        self.finish(code).await
    }

    async fn finish(&mut self, code: Option<i32>) -> Option<i32> {
        self.commands.detach().await;

        // Let readers apply whatever the agent printed last.
        for reader in self.readers.drain(..) {
            let abort = reader.abort_handle();
            if tokio::time::timeout(DRAIN_TIMEOUT, reader).await.is_err() {
                tracing::warn!("Agent output reader did not finish; aborting");
                abort.abort();
            }
        }

        tracing::info!(?code, "Agent process exited");
        self.store.record_exit(code);
        self.exit = Some(code);
        code
    }
}

#[cfg(all(test, unix))]
mod tests {
    use sip_supervisor_core::CallState;

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

    fn supervisor() -> (AgentSupervisor, Arc<StateStore>, CommandChannel) {
        let store = Arc::new(StateStore::new());
        let commands = CommandChannel::default();
        (
            AgentSupervisor::new(Arc::clone(&store), commands.clone()),
            store,
            commands,
        )
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let (supervisor, _, _) = supervisor();
        let mut incomplete = settings("sh");
        incomplete.password = None;

        let err = supervisor.start(&incomplete).await.err().unwrap();
        assert!(matches!(err, StartError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_binary_not_found() {
        let (supervisor, _, commands) = supervisor();
        let err = supervisor
            .start(&settings("no-such-sip-agent-binary"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartError::Launch(LaunchError::NotFound(_))));
        assert!(!commands.is_attached().await);
    }

    #[tokio::test]
    async fn test_exit_forces_unregistered() {
        let (supervisor, store, _) = supervisor();
        let script = "sh -c 'echo Registration complete; echo Incoming call from bob >&2; exit 1'";

        let mut agent = supervisor.start(&settings(script)).await.unwrap();
        assert!(agent.id().is_some());
        assert_eq!(agent.await_exit().await, Some(1));

        let state = store.snapshot();
        assert!(!state.registered);
        assert_eq!(state.last_event, "agent exited (1)");
        assert_eq!(state.call_state, CallState::Incoming);
    }

    #[tokio::test]
    async fn test_commands_reach_agent_stdin() {
        let (supervisor, store, commands) = supervisor();
        let script = "sh -c 'echo Incoming call from bob; read cmd; \
            [ \"$cmd\" = a ] && echo Call answered; read cmd; [ \"$cmd\" = h ] && exit 3; exit 9'";

        let mut agent = supervisor.start(&settings(script)).await.unwrap();
        assert!(commands.send_command(AgentCommand::Answer).await);
        assert!(agent.send_command(AgentCommand::HangUp).await);
        assert_eq!(agent.await_exit().await, Some(3));

        let state = store.snapshot();
        assert_eq!(state.call_state, CallState::Active);
        assert_eq!(state.call_info.as_deref(), Some("Call answered"));
        assert!(!commands.send_command(AgentCommand::Answer).await);
    }

    #[tokio::test]
    async fn test_shutdown_sends_quit() {
        let (supervisor, store, _) = supervisor();
        let script = "sh -c 'read cmd; [ \"$cmd\" = q ] && exit 0; exit 9'";

        let mut agent = supervisor.start(&settings(script)).await.unwrap();
        assert_eq!(agent.shutdown(Duration::from_secs(5)).await, Some(0));
        assert_eq!(store.snapshot().last_event, "agent exited (0)");
        // Exit is recorded once; later calls return the same code.
        assert_eq!(agent.await_exit().await, Some(0));
    }

    #[tokio::test]
    async fn test_shutdown_kills_unresponsive_agent() {
        let (supervisor, store, _) = supervisor();
        let script = "sh -c 'exec sleep 30'";

        let mut agent = supervisor.start(&settings(script)).await.unwrap();
        assert_eq!(agent.shutdown(Duration::from_millis(200)).await, None);
        assert_eq!(store.snapshot().last_event, "agent exited (signal)");
    }
}
