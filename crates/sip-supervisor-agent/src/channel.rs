//! Command channel into the agent's standard input.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sip_supervisor_core::{AgentCommand, CommandSink, config::DEFAULT_COMMAND_TIMEOUT};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle for writing commands to the agent.
///
/// Cloned freely; all clones talk to the same stdin. Starts detached and
/// is attached by the supervisor when the agent launches.
#[derive(Clone)]
pub struct CommandChannel {
    writer: Arc<Mutex<Option<Writer>>>,
    timeout: Duration,
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandChannel {
    /// Create a detached channel with the given write bound.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            writer: Arc::new(Mutex::new(None)),
            timeout,
        }
    }

    /// Route commands to `writer`, replacing any previous one.
    pub async fn attach(&self, writer: impl AsyncWrite + Send + Unpin + 'static) {
        *self.writer.lock().await = Some(Box::new(writer));
    }

    /// Drop the current writer; later sends fail fast.
    pub async fn detach(&self) {
        self.writer.lock().await.take();
    }

    /// Whether a writer is attached.
    pub async fn is_attached(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Write `command` and flush.
    ///
    /// # Errors
    /// Returns error if no writer is attached, the write fails, or the
    /// write bound elapses.
    pub async fn write_command(&self, command: AgentCommand) -> std::io::Result<()> {
        let line = format!("{}\n", command.token());
        let write = async {
            let mut guard = self.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "no live agent",
                ));
            };
            let result = async {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await
            }
            .await;
            if let Err(ref e) = result {
                if e.kind() == std::io::ErrorKind::BrokenPipe {
                    guard.take();
                }
            }
            result
        };

        tokio::time::timeout(self.timeout, write)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "command write timed out"))?
    }
}

#[async_trait]
impl CommandSink for CommandChannel {
    async fn send_command(&self, command: AgentCommand) -> bool {
        match self.write_command(command).await {
            Ok(()) => {
                tracing::info!(?command, "Sent command to agent");
                true
            }
            Err(e) => {
                tracing::warn!(?command, "Failed to send command to agent: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detached_channel_reports_failure() {
        let channel = CommandChannel::default();
        assert!(!channel.send_command(AgentCommand::Answer).await);
    }

    #[tokio::test]
    async fn test_writes_token_and_newline() {
        let channel = CommandChannel::default();
        let mock = tokio_test::io::Builder::new().write(b"a\n").write(b"h\n").build();
        channel.attach(mock).await;

        assert!(channel.send_command(AgentCommand::Answer).await);
        assert!(channel.send_command(AgentCommand::HangUp).await);
    }

    #[tokio::test]
    async fn test_broken_pipe_detaches() {
        let channel = CommandChannel::default();
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        channel.attach(mock).await;

        assert!(!channel.send_command(AgentCommand::HangUp).await);
        assert!(!channel.is_attached().await);
    }

    #[tokio::test]
    async fn test_detach() {
        let channel = CommandChannel::default();
        channel.attach(tokio::io::sink()).await;
        assert!(channel.send_command(AgentCommand::Quit).await);

        channel.detach().await;
        assert!(!channel.send_command(AgentCommand::Quit).await);
    }

    #[tokio::test]
    async fn test_stalled_writer_times_out() {
        let channel = CommandChannel::new(Duration::from_millis(20));
        // A duplex pipe whose reader never drains blocks once its buffer is full.
        let (writer, _reader) = tokio::io::duplex(1);
        channel.attach(writer).await;

        assert!(!channel.send_command(AgentCommand::Answer).await);
    }
}
