//! Output pump: agent console lines into the state store.

use std::{fmt, sync::Arc};

use sip_supervisor_core::StateStore;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    task::JoinHandle,
};

use crate::classifier::classify;

/// Which agent stream a reader is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read `stream` line by line until end-of-stream, applying classified
/// events to `store` in arrival order.
///
/// Invalid UTF-8 is replaced, never fatal. A read error ends this reader
/// only. Returns the number of non-empty lines seen.
pub async fn pump_lines<R>(stream: R, kind: StreamKind, store: &StateStore) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    let mut seen = 0;

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break, // EOF
            Ok(_) => {
                let decoded = String::from_utf8_lossy(&buffer);
                let line = decoded.trim();
                if line.is_empty() {
                    continue;
                }
                seen += 1;
                tracing::info!(target: "agent", stream = %kind, "{line}");

                let events = classify(line);
                if !events.is_empty() {
                    store.apply_line(line, &events);
                }
            }
            Err(e) => {
                tracing::error!(stream = %kind, "Error reading agent output: {e}");
                break;
            }
        }
    }

    tracing::debug!(stream = %kind, lines = seen, "Agent stream closed");
    seen
}

/// Spawn a reader task for one agent stream.
pub fn spawn_reader<R>(stream: R, kind: StreamKind, store: Arc<StateStore>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        pump_lines(stream, kind, &store).await;
    })
}
