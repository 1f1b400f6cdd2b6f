//! Lock-guarded session state with change broadcast.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{CallState, LineEvent, SessionState};

/// Capacity of the live-update channel.
const CHANNEL_CAPACITY: usize = 256;

/// Single source of truth for the supervised agent's session.
///
/// Every mutation goes through one write-locked critical section that
/// updates the requested fields, stamps `last_updated`, and publishes the
/// committed snapshot to live subscribers. Readers only ever see whole
/// snapshots.
pub struct StateStore {
    inner: RwLock<SessionState>,
    sender: broadcast::Sender<SessionState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create a store holding the initial state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(SessionState::default())
    }

    /// Create a store seeded with `state`.
    #[must_use]
    pub fn with_state(state: SessionState) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(state),
            sender,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.read().clone()
    }

    /// Atomically mutate the state.
    ///
    /// `last_updated` is set after `f` runs and never moves backwards.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.write();
        let result = f(&mut state);
        self.commit(&mut state);
        result
    }

    /// Atomically mutate the state only if `f` returns `true`.
    ///
    /// `f` must leave the state untouched when it returns `false`.
    pub fn update_if(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        let mut state = self.write();
        let changed = f(&mut state);
        if changed {
            self.commit(&mut state);
        }
        changed
    }

    fn commit(&self, state: &mut SessionState) {
        state.last_updated = Utc::now().max(state.last_updated);
        // Published under the lock so subscribers see commit order.
        let _ = self.sender.send(state.clone());
    }

    /// Apply the events classified from `line` as one update.
    ///
    /// Returns `false` without touching the state when `events` is empty.
    pub fn apply_line(&self, line: &str, events: &[LineEvent]) -> bool {
        self.update_if(|state| {
            for event in events {
                state.apply_event(*event, line);
            }
            !events.is_empty()
        })
    }

    /// Record that the agent process terminated.
    ///
    /// Always clears `registered`, whatever the last classified line said.
    pub fn record_exit(&self, code: Option<i32>) {
        let event = code.map_or_else(
            || "agent exited (signal)".to_string(),
            |code| format!("agent exited ({code})"),
        );
        self.update(|state| {
            state.registered = false;
            state.last_event = event;
        });
    }

    /// Record that the agent could not be launched.
    pub fn record_launch_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|state| {
            state.registered = false;
            state.last_event = reason;
        });
    }

    /// Move the call from `from` to `to` if it is still in `from`.
    pub fn transition_call(&self, from: CallState, to: CallState, event: &str) -> bool {
        self.update_if(|state| {
            if state.call_state != from {
                return false;
            }
            state.call_state = to;
            state.call_info = Some(event.to_string());
            state.last_event = event.to_string();
            true
        })
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.sender.subscribe()
    }

    /// Stream that yields the current snapshot first, then live updates.
    ///
    /// Lagging subscribers skip the updates they missed.
    #[must_use]
    pub fn snapshot_plus_stream(&self) -> futures::stream::BoxStream<'static, SessionState> {
        // Subscribe before reading so no commit falls between the two.
        let rx = self.subscribe();
        let current = self.snapshot();
        let since = current.last_updated;

        let live = BroadcastStream::new(rx).filter_map(move |res| async move {
            res.ok().filter(|state| state.last_updated >= since)
        });

        futures::stream::once(async move { current }).chain(live).boxed()
    }

    /// SSE stream (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn sse_stream(
        &self,
    ) -> futures::stream::BoxStream<'static, Result<axum::response::sse::Event, std::io::Error>>
    {
        self.snapshot_plus_stream()
            .map(|state| {
                axum::response::sse::Event::default()
                    .event("state")
                    .json_data(state)
                    .map_err(std::io::Error::other)
            })
            .boxed()
    }
}
