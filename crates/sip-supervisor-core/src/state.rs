//! Session state snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LineEvent, RegistrationEvent};

/// Event text of a freshly created state.
pub const INITIAL_EVENT: &str = "starting";

/// Current call-session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No call. Both the initial phase and an idle phase.
    #[default]
    None,
    /// A call is ringing.
    Incoming,
    /// A call is established.
    Active,
    /// The last call was torn down.
    Ended,
}

impl CallState {
    /// Wire name of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Incoming => "incoming",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    /// Whether `self -> next` is an edge of the call-state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::None | Self::Ended, Self::Incoming)
                | (Self::Incoming, Self::Active)
                | (Self::Incoming | Self::Active, Self::Ended)
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration and call-session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Whether the last known registration attempt succeeded.
    pub registered: bool,
    /// Most recent classified line or lifecycle transition.
    pub last_event: String,
    /// Instant of the last mutation.
    pub last_updated: DateTime<Utc>,
    /// Current call-session phase.
    pub call_state: CallState,
    /// Detail accompanying the last call-state transition.
    pub call_info: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            registered: false,
            last_event: INITIAL_EVENT.to_string(),
            last_updated: Utc::now(),
            call_state: CallState::None,
            call_info: None,
        }
    }
}

impl SessionState {
    /// Apply one classified event for `line`.
    ///
    /// Does not touch `last_updated`; the store stamps the whole update.
    pub fn apply_event(&mut self, event: LineEvent, line: &str) {
        match event {
            LineEvent::Registration(registration) => {
                self.apply_registration(registration, line);
            }
            LineEvent::Call(call) => {
                let next = call.target();
                if self.call_state != next && !self.call_state.can_transition_to(next) {
                    // The agent owns call state; mirror it anyway.
                    tracing::debug!(from = %self.call_state, to = %next, "Out-of-order call transition");
                }
                self.call_state = next;
                self.call_info = Some(line.to_string());
                self.last_event = line.to_string();
            }
            LineEvent::CallNotice => {
                self.last_event = line.to_string();
            }
        }
    }

    fn apply_registration(&mut self, event: RegistrationEvent, line: &str) {
        self.registered = event.registered();
        self.last_event = line.to_string();
    }
}
