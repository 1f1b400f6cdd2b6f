//! Semantic events derived from agent output lines.

use crate::CallState;

/// Registration outcome reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// Registrar accepted the account.
    Succeeded,
    /// Registrar rejected the account or the agent gave up.
    Failed,
    /// A previously successful registration lapsed.
    Expired,
}

impl RegistrationEvent {
    /// Value of `registered` after this event is applied.
    #[must_use]
    pub const fn registered(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Call-session transition reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Incoming,
    Active,
    Ended,
}

impl CallEvent {
    /// Call state this event moves the session into.
    #[must_use]
    pub const fn target(self) -> CallState {
        match self {
            Self::Incoming => CallState::Incoming,
            Self::Active => CallState::Active,
            Self::Ended => CallState::Ended,
        }
    }
}

/// A single event classified from one line of agent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    Registration(RegistrationEvent),
    Call(CallEvent),
    /// Call-related chatter with no state transition; only `last_event` changes.
    CallNotice,
}

impl From<RegistrationEvent> for LineEvent {
    fn from(event: RegistrationEvent) -> Self {
        Self::Registration(event)
    }
}

impl From<CallEvent> for LineEvent {
    fn from(event: CallEvent) -> Self {
        Self::Call(event)
    }
}
