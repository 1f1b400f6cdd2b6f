//! Best-effort classification of agent console lines.
//!
//! Rules are plain data evaluated top-to-bottom; the first matching rule of
//! each axis wins. Matching is case-insensitive substring search, so lines
//! the agent was never tuned for simply fall through with no event.

use sip_supervisor_core::{CallEvent, LineEvent, RegistrationEvent};

/// Substring pattern over a lowercased line.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Any one of the needles occurs.
    Any(&'static [&'static str]),
    /// Every needle occurs.
    All(&'static [&'static str]),
    /// The first needle occurs together with any of the rest.
    WithAny(&'static str, &'static [&'static str]),
}

impl Pattern {
    /// Whether `line` (already lowercased) matches.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::Any(needles) => needles.iter().any(|n| line.contains(n)),
            Self::All(needles) => needles.iter().all(|n| line.contains(n)),
            Self::WithAny(required, needles) => {
                line.contains(required) && needles.iter().any(|n| line.contains(n))
            }
        }
    }
}

/// Registration rules, highest priority first.
pub const REGISTRATION_RULES: &[(Pattern, RegistrationEvent)] = &[
    (Pattern::Any(&["registration complete"]), RegistrationEvent::Succeeded),
    (Pattern::All(&["registered", "status=200"]), RegistrationEvent::Succeeded),
    (Pattern::Any(&["registration failed"]), RegistrationEvent::Failed),
    (Pattern::WithAny("status=", &["401", "403", "407"]), RegistrationEvent::Failed),
    (
        Pattern::Any(&["unregistered", "registration refresh failed"]),
        RegistrationEvent::Failed,
    ),
    (Pattern::Any(&["registration expired"]), RegistrationEvent::Expired),
];

/// Call-state rules, highest priority first.
///
/// Teardown is checked before establishment: "disconnected" contains
/// "connected".
pub const CALL_RULES: &[(Pattern, CallEvent)] = &[
    (Pattern::Any(&["incoming call", "call from", "ringing"]), CallEvent::Incoming),
    (
        Pattern::Any(&["disconnected", "call is terminated", "hangup", "call ended"]),
        CallEvent::Ended,
    ),
    (Pattern::Any(&["established", "call answered", "connected"]), CallEvent::Active),
];

/// Lines mentioning this with no other event still update `last_event`.
const CALL_NOTICE: &str = "call";

fn first_match<E: Copy>(rules: &[(Pattern, E)], line: &str) -> Option<E> {
    rules
        .iter()
        .find(|(pattern, _)| pattern.matches(line))
        .map(|(_, event)| *event)
}

/// Classify one decoded, trimmed line.
///
/// Yields at most one registration event and one call event, in that order.
#[must_use]
pub fn classify(line: &str) -> Vec<LineEvent> {
    let lower = line.to_lowercase();
    let mut events = Vec::with_capacity(2);

    if let Some(event) = first_match(REGISTRATION_RULES, &lower) {
        events.push(LineEvent::Registration(event));
    }
    if let Some(event) = first_match(CALL_RULES, &lower) {
        events.push(LineEvent::Call(event));
    }
    if events.is_empty() && lower.contains(CALL_NOTICE) {
        events.push(LineEvent::CallNotice);
    }

    events
}
