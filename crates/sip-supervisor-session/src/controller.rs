//! Keypad call control.

use std::sync::Arc;

use sip_supervisor_core::{AgentCommand, CallState, CommandSink, StateStore};

/// The only key that drives call control.
pub const CONTROL_KEY: &str = "#";
/// Event recorded when a ringing call is answered from the keypad.
pub const ANSWERED_EVENT: &str = "answered-via-key";
/// Event recorded when an active call is hung up from the keypad.
pub const HANGUP_EVENT: &str = "hangup-via-key";

/// Result of a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The command was delivered to the agent.
    Handled(AgentCommand),
    /// The key or the current call state does not map to an action.
    NotHandled,
    /// The action applied but the agent could not be reached.
    SendFailed(AgentCommand),
}

/// Applies the keypad policy against the current call state.
pub struct CallController {
    store: Arc<StateStore>,
    sink: Arc<dyn CommandSink>,
}

impl CallController {
    /// Create a controller over `store` that sends through `sink`.
    #[must_use]
    pub fn new(store: Arc<StateStore>, sink: Arc<dyn CommandSink>) -> Self {
        Self { store, sink }
    }

    /// Shared state store.
    #[must_use]
    pub const fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Handle a key press.
    ///
    /// `#` answers a ringing call and hangs up an active one. The local
    /// call state only moves after the command was delivered, and only if
    /// the agent's own output has not moved it in the meantime.
    pub async fn handle_key(&self, key: &str) -> KeyOutcome {
        if key != CONTROL_KEY {
            return KeyOutcome::NotHandled;
        }

        let current = self.store.snapshot().call_state;
        let (command, next, event) = match current {
            CallState::Incoming => (AgentCommand::Answer, CallState::Active, ANSWERED_EVENT),
            CallState::Active => (AgentCommand::HangUp, CallState::Ended, HANGUP_EVENT),
            CallState::None | CallState::Ended => return KeyOutcome::NotHandled,
        };

        if !self.sink.send_command(command).await {
            return KeyOutcome::SendFailed(command);
        }

        if !self.store.transition_call(current, next, event) {
            tracing::debug!(from = %current, "Call state changed while command was in flight");
        }
        KeyOutcome::Handled(command)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sip_supervisor_core::CallEvent;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        fail: bool,
        sent: Mutex<Vec<AgentCommand>>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send_command(&self, command: AgentCommand) -> bool {
            self.sent.lock().unwrap().push(command);
            !self.fail
        }
    }

    fn controller(state: CallState, fail: bool) -> (CallController, Arc<StateStore>, Arc<RecordingSink>) {
        let store = Arc::new(StateStore::new());
        match state {
            CallState::None => {}
            CallState::Incoming => {
                store.apply_line("Incoming call", &[CallEvent::Incoming.into()]);
            }
            CallState::Active => {
                store.apply_line("Call established", &[CallEvent::Active.into()]);
            }
            CallState::Ended => {
                store.apply_line("Call ended", &[CallEvent::Ended.into()]);
            }
        }
        let sink = Arc::new(RecordingSink {
            fail,
            ..RecordingSink::default()
        });
        let controller = CallController::new(Arc::clone(&store), sink.clone());
        (controller, store, sink)
    }

    #[tokio::test]
    async fn test_answer_incoming() {
        let (controller, store, sink) = controller(CallState::Incoming, false);
        assert_eq!(controller.handle_key("#").await, KeyOutcome::Handled(AgentCommand::Answer));

        let state = store.snapshot();
        assert_eq!(state.call_state, CallState::Active);
        assert_eq!(state.last_event, ANSWERED_EVENT);
        assert_eq!(*sink.sent.lock().unwrap(), [AgentCommand::Answer]);
    }

    #[tokio::test]
    async fn test_hangup_active() {
        let (controller, store, _) = controller(CallState::Active, false);
        assert_eq!(controller.handle_key("#").await, KeyOutcome::Handled(AgentCommand::HangUp));

        let state = store.snapshot();
        assert_eq!(state.call_state, CallState::Ended);
        assert_eq!(state.last_event, HANGUP_EVENT);
    }

    #[tokio::test]
    async fn test_idle_states_not_handled() {
        for idle in [CallState::None, CallState::Ended] {
            let (controller, store, sink) = controller(idle, false);
            let before = store.snapshot();
            assert_eq!(controller.handle_key("#").await, KeyOutcome::NotHandled);
            assert_eq!(store.snapshot(), before);
            assert!(sink.sent.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_other_keys_not_handled() {
        let (controller, store, sink) = controller(CallState::Incoming, false);
        for key in ["1", "*", "", "##", " #"] {
            assert_eq!(controller.handle_key(key).await, KeyOutcome::NotHandled);
        }
        assert_eq!(store.snapshot().call_state, CallState::Incoming);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_leaves_state() {
        let (controller, store, _) = controller(CallState::Incoming, true);
        let before = store.snapshot();
        assert_eq!(controller.handle_key("#").await, KeyOutcome::SendFailed(AgentCommand::Answer));
        assert_eq!(store.snapshot(), before);
    }
}
