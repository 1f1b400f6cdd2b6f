//! Wire types for the HTTP surface.

use serde::{Deserialize, Serialize};
use sip_supervisor_session::KeyOutcome;

/// Reason given when a key press maps to no action.
pub const REASON_NOT_HANDLED: &str = "not-handled";
/// Reason given when the agent could not be reached.
pub const REASON_SEND_FAILED: &str = "send-failed";

/// Body of `POST /keypress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypressRequest {
    pub key: String,
}

/// Response to `POST /keypress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypressResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl KeypressResponse {
    #[must_use]
    pub const fn handled() -> Self {
        Self { ok: true, reason: None }
    }

    #[must_use]
    pub fn rejected(reason: &str) -> Self {
        Self {
            ok: false,
            reason: Some(reason.to_string()),
        }
    }
}

impl From<KeyOutcome> for KeypressResponse {
    fn from(outcome: KeyOutcome) -> Self {
        match outcome {
            KeyOutcome::Handled(_) => Self::handled(),
            KeyOutcome::NotHandled => Self::rejected(REASON_NOT_HANDLED),
            KeyOutcome::SendFailed(_) => Self::rejected(REASON_SEND_FAILED),
        }
    }
}

/// Error body for 4xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use sip_supervisor_core::AgentCommand;

    use super::*;

    #[test]
    fn test_handled_omits_reason() {
        let json = serde_json::to_string(&KeypressResponse::from(KeyOutcome::Handled(AgentCommand::Answer)))
            .unwrap();
        assert_eq!(json, r#"{"ok":true}"#);
    }

    #[test]
    fn test_not_handled_shape() {
        let json = serde_json::to_value(KeypressResponse::from(KeyOutcome::NotHandled)).unwrap();
        assert_eq!(json, serde_json::json!({"ok": false, "reason": "not-handled"}));
    }

    #[test]
    fn test_request_requires_string_key() {
        assert!(serde_json::from_str::<KeypressRequest>(r##"{"key": "#"}"##).is_ok());
        assert!(serde_json::from_str::<KeypressRequest>(r#"{"key": 5}"#).is_err());
        assert!(serde_json::from_str::<KeypressRequest>("{}").is_err());
    }
}
