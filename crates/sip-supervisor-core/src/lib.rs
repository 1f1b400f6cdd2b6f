//! Core abstractions for supervising an external SIP user agent.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionState` - Registration and call-session snapshot
//! - `StateStore` - Lock-guarded state with a single atomic update entry point
//! - `LineEvent` - Semantic events classified from agent output
//! - `SupervisorConfig` - Environment-driven configuration
//! - `CommandSink` trait and launch errors

pub mod config;
pub mod event;
pub mod state;
pub mod store;
pub mod traits;

pub use config::{AgentSettings, ConfigError, SipCredentials, SupervisorConfig};
pub use event::{CallEvent, LineEvent, RegistrationEvent};
pub use state::{CallState, SessionState};
pub use store::StateStore;
pub use traits::{AgentCommand, CommandSink, LaunchError, StartError};
