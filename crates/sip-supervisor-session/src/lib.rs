//! Agent lifecycle orchestration and call control.
//!
//! Provides:
//! - `SupervisorManager` - Launch, supervise and stop the agent
//! - `CallController` - Keypad policy for answering and hanging up

pub mod controller;
pub mod manager;

pub use controller::{CallController, KeyOutcome};
pub use manager::{ManagerError, RunOutcome, SupervisorManager};
