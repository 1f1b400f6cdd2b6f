//! pjsua agent supervision.
//!
//! Provides:
//! - Line classifier for agent console output
//! - Command building and executable resolution
//! - Command channel into the agent's stdin
//! - Output pump and process supervisor

pub mod channel;
pub mod classifier;
pub mod command;
pub mod pump;
pub mod resolve;
pub mod supervisor;

pub use channel::CommandChannel;
pub use classifier::classify;
pub use command::{CommandBuilder, CommandParts};
pub use pump::StreamKind;
pub use supervisor::{AgentSupervisor, RunningAgent};
