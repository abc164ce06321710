//! The orchestration layer: route inbound chat messages to agent runtimes,
//! track executions in an in-memory ledger, and pace streamed output back to
//! rate-limited transports.

pub mod agents;
pub mod hub;
pub mod ledger;
pub mod router;
pub mod throttle;

pub use {
    agents::AgentRegistry,
    hub::{BuiltinCommand, ChannelHub, parse_builtin_command},
    ledger::{ExecutionLedger, ExecutionRecord, ExecutionStatus},
    router::Router,
    throttle::{ChunkSender, ChunkThrottler},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two adapters configured with the same channel id.
    #[error("duplicate channel id '{0}' in channel configuration")]
    DuplicateChannel(String),

    /// Two runtimes registered under one agent name.
    #[error("runtime '{0}' is already registered")]
    DuplicateAgent(String),

    /// The configured default agent has no registered runtime.
    #[error("default runtime '{0}' is not registered")]
    DefaultNotRegistered(String),

    #[error("no runtimes registered")]
    NoRuntimes,
}

pub type Result<T> = std::result::Result<T, Error>;
