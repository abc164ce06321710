//! Execution backends.
//!
//! A [`Runtime`] takes one routed inbound message and drives it to a
//! terminal lifecycle event on the bus. The one-shot [`CliRuntime`] lives
//! here; the session-backed runtime lives in `botline-sessions` and shares
//! the same process-execution port.

pub mod cli;
pub mod process;

pub use {
    cli::CliRuntime,
    process::{ChunkSink, CommandOutput, CommandRunner, CommandSpec, ProcessRunner, StreamKind},
};

use {async_trait::async_trait, botline_channels::InboundMessage, botline_events::EventBus};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured timeout expired and the process was killed.
    #[error("Runtime timeout.")]
    Timeout,

    /// The backend process could not be started.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A backend capable of executing one routed message.
///
/// `execute` resolves once the execution reaches a terminal event. An `Err`
/// means the pipeline failed (crash, non-launch, timeout); a non-zero exit
/// code of a backend process is reported via `Complete` and is `Ok`.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn execute(
        &self,
        message: &InboundMessage,
        execution_id: &str,
        bus: &EventBus,
    ) -> Result<()>;
}
