//! Channel adapter contract.
//!
//! An adapter owns one connection to a messaging platform: it pushes inbound
//! text messages into the hub and sends replies back out. Adapters carry no
//! orchestration logic.

pub mod adapter;
pub mod mock;

pub use {
    adapter::{ChannelAdapter, InboundMessage},
    mock::MockAdapter,
};

/// Typed channel errors shared across adapter implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Adapter used before `start()` or after `stop()`.
    #[error("channel not started: {channel_id}")]
    NotStarted { channel_id: String },

    /// Delivery to the platform failed. Best-effort; callers log and move on.
    #[error("channel send failed: {context}: {source}")]
    Send {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Connecting or subscribing to the platform failed.
    #[error("channel start failed: {context}: {source}")]
    Start {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn send(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Send {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn start(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Start {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
