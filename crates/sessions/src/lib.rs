//! Conversational continuity across process invocations.
//!
//! A session gives one (channel, chat, agent) a multi-turn conversation with
//! a stateful CLI backend. Two strategies exist behind one trait: native
//! resume (the backend issues a resume token) and transcript replay (the
//! client re-sends rendered history each turn). The [`SessionManager`]
//! caches live sessions and evicts idle ones.

pub mod manager;
pub mod resume;
pub mod runtime;
pub mod transcript;

pub use {
    manager::{SessionFactory, SessionManager},
    resume::NativeResumeSession,
    runtime::SessionRuntime,
    transcript::{Role, TranscriptSession, Turn, build_prompt},
};

use {async_trait::async_trait, botline_events::EventBus};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend exited non-zero; the message carries its stderr (or the
    /// exit code when stderr was empty).
    #[error("{0}")]
    Backend(String),

    #[error(transparent)]
    Runtime(#[from] botline_runtime::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Cache key for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub channel_id: String,
    pub chat_id: String,
    pub agent_name: String,
}

/// One strategy for carrying a conversation across backend invocations.
///
/// Strategy-specific state (resume token vs. turn list) stays private to
/// each implementation.
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Opaque id generated at session creation, for logging.
    fn session_id(&self) -> &str;

    /// Run one conversation turn and return the cleaned response text.
    async fn send(&self, user_text: &str, execution_id: &str, bus: &EventBus) -> Result<String>;

    /// Release backend state. Called on eviction and shutdown.
    async fn close(&self) -> Result<()>;
}
