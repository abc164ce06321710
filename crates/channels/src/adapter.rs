use {async_trait::async_trait, tokio::sync::mpsc};

use crate::Result;

/// One inbound text message from a chat.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    pub chat_id: String,
    pub user_id: Option<String>,
    pub text: String,
}

/// A connection to one messaging platform.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Stable channel identifier used for routing and ledger ownership.
    fn id(&self) -> &str;

    /// Begin receiving. Each inbound text message is pushed onto `inbound`,
    /// tagged with this adapter's id. May be long-running work spawned in
    /// the background; returns once receiving is established.
    async fn start(&self, inbound: mpsc::UnboundedSender<InboundMessage>) -> Result<()>;

    /// Best-effort delivery of `text` to `chat_id`.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;

    /// Stop receiving. Idempotent.
    async fn stop(&self);
}
