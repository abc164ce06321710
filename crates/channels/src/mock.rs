//! In-process adapter for tests: records outbound messages and lets the
//! caller inject inbound ones.

use std::sync::Mutex;

use {async_trait::async_trait, tokio::sync::mpsc};

use crate::{
    Error, Result,
    adapter::{ChannelAdapter, InboundMessage},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
}

pub struct MockAdapter {
    id: String,
    inbound: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockAdapter {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inbound: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Inject an inbound message as if the platform delivered it.
    pub fn simulate_incoming(&self, chat_id: &str, text: &str) -> Result<()> {
        let guard = self.inbound.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(Error::NotStarted {
                channel_id: self.id.clone(),
            });
        };
        let _ = tx.send(InboundMessage {
            channel_id: self.id.clone(),
            chat_id: chat_id.to_string(),
            user_id: None,
            text: text.to_string(),
        });
        Ok(())
    }

    /// Everything sent through this adapter so far, in send order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChannelAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, inbound: mpsc::UnboundedSender<InboundMessage>) -> Result<()> {
        *self.inbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(inbound);
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
            });
        Ok(())
    }

    async fn stop(&self) {
        *self.inbound.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
