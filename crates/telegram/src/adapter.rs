use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use botline_channels::{ChannelAdapter, Error, InboundMessage, Result};

/// One bot account, polled with manual `getUpdates`.
pub struct TelegramAdapter {
    id: String,
    bot: Bot,
    cancel: CancellationToken,
}

impl TelegramAdapter {
    /// Build the underlying bot client. The HTTP timeout is longer than the
    /// 30s long-polling timeout so the client never aborts a poll that
    /// Telegram is still holding open.
    pub fn new(id: impl Into<String>, token: &Secret<String>) -> Result<Self> {
        let id = id.into();
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(|e| Error::start(format!("building http client for '{id}'"), e))?;
        let bot = Bot::with_client(token.expose_secret(), client);
        Ok(Self {
            id,
            bot,
            cancel: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, inbound: mpsc::UnboundedSender<InboundMessage>) -> Result<()> {
        // Long polling only works without a registered webhook.
        self.bot
            .delete_webhook()
            .send()
            .await
            .map_err(|e| Error::start(format!("clearing webhook for '{}'", self.id), e))?;

        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| Error::start(format!("verifying credentials for '{}'", self.id), e))?;
        info!(
            channel_id = %self.id,
            username = ?me.username,
            "telegram bot connected"
        );

        let bot = self.bot.clone();
        let channel_id = self.id.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut offset: i32 = 0;

            loop {
                if cancel.is_cancelled() {
                    info!(channel_id, "telegram polling stopped");
                    break;
                }

                let result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(30)
                    .allowed_updates(vec![AllowedUpdate::Message])
                    .await;

                match result {
                    Ok(updates) => {
                        for update in updates {
                            offset = update.id.as_offset();
                            match update.kind {
                                UpdateKind::Message(msg) => {
                                    let Some(text) = msg.text() else {
                                        debug!(
                                            channel_id,
                                            chat_id = msg.chat.id.0,
                                            "ignoring non-text message"
                                        );
                                        continue;
                                    };
                                    let message = InboundMessage {
                                        channel_id: channel_id.clone(),
                                        chat_id: msg.chat.id.0.to_string(),
                                        user_id: msg
                                            .from
                                            .as_ref()
                                            .map(|user| user.id.0.to_string()),
                                        text: text.to_string(),
                                    };
                                    if inbound.send(message).is_err() {
                                        // Hub side dropped the receiver.
                                        cancel.cancel();
                                        break;
                                    }
                                },
                                other => {
                                    debug!(channel_id, "ignoring non-message update: {other:?}");
                                },
                            }
                        }
                    },
                    Err(e) => {
                        warn!(channel_id, error = %e, "telegram getUpdates failed");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    },
                }
            }
        });

        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let numeric: i64 = chat_id
            .parse()
            .map_err(|e| Error::send(format!("invalid telegram chat id '{chat_id}'"), e))?;
        self.bot
            .send_message(ChatId(numeric), text)
            .await
            .map_err(|e| Error::send(format!("sending to chat '{chat_id}'"), e))?;
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
    }
}
