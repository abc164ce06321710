//! Transcript-replay strategy: the backend is stateless turn to turn, so
//! each prompt is prefixed with the rendered conversation so far.

use std::sync::Arc;

use {
    async_trait::async_trait,
    botline_common::text::strip_ansi,
    botline_config::AgentConfig,
    botline_events::{EventBus, ExecutionEvent, ExecutionEventKind},
    botline_runtime::{ChunkSink, CommandRunner, CommandSpec, StreamKind},
};

use crate::{AgentSession, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Render the prompt for one turn. With no history the user text is sent
/// verbatim.
#[must_use]
pub fn build_prompt(turns: &[Turn], user_text: &str) -> String {
    if turns.is_empty() {
        return user_text.to_string();
    }

    let history = turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{role}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("Previous conversation:\n{history}\n\nUser: {user_text}")
}

pub struct TranscriptSession {
    session_id: String,
    channel_id: String,
    chat_id: String,
    config: AgentConfig,
    runner: Arc<dyn CommandRunner>,
    turns: tokio::sync::Mutex<Vec<Turn>>,
}

impl TranscriptSession {
    #[must_use]
    pub fn new(
        channel_id: impl Into<String>,
        chat_id: impl Into<String>,
        config: AgentConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            chat_id: chat_id.into(),
            config,
            runner,
            turns: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentSession for TranscriptSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(&self, user_text: &str, execution_id: &str, bus: &EventBus) -> Result<String> {
        let mut turns = self.turns.lock().await;
        let prompt = build_prompt(&turns, user_text);

        let mut spec = CommandSpec::from_agent(&self.config);
        spec.args.push("-p".to_string());
        spec.args.push(prompt);

        let sink: ChunkSink = {
            let bus = bus.clone();
            let execution_id = execution_id.to_string();
            let channel_id = self.channel_id.clone();
            let chat_id = self.chat_id.clone();
            Arc::new(move |kind, text| {
                let kind = match kind {
                    StreamKind::Stdout => ExecutionEventKind::Stdout {
                        text: text.to_string(),
                    },
                    StreamKind::Stderr => ExecutionEventKind::Stderr {
                        text: text.to_string(),
                    },
                };
                bus.publish(ExecutionEvent::now(
                    &execution_id,
                    &channel_id,
                    &chat_id,
                    kind,
                ));
            })
        };

        // No retry-without-history fallback: a failure surfaces immediately.
        let output = self.runner.run(&spec, None, Some(sink)).await?;
        if output.exit_code != Some(0) {
            let reason = if output.stderr.trim().is_empty() {
                match output.exit_code {
                    Some(code) => format!("backend exited with code {code}"),
                    None => "backend terminated by signal".to_string(),
                }
            } else {
                output.stderr.trim().to_string()
            };
            return Err(Error::Backend(reason));
        }

        let response = strip_ansi(&output.stdout).trim().to_string();

        turns.push(Turn {
            role: Role::User,
            content: user_text.to_string(),
        });
        turns.push(Turn {
            role: Role::Assistant,
            content: response.clone(),
        });
        let max_entries = self.config.max_turns.saturating_mul(2);
        if turns.len() > max_entries {
            let excess = turns.len() - max_entries;
            turns.drain(..excess);
        }

        Ok(response)
    }

    async fn close(&self) -> Result<()> {
        self.turns.lock().await.clear();
        Ok(())
    }
}
