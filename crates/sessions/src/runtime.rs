//! Session-backed runtime: delegates each message to the chat's cached
//! session and reports the response as the execution's completion.

use std::sync::Arc;

use {
    async_trait::async_trait,
    botline_channels::InboundMessage,
    botline_config::AgentConfig,
    botline_events::{EventBus, ExecutionEvent, ExecutionEventKind},
    botline_runtime::Runtime,
    tracing::debug,
};

use crate::SessionManager;

pub struct SessionRuntime {
    config: AgentConfig,
    manager: Arc<SessionManager>,
}

impl SessionRuntime {
    #[must_use]
    pub fn new(config: AgentConfig, manager: Arc<SessionManager>) -> Self {
        Self { config, manager }
    }
}

#[async_trait]
impl Runtime for SessionRuntime {
    async fn execute(
        &self,
        message: &InboundMessage,
        execution_id: &str,
        bus: &EventBus,
    ) -> botline_runtime::Result<()> {
        bus.publish(ExecutionEvent::now(
            execution_id,
            &message.channel_id,
            &message.chat_id,
            ExecutionEventKind::Start {
                agent_name: self.config.name.clone(),
            },
        ));

        let session =
            self.manager
                .get_or_create(&message.channel_id, &message.chat_id, &self.config.name);

        let response = session
            .send(&message.text, execution_id, bus)
            .await
            .map_err(|e| botline_runtime::Error::Message(e.to_string()))?;

        bus.publish(ExecutionEvent::now(
            execution_id,
            &message.channel_id,
            &message.chat_id,
            ExecutionEventKind::Complete {
                response: Some(response),
                exit_code: None,
            },
        ));

        debug!(
            execution_id,
            session_id = %session.session_id(),
            agent = %self.config.name,
            "session turn completed"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{AgentSession, Result, SessionFactory},
        std::time::Duration,
        tokio::sync::broadcast::error::TryRecvError,
    };

    struct CannedSession {
        session_id: String,
        response: Option<String>,
    }

    #[async_trait]
    impl AgentSession for CannedSession {
        fn session_id(&self) -> &str {
            &self.session_id
        }

        async fn send(
            &self,
            _user_text: &str,
            _execution_id: &str,
            _bus: &EventBus,
        ) -> Result<String> {
            self.response
                .clone()
                .ok_or_else(|| crate::Error::Backend("scripted failure".into()))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn runtime(response: Option<String>) -> SessionRuntime {
        let factory: SessionFactory = Box::new(move |_, _, _| {
            Arc::new(CannedSession {
                session_id: "s0".into(),
                response: response.clone(),
            })
        });
        let manager = Arc::new(SessionManager::new(Duration::from_secs(60), factory));
        let config = AgentConfig {
            name: "claude".into(),
            command: "claude".into(),
            ..AgentConfig::default()
        };
        SessionRuntime::new(config, manager)
    }

    fn inbound() -> InboundMessage {
        InboundMessage {
            channel_id: "mock".into(),
            chat_id: "1".into(),
            user_id: None,
            text: "hello".into(),
        }
    }

    #[tokio::test]
    async fn emits_start_then_complete_with_response() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let runtime = runtime(Some("the answer".into()));

        runtime.execute(&inbound(), "e1", &bus).await.unwrap();

        let first = rx.try_recv().unwrap();
        assert!(matches!(
            first.kind,
            ExecutionEventKind::Start { agent_name } if agent_name == "claude"
        ));
        let second = rx.try_recv().unwrap();
        assert!(matches!(
            second.kind,
            ExecutionEventKind::Complete { response: Some(r), .. } if r == "the answer"
        ));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn session_failure_propagates_without_terminal_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let runtime = runtime(None);

        assert!(runtime.execute(&inbound(), "e1", &bus).await.is_err());

        // Only the start event was published; the hub turns the returned
        // error into the terminal event.
        let first = rx.try_recv().unwrap();
        assert!(matches!(first.kind, ExecutionEventKind::Start { .. }));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
