//! One-shot process execution: fire, stream, terminate.

use std::sync::Arc;

use {
    async_trait::async_trait,
    botline_channels::InboundMessage,
    botline_config::AgentConfig,
    botline_events::{EventBus, ExecutionEvent, ExecutionEventKind},
    tracing::info,
};

use crate::{
    ChunkSink, CommandRunner, CommandSpec, Error, Result, Runtime, StreamKind,
};

pub struct CliRuntime {
    config: AgentConfig,
    runner: Arc<dyn CommandRunner>,
}

impl CliRuntime {
    #[must_use]
    pub fn new(config: AgentConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }
}

#[async_trait]
impl Runtime for CliRuntime {
    async fn execute(
        &self,
        message: &InboundMessage,
        execution_id: &str,
        bus: &EventBus,
    ) -> Result<()> {
        if self.config.command.is_empty() {
            return Err(Error::Message(
                "agent command is required for the cli runtime".to_string(),
            ));
        }

        bus.publish(ExecutionEvent::now(
            execution_id,
            &message.channel_id,
            &message.chat_id,
            ExecutionEventKind::Start {
                agent_name: self.config.name.clone(),
            },
        ));

        let sink: ChunkSink = {
            let bus = bus.clone();
            let execution_id = execution_id.to_string();
            let channel_id = message.channel_id.clone();
            let chat_id = message.chat_id.clone();
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

        info!(
            execution_id,
            command = %self.config.command,
            "spawning cli runtime"
        );

        let spec = CommandSpec::from_agent(&self.config);
        let result = self
            .runner
            .run(&spec, Some(format!("{}\n", message.text)), Some(sink))
            .await;

        match result {
            Ok(output) => {
                bus.publish(ExecutionEvent::now(
                    execution_id,
                    &message.channel_id,
                    &message.chat_id,
                    ExecutionEventKind::Complete {
                        response: None,
                        exit_code: output.exit_code,
                    },
                ));
                Ok(())
            },
            Err(err) => {
                bus.publish(ExecutionEvent::now(
                    execution_id,
                    &message.channel_id,
                    &message.chat_id,
                    ExecutionEventKind::Error {
                        reason: err.to_string(),
                    },
                ));
                Err(err)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::ProcessRunner,
        tokio::sync::broadcast::error::TryRecvError,
    };

    fn agent(command: &str) -> AgentConfig {
        AgentConfig {
            name: "echo".into(),
            command: command.into(),
            ..AgentConfig::default()
        }
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            channel_id: "mock".into(),
            chat_id: "1".into(),
            user_id: None,
            text: text.into(),
        }
    }

    async fn drain(bus: &EventBus, run: impl Future<Output = Result<()>>) -> Vec<ExecutionEvent> {
        let mut rx = bus.subscribe();
        let _ = run.await;
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(e) => panic!("receiver lagged: {e}"),
            }
        }
        events
    }

    #[tokio::test]
    async fn emits_start_stream_complete() {
        let bus = EventBus::new();
        let runtime = CliRuntime::new(agent("cat"), Arc::new(ProcessRunner));
        let message = inbound("hello runtime");

        let events = drain(&bus, runtime.execute(&message, "e1", &bus)).await;

        assert!(matches!(
            events.first().map(|e| &e.kind),
            Some(ExecutionEventKind::Start { agent_name }) if agent_name == "echo"
        ));
        let streamed: String = events
            .iter()
            .filter_map(|e| match &e.kind {
                ExecutionEventKind::Stdout { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "hello runtime\n");
        assert!(matches!(
            events.last().map(|e| &e.kind),
            Some(ExecutionEventKind::Complete {
                exit_code: Some(0),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn nonzero_exit_still_completes() {
        let bus = EventBus::new();
        let runtime = CliRuntime::new(agent("exit 7"), Arc::new(ProcessRunner));

        let events = drain(&bus, runtime.execute(&inbound("x"), "e1", &bus)).await;

        assert!(matches!(
            events.last().map(|e| &e.kind),
            Some(ExecutionEventKind::Complete {
                exit_code: Some(7),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn timeout_emits_error_and_fails() {
        let bus = EventBus::new();
        let mut config = agent("sleep 30");
        config.timeout_ms = 100;
        let runtime = CliRuntime::new(config, Arc::new(ProcessRunner));

        let mut rx = bus.subscribe();
        let result = runtime.execute(&inbound("x"), "e1", &bus).await;
        assert!(matches!(result, Err(Error::Timeout)));

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert!(matches!(
            last.map(|e| e.kind),
            Some(ExecutionEventKind::Error { reason }) if reason == "Runtime timeout."
        ));
    }

    #[tokio::test]
    async fn empty_command_fails_before_start_event() {
        let bus = EventBus::new();
        let runtime = CliRuntime::new(agent(""), Arc::new(ProcessRunner));

        let mut rx = bus.subscribe();
        assert!(runtime.execute(&inbound("x"), "e1", &bus).await.is_err());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
