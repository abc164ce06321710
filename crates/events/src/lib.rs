//! Execution lifecycle events and the in-process event bus.
//!
//! Every routed execution emits `start → (stdout|stderr)* → (complete|error)`
//! onto the bus. The hub's subscription updates the execution ledger and
//! forwards output toward the originating chat.

pub mod bus;

pub use bus::EventBus;

/// One immutable fact about an execution's lifecycle.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionEvent {
    pub execution_id: String,
    pub channel_id: String,
    pub chat_id: String,
    /// Unix epoch milliseconds.
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub kind: ExecutionEventKind,
}

/// Type-dependent event payload.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionEventKind {
    /// Execution accepted by a runtime.
    Start { agent_name: String },
    /// A fragment of the backend's success stream, as it arrived.
    Stdout { text: String },
    /// A fragment of the backend's diagnostic stream.
    Stderr { text: String },
    /// Normal termination. A non-zero exit code still completes.
    Complete {
        response: Option<String>,
        exit_code: Option<i32>,
    },
    /// Crash, spawn failure, timeout, or session failure.
    Error { reason: String },
}

impl ExecutionEvent {
    /// Build an event stamped with the current wall clock.
    #[must_use]
    pub fn now(
        execution_id: impl Into<String>,
        channel_id: impl Into<String>,
        chat_id: impl Into<String>,
        kind: ExecutionEventKind,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            channel_id: channel_id.into(),
            chat_id: chat_id.into(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            kind,
        }
    }

    /// Whether this event terminates its execution.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ExecutionEventKind::Complete { .. } | ExecutionEventKind::Error { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_tagged_kind() {
        let event = ExecutionEvent::now(
            "e1",
            "telegram",
            "42",
            ExecutionEventKind::Stdout {
                text: "hello".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "stdout");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["execution_id"], "e1");
    }

    #[test]
    fn terminal_classification() {
        let complete = ExecutionEvent::now(
            "e1",
            "c",
            "1",
            ExecutionEventKind::Complete {
                response: None,
                exit_code: Some(0),
            },
        );
        let stdout = ExecutionEvent::now("e1", "c", "1", ExecutionEventKind::Stdout {
            text: "x".into(),
        });
        assert!(complete.is_terminal());
        assert!(!stdout.is_terminal());
    }
}
