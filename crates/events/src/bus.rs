use tokio::sync::broadcast;

use crate::ExecutionEvent;

const BUS_CAPACITY: usize = 1024;

/// In-process publish/subscribe channel for execution lifecycle events.
///
/// Owned by the hub as a value (never a process-wide singleton) so multiple
/// hubs can coexist in tests without cross-talk. Events are delivered to each
/// subscriber in publish order; there is no ordering guarantee across
/// subscribers and no persistence.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Publishing with no live subscribers is a no-op.
    pub fn publish(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::ExecutionEventKind,
    };

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        for i in 0..3 {
            bus.publish(ExecutionEvent::now("e1", "c", "1", ExecutionEventKind::Stdout {
                text: format!("chunk {i}"),
            }));
        }

        for i in 0..3 {
            let event = rx.recv().await.unwrap();
            match event.kind {
                ExecutionEventKind::Stdout { text } => {
                    assert_eq!(text, format!("chunk {i}"));
                },
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(ExecutionEvent::now("e1", "c", "1", ExecutionEventKind::Error {
            reason: "ignored".into(),
        }));
    }

    #[tokio::test]
    async fn independent_buses_do_not_cross_talk() {
        let bus_a = EventBus::new();
        let bus_b = EventBus::new();
        let mut rx_b = bus_b.subscribe();

        bus_a.publish(ExecutionEvent::now("e1", "c", "1", ExecutionEventKind::Stdout {
            text: "a only".into(),
        }));

        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
