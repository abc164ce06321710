//! Buffers streamed output per chat and flushes it on an interval, split
//! into bounded chunks, so chat channels are not flooded with one message
//! per output line.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

/// Destination for flushed chunks.
#[async_trait]
pub trait ChunkSender: Send + Sync {
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

struct BufferState {
    text: String,
    pending: Option<CancellationToken>,
}

struct Shared {
    flush_interval: Duration,
    max_chunk_len: usize,
    sender: Arc<dyn ChunkSender>,
    buffer: Mutex<BufferState>,
    /// Serializes flushes so chunks reach the channel in order.
    send_lock: tokio::sync::Mutex<()>,
}

pub struct ChunkThrottler {
    shared: Arc<Shared>,
}

impl ChunkThrottler {
    #[must_use]
    pub fn new(flush_interval: Duration, max_chunk_len: usize, sender: Arc<dyn ChunkSender>) -> Self {
        Self {
            shared: Arc::new(Shared {
                flush_interval,
                max_chunk_len: max_chunk_len.max(1),
                sender,
                buffer: Mutex::new(BufferState {
                    text: String::new(),
                    pending: None,
                }),
                send_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Append text to the buffer. Consecutive pushes within one interval
    /// coalesce into a single flush.
    pub fn push(&self, text: &str) {
        let token = {
            let mut state = self
                .shared
                .buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.text.push_str(text);
            if state.pending.is_some() {
                return;
            }
            let token = CancellationToken::new();
            state.pending = Some(token.clone());
            token
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {},
                () = tokio::time::sleep(shared.flush_interval) => {
                    Self::flush_shared(&shared).await;
                },
            }
        });
    }

    /// Flush whatever is buffered right now.
    pub async fn flush(&self) {
        Self::flush_shared(&self.shared).await;
    }

    async fn flush_shared(shared: &Arc<Shared>) {
        // The buffer is drained under the send lock, so a flush racing an
        // in-flight one cannot snapshot later text and deliver it first.
        let _guard = shared.send_lock.lock().await;
        let text = {
            let mut state = shared.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(token) = state.pending.take() {
                token.cancel();
            }
            std::mem::take(&mut state.text)
        };
        if text.is_empty() {
            return;
        }

        for chunk in split_chunks(&text, shared.max_chunk_len) {
            if let Err(err) = shared.sender.send(&chunk).await {
                warn!(error = %err, "failed to deliver output chunk");
            }
        }
    }

    /// Drop buffered text and cancel any pending flush.
    pub fn destroy(&self) {
        let mut state = self
            .shared
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = state.pending.take() {
            token.cancel();
        }
        state.text.clear();
    }
}

/// Split on char boundaries into pieces of at most `max_len` chars.
fn split_chunks(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        if count == max_len {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
