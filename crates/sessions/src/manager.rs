//! In-memory session cache with lazy idle eviction.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use {
    tokio::time::Instant,
    tracing::{debug, warn},
};

use crate::{AgentSession, SessionKey};

/// Builds a session for a cache miss. Selected per agent at wiring time.
pub type SessionFactory =
    Box<dyn Fn(&str, &str, &str) -> Arc<dyn AgentSession> + Send + Sync>;

struct Entry {
    session: Arc<dyn AgentSession>,
    last_used_at: Instant,
}

pub struct SessionManager {
    entries: Mutex<HashMap<SessionKey, Entry>>,
    idle_timeout: Duration,
    factory: SessionFactory,
}

impl SessionManager {
    #[must_use]
    pub fn new(idle_timeout: Duration, factory: SessionFactory) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_timeout,
            factory,
        }
    }

    /// Return the live session for the key, creating it on a miss. Sweeps
    /// idle entries first; their `close()` runs on detached tasks and a
    /// close failure never reaches this caller.
    pub fn get_or_create(
        &self,
        channel_id: &str,
        chat_id: &str,
        agent_name: &str,
    ) -> Arc<dyn AgentSession> {
        self.evict_idle();

        let key = SessionKey {
            channel_id: channel_id.to_string(),
            chat_id: chat_id.to_string(),
            agent_name: agent_name.to_string(),
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&key) {
            entry.last_used_at = Instant::now();
            return Arc::clone(&entry.session);
        }

        let session = (self.factory)(channel_id, chat_id, agent_name);
        debug!(
            session_id = %session.session_id(),
            channel_id,
            chat_id,
            agent_name,
            "created new session"
        );
        entries.insert(key, Entry {
            session: Arc::clone(&session),
            last_used_at: Instant::now(),
        });
        session
    }

    /// Close and evict every session for one chat, across all agents.
    pub async fn close(&self, channel_id: &str, chat_id: &str) {
        let removed: Vec<_> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let keys: Vec<_> = entries
                .keys()
                .filter(|k| k.channel_id == channel_id && k.chat_id == chat_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k))
                .collect()
        };

        for entry in removed {
            close_logged(entry.session).await;
        }
    }

    /// Shutdown sweep: close everything.
    pub async fn close_all(&self) {
        let removed: Vec<_> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.drain().map(|(_, entry)| entry).collect()
        };

        for entry in removed {
            close_logged(entry.session).await;
        }
    }

    /// Evict entries idle beyond the timeout. Eviction and creation race on
    /// the same key is resolved last-factory-wins: the evicted session's
    /// close is fire-and-forget and never blocks a fresh creation.
    fn evict_idle(&self) {
        let now = Instant::now();
        let stale: Vec<_> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let keys: Vec<_> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_used_at) > self.idle_timeout)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k))
                .collect()
        };

        for entry in stale {
            debug!(session_id = %entry.session.session_id(), "evicting idle session");
            tokio::spawn(close_logged(entry.session));
        }
    }
}

async fn close_logged(session: Arc<dyn AgentSession>) {
    if let Err(err) = session.close().await {
        warn!(
            session_id = %session.session_id(),
            error = %err,
            "failed to close session"
        );
    }
}
