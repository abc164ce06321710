//! In-memory record of recent executions, backing `/status`, `/logs` and
//! `/list`.
//!
//! Records hold a bounded tail of cleaned output lines. Terminal records
//! expire after a TTL; running records are never pruned.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use botline_common::text::clean_lines;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub channel_id: String,
    pub chat_id: String,
    pub agent_name: String,
    pub status: ExecutionStatus,
    pub started_at_ms: i64,
    pub finished_at_ms: Option<i64>,
    pub output_lines: Vec<String>,
    pub error_reason: Option<String>,
}

type NowFn = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct ExecutionLedger {
    records: Mutex<HashMap<String, ExecutionRecord>>,
    max_lines: usize,
    ttl_ms: i64,
    now: NowFn,
}

impl ExecutionLedger {
    #[must_use]
    pub fn new(max_lines: usize, ttl_ms: i64) -> Self {
        Self::with_now(max_lines, ttl_ms, Box::new(|| chrono::Utc::now().timestamp_millis()))
    }

    #[must_use]
    pub fn with_now(max_lines: usize, ttl_ms: i64, now: NowFn) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_lines,
            ttl_ms,
            now,
        }
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        (self.now)()
    }

    /// Record a new running execution, stamped with the triggering event's
    /// timestamp.
    pub fn start(
        &self,
        execution_id: &str,
        channel_id: &str,
        chat_id: &str,
        agent_name: &str,
        at_ms: i64,
    ) {
        let now = self.now_ms();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Self::prune(&mut records, now, self.ttl_ms);
        records.insert(
            execution_id.to_string(),
            ExecutionRecord {
                execution_id: execution_id.to_string(),
                channel_id: channel_id.to_string(),
                chat_id: chat_id.to_string(),
                agent_name: agent_name.to_string(),
                status: ExecutionStatus::Running,
                started_at_ms: at_ms,
                finished_at_ms: None,
                output_lines: Vec::new(),
                error_reason: None,
            },
        );
    }

    /// Append output to a running record. Appends after a terminal
    /// transition are dropped.
    pub fn append(&self, execution_id: &str, text: &str) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = records.get_mut(execution_id) else {
            return;
        };
        if record.status != ExecutionStatus::Running {
            return;
        }
        record.output_lines.extend(clean_lines(text));
        if record.output_lines.len() > self.max_lines {
            let excess = record.output_lines.len() - self.max_lines;
            record.output_lines.drain(..excess);
        }
    }

    /// Mark a record complete. Returns true only on the first transition
    /// out of `Running`.
    pub fn complete(&self, execution_id: &str, at_ms: i64) -> bool {
        self.finish(execution_id, ExecutionStatus::Complete, None, at_ms)
    }

    /// Mark a record failed. Returns true only on the first transition out
    /// of `Running`.
    pub fn error(&self, execution_id: &str, reason: &str, at_ms: i64) -> bool {
        self.finish(execution_id, ExecutionStatus::Error, Some(reason.to_string()), at_ms)
    }

    fn finish(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        reason: Option<String>,
        at_ms: i64,
    ) -> bool {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = records.get_mut(execution_id) else {
            return false;
        };
        if record.status != ExecutionStatus::Running {
            return false;
        }
        record.status = status;
        record.finished_at_ms = Some(at_ms);
        record.error_reason = reason;
        true
    }

    #[must_use]
    pub fn get(&self, execution_id: &str) -> Option<ExecutionRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(execution_id).cloned()
    }

    /// Records for one chat, newest first.
    #[must_use]
    pub fn list(&self, channel_id: &str, chat_id: &str) -> Vec<ExecutionRecord> {
        let now = self.now_ms();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Self::prune(&mut records, now, self.ttl_ms);
        let mut matching: Vec<ExecutionRecord> = records
            .values()
            .filter(|r| r.channel_id == channel_id && r.chat_id == chat_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        matching
    }

    fn prune(records: &mut HashMap<String, ExecutionRecord>, now: i64, ttl_ms: i64) {
        records.retain(|_, record| match record.finished_at_ms {
            Some(finished) if record.status != ExecutionStatus::Running => {
                now - finished < ttl_ms
            },
            _ => true,
        });
    }
}
