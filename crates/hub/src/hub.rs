//! The `ChannelHub`: wires adapters, the router, the ledger and per-chat
//! throttlers together around the event bus.

use std::{
    collections::HashMap,
    sync::{
        Arc, LazyLock, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    botline_channels::{ChannelAdapter, InboundMessage},
    botline_config::{LedgerConfig, ThrottleConfig},
    botline_events::{EventBus, ExecutionEvent, ExecutionEventKind},
    chrono::{DateTime, SecondsFormat, Utc},
    regex::Regex,
    tokio::sync::{broadcast, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
    uuid::Uuid,
};

use crate::{
    Error, Result, Router,
    ledger::{ExecutionLedger, ExecutionRecord, ExecutionStatus},
    throttle::{ChunkSender, ChunkThrottler},
};

#[allow(clippy::expect_used)]
static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/status\s+(\S+)\s*$").expect("valid regex"));
#[allow(clippy::expect_used)]
static LOGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/logs\s+(\S+)\s*$").expect("valid regex"));
#[allow(clippy::expect_used)]
static LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/list\s*$").expect("valid regex"));

/// Commands the hub answers from the ledger without routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinCommand {
    Status { execution_id: String },
    Logs { execution_id: String },
    List,
}

/// Parse `/status <id>`, `/logs <id>` or `/list` (case-insensitive,
/// surrounding whitespace ignored). Anything else routes to a runtime.
#[must_use]
pub fn parse_builtin_command(text: &str) -> Option<BuiltinCommand> {
    let trimmed = text.trim();
    if let Some(caps) = STATUS_RE.captures(trimmed) {
        return Some(BuiltinCommand::Status {
            execution_id: caps[1].to_string(),
        });
    }
    if let Some(caps) = LOGS_RE.captures(trimmed) {
        return Some(BuiltinCommand::Logs {
            execution_id: caps[1].to_string(),
        });
    }
    if LIST_RE.is_match(trimmed) {
        return Some(BuiltinCommand::List);
    }
    None
}

fn format_event(event: &ExecutionEvent) -> String {
    match &event.kind {
        ExecutionEventKind::Start { .. } => "Started execution.".to_string(),
        ExecutionEventKind::Complete { response, .. } => response
            .clone()
            .unwrap_or_else(|| "Execution complete.".to_string()),
        ExecutionEventKind::Error { reason } => format!("Execution error: {reason}"),
        ExecutionEventKind::Stdout { text } => {
            format!("STDOUT: {}", botline_common::text::truncate(text, 3500))
        },
        ExecutionEventKind::Stderr { text } => {
            format!("STDERR: {}", botline_common::text::truncate(text, 3500))
        },
    }
}

struct AdapterChunkSender {
    adapter: Arc<dyn ChannelAdapter>,
    chat_id: String,
}

#[async_trait]
impl ChunkSender for AdapterChunkSender {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.adapter.send_message(&self.chat_id, text).await?;
        Ok(())
    }
}

struct HubInner {
    adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
    router: Router,
    bus: EventBus,
    ledger: ExecutionLedger,
    throttle: ThrottleConfig,
    throttlers: Mutex<HashMap<(String, String), Arc<ChunkThrottler>>>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

/// Owns the adapters and the event subscription; the center of the process.
pub struct ChannelHub {
    inner: Arc<HubInner>,
}

impl ChannelHub {
    /// Construction fails when two adapters share a channel id.
    pub fn new(
        adapters: Vec<Arc<dyn ChannelAdapter>>,
        router: Router,
        bus: EventBus,
        ledger: LedgerConfig,
        throttle: ThrottleConfig,
    ) -> Result<Self> {
        let mut by_id: HashMap<String, Arc<dyn ChannelAdapter>> = HashMap::new();
        for adapter in adapters {
            let id = adapter.id().to_string();
            if by_id.contains_key(&id) {
                return Err(Error::DuplicateChannel(id));
            }
            by_id.insert(id, adapter);
        }

        Ok(Self {
            inner: Arc::new(HubInner {
                adapters: by_id,
                router,
                bus,
                ledger: ExecutionLedger::new(
                    ledger.max_lines,
                    i64::try_from(ledger.ttl_ms).unwrap_or(i64::MAX),
                ),
                throttle,
                throttlers: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        })
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn ledger(&self) -> &ExecutionLedger {
        &self.inner.ledger
    }

    /// Subscribe to the bus, wire the inbound queue and start every adapter.
    /// Calling `start` twice is a no-op.
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let events = self.inner.bus.subscribe();
        tokio::spawn(event_loop(Arc::clone(&self.inner), events));

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(inbound_loop(Arc::clone(&self.inner), rx));

        for adapter in self.inner.adapters.values() {
            adapter.start(tx.clone()).await?;
        }

        info!(
            channels = ?self.inner.adapters.keys().collect::<Vec<_>>(),
            "channel hub started"
        );
        Ok(())
    }

    /// Stop the event loop, flush and tear down every throttler, then stop
    /// the adapters.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();

        let throttlers: Vec<Arc<ChunkThrottler>> = {
            let mut map = self
                .inner
                .throttlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            map.drain().map(|(_, t)| t).collect()
        };
        for throttler in throttlers {
            throttler.flush().await;
            throttler.destroy();
        }

        for adapter in self.inner.adapters.values() {
            adapter.stop().await;
        }
        info!("channel hub stopped");
    }
}

async fn inbound_loop(inner: Arc<HubInner>, mut rx: mpsc::UnboundedReceiver<InboundMessage>) {
    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => break,
            next = rx.recv() => {
                let Some(message) = next else { break };
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    handle_message(&inner, message).await;
                });
            },
        }
    }
}

async fn event_loop(inner: Arc<HubInner>, mut rx: broadcast::Receiver<ExecutionEvent>) {
    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Ok(event) => handle_event(&inner, event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscription lagged, output may be lost");
                },
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

async fn handle_message(inner: &Arc<HubInner>, message: InboundMessage) {
    if message.text.trim().is_empty() {
        warn!(
            channel_id = %message.channel_id,
            chat_id = %message.chat_id,
            "ignoring empty message"
        );
        return;
    }

    if let Some(builtin) = parse_builtin_command(&message.text) {
        let reply = render_builtin(&inner.ledger, &message, &builtin);
        send_to_chat(inner, &message.channel_id, &message.chat_id, &reply).await;
        return;
    }

    let execution_id = Uuid::new_v4().to_string();
    let (runtime, routed) = match inner.router.select(&message) {
        Ok(selected) => selected,
        Err(err) => {
            error!(error = %err, chat_id = %message.chat_id, "routing failed");
            send_to_chat(
                inner,
                &message.channel_id,
                &message.chat_id,
                &format!("Execution error: {err}"),
            )
            .await;
            return;
        },
    };

    send_to_chat(
        inner,
        &message.channel_id,
        &message.chat_id,
        &format!("Received command. Execution ID: {execution_id}"),
    )
    .await;

    info!(
        execution_id = %execution_id,
        channel_id = %message.channel_id,
        chat_id = %message.chat_id,
        "received message"
    );

    if let Err(err) = runtime.execute(&routed, &execution_id, &inner.bus).await {
        let reason = err.to_string();
        error!(execution_id = %execution_id, reason = %reason, "runtime execution failed");
        inner.bus.publish(ExecutionEvent::now(
            &execution_id,
            &message.channel_id,
            &message.chat_id,
            ExecutionEventKind::Error { reason },
        ));
    }
}

async fn handle_event(inner: &Arc<HubInner>, event: ExecutionEvent) {
    let Some(adapter) = inner.adapters.get(&event.channel_id) else {
        warn!(
            channel_id = %event.channel_id,
            execution_id = %event.execution_id,
            "no adapter for execution event"
        );
        return;
    };

    // Ledger first, so `/status` during a stream sees the latest line. The
    // boolean guards the terminal chat message: a runtime that both emits
    // an error event and returns an error must not produce two finals.
    let transitioned = match &event.kind {
        ExecutionEventKind::Start { agent_name } => {
            inner.ledger.start(
                &event.execution_id,
                &event.channel_id,
                &event.chat_id,
                agent_name,
                event.timestamp_ms,
            );
            true
        },
        ExecutionEventKind::Stdout { text } => {
            inner
                .ledger
                .append(&event.execution_id, &format!("[stdout] {text}"));
            let throttler = get_throttler(inner, adapter, &event.channel_id, &event.chat_id);
            throttler.push(&format!("[stdout] {text}"));
            return;
        },
        ExecutionEventKind::Stderr { text } => {
            inner
                .ledger
                .append(&event.execution_id, &format!("[stderr] {text}"));
            let throttler = get_throttler(inner, adapter, &event.channel_id, &event.chat_id);
            throttler.push(&format!("[stderr] {text}"));
            return;
        },
        ExecutionEventKind::Complete { .. } => {
            inner.ledger.complete(&event.execution_id, event.timestamp_ms)
        },
        ExecutionEventKind::Error { reason } => {
            inner
                .ledger
                .error(&event.execution_id, reason, event.timestamp_ms)
        },
    };

    if event.is_terminal() {
        flush_and_remove_throttler(inner, &event.channel_id, &event.chat_id).await;
        if !transitioned {
            return;
        }
    }

    if let Err(err) = adapter
        .send_message(&event.chat_id, &format_event(&event))
        .await
    {
        error!(
            channel_id = %event.channel_id,
            execution_id = %event.execution_id,
            error = %err,
            "failed to dispatch execution event"
        );
    }
}

fn get_throttler(
    inner: &Arc<HubInner>,
    adapter: &Arc<dyn ChannelAdapter>,
    channel_id: &str,
    chat_id: &str,
) -> Arc<ChunkThrottler> {
    let mut map = inner
        .throttlers
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let key = (channel_id.to_string(), chat_id.to_string());
    Arc::clone(map.entry(key).or_insert_with(|| {
        Arc::new(ChunkThrottler::new(
            Duration::from_millis(inner.throttle.flush_interval_ms),
            inner.throttle.max_chunk_len,
            Arc::new(AdapterChunkSender {
                adapter: Arc::clone(adapter),
                chat_id: chat_id.to_string(),
            }),
        ))
    }))
}

async fn flush_and_remove_throttler(inner: &Arc<HubInner>, channel_id: &str, chat_id: &str) {
    let throttler = {
        let mut map = inner
            .throttlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.remove(&(channel_id.to_string(), chat_id.to_string()))
    };
    if let Some(throttler) = throttler {
        throttler.flush().await;
        throttler.destroy();
    }
}

async fn send_to_chat(inner: &Arc<HubInner>, channel_id: &str, chat_id: &str, text: &str) {
    let Some(adapter) = inner.adapters.get(channel_id) else {
        warn!(channel_id = %channel_id, "no adapter for outbound message");
        return;
    };
    if let Err(err) = adapter.send_message(chat_id, text).await {
        error!(channel_id = %channel_id, chat_id = %chat_id, error = %err, "send failed");
    }
}

fn render_builtin(
    ledger: &ExecutionLedger,
    message: &InboundMessage,
    command: &BuiltinCommand,
) -> String {
    match command {
        BuiltinCommand::List => {
            let records = ledger.list(&message.channel_id, &message.chat_id);
            let records = &records[..records.len().min(10)];
            if records.is_empty() {
                return "Recent executions (this chat):\n• (none)".to_string();
            }
            let lines: Vec<String> = records.iter().map(render_list_line).collect();
            format!("Recent executions (this chat):\n{}", lines.join("\n"))
        },
        BuiltinCommand::Status { execution_id } => {
            match owned_record(ledger, message, execution_id) {
                Some(record) => render_status(ledger, &record),
                None => format!("Unknown execution ID: {execution_id}"),
            }
        },
        BuiltinCommand::Logs { execution_id } => {
            match owned_record(ledger, message, execution_id) {
                Some(record) if !record.output_lines.is_empty() => record.output_lines.join("\n"),
                Some(_) => "No output captured for this execution yet.".to_string(),
                None => format!("Unknown execution ID: {execution_id}"),
            }
        },
    }
}

/// A record is only visible to the chat it belongs to.
fn owned_record(
    ledger: &ExecutionLedger,
    message: &InboundMessage,
    execution_id: &str,
) -> Option<ExecutionRecord> {
    ledger
        .get(execution_id)
        .filter(|r| r.channel_id == message.channel_id && r.chat_id == message.chat_id)
}

fn render_list_line(record: &ExecutionRecord) -> String {
    let (icon, label) = match record.status {
        ExecutionStatus::Complete => ("✅", "Complete"),
        ExecutionStatus::Error => ("❌", "Error"),
        ExecutionStatus::Running => ("⏳", "Running"),
    };
    let started = DateTime::<Utc>::from_timestamp_millis(record.started_at_ms)
        .map_or_else(|| "??:??:??".to_string(), |t| t.format("%H:%M:%S").to_string());
    format!("• {} {} {} {}Z", record.execution_id, icon, label, started)
}

fn render_status(ledger: &ExecutionLedger, record: &ExecutionRecord) -> String {
    let end = record.finished_at_ms.unwrap_or_else(|| ledger.now_ms());
    let secs = ((end - record.started_at_ms).max(0)) / 1000;

    match record.status {
        ExecutionStatus::Running => {
            let last = record.output_lines.last().map_or_else(
                || "Last output: (none)".to_string(),
                |line| format!("Last output: {line}"),
            );
            format!("⏳ Running ({secs}s) · {}\n{last}", record.execution_id)
        },
        ExecutionStatus::Complete => {
            let finished = record
                .finished_at_ms
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map_or_else(
                    || "unknown".to_string(),
                    |t| t.to_rfc3339_opts(SecondsFormat::Millis, true),
                );
            format!(
                "✅ Complete ({secs}s) · {}\nFinished: {finished}",
                record.execution_id
            )
        },
        ExecutionStatus::Error => {
            let reason = record.error_reason.as_deref().unwrap_or("unknown");
            format!(
                "❌ Error ({secs}s) · {}\nReason: {reason}",
                record.execution_id
            )
        },
    }
}
