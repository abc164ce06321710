//! Process spawning and streaming, as one primitive.
//!
//! The streaming callback and the aggregate-collect behavior share a single
//! code path (an optional sink) so both see identical buffering semantics.

use std::{collections::HashMap, process::Stdio, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    botline_config::AgentConfig,
    tokio::{
        io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
        process::Command,
        time::timeout,
    },
    tracing::debug,
};

use crate::{Error, Result};

/// A fully resolved command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell command line; may contain pipes and quoting.
    pub command: String,
    /// Extra argv entries, passed positionally (never re-parsed by the shell).
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    #[must_use]
    pub fn from_agent(config: &AgentConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            working_dir: config.working_dir.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Aggregated result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Receives output fragments as they arrive, before aggregation.
pub type ChunkSink = Arc<dyn Fn(StreamKind, &str) + Send + Sync>;

/// Port for process execution, injectable so session strategies can be
/// tested against scripted backends.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is an `Ok` output; only spawn
    /// failure and timeout (process killed) are errors.
    async fn run(
        &self,
        spec: &CommandSpec,
        stdin: Option<String>,
        sink: Option<ChunkSink>,
    ) -> Result<CommandOutput>;
}

/// The real runner: `tokio::process` through a shell, matching how agent
/// commands are configured (a single command line plus positional args).
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        stdin: Option<String>,
        sink: Option<ChunkSink>,
    ) -> Result<CommandOutput> {
        let script = if spec.args.is_empty() {
            spec.command.clone()
        } else {
            // Positional args arrive via "$@" so prompt text is never
            // re-parsed by the shell.
            format!("{} \"$@\"", spec.command)
        };

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&script)
            .arg("sh")
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: spec.command.clone(),
            source,
        })?;
        debug!(command = %spec.command, "spawned backend process");

        if let (Some(mut pipe), Some(input)) = (child.stdin.take(), stdin) {
            // The backend may exit without draining stdin; a broken pipe
            // here is not a failure. The exit status decides the outcome.
            tokio::spawn(async move {
                let _ = pipe.write_all(input.as_bytes()).await;
                let _ = pipe.shutdown().await;
            });
        }

        let stdout_task = read_stream(child.stdout.take(), StreamKind::Stdout, sink.clone());
        let stderr_task = read_stream(child.stderr.take(), StreamKind::Stderr, sink);

        let status = match timeout(spec.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(Error::Timeout);
            },
        };

        let stdout = stdout_task
            .await
            .map_err(|e| Error::Message(format!("stdout reader failed: {e}")))?;
        let stderr = stderr_task
            .await
            .map_err(|e| Error::Message(format!("stderr reader failed: {e}")))?;

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }
}

fn read_stream<R>(
    reader: Option<R>,
    kind: StreamKind,
    sink: Option<ChunkSink>,
) -> tokio::task::JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = String::new();
        let Some(mut reader) = reader else {
            return collected;
        };
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]);
                    if let Some(sink) = &sink {
                        sink(kind, &chunk);
                    }
                    collected.push_str(&chunk);
                },
            }
        }
        collected
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        std::sync::Mutex,
    };

    fn spec(command: &str) -> CommandSpec {
        CommandSpec {
            command: command.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn collects_stdout_and_stderr() {
        let out = ProcessRunner
            .run(
                &spec("printf 'hello'; printf 'warn' >&2; printf ' world'"),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello world");
        assert_eq!(out.stderr, "warn");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn sink_sees_fragments_and_aggregate_matches() {
        let chunks: Arc<Mutex<Vec<(StreamKind, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&chunks);
        let sink: ChunkSink = Arc::new(move |kind, text| {
            recorder.lock().unwrap().push((kind, text.to_string()));
        });

        let command = "printf 'abc'; printf 'def' >&2";
        let streamed = ProcessRunner
            .run(&spec(command), None, Some(sink))
            .await
            .unwrap();
        let collected = ProcessRunner.run(&spec(command), None, None).await.unwrap();
        assert_eq!(streamed, collected);

        let chunks = chunks.lock().unwrap();
        let stdout_text: String = chunks
            .iter()
            .filter(|(k, _)| *k == StreamKind::Stdout)
            .map(|(_, t)| t.as_str())
            .collect();
        let stderr_text: String = chunks
            .iter()
            .filter(|(k, _)| *k == StreamKind::Stderr)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(stdout_text, "abc");
        assert_eq!(stderr_text, "def");
    }

    #[tokio::test]
    async fn nonzero_exit_is_ok() {
        let out = ProcessRunner
            .run(&spec("printf 'boom' >&2; exit 3"), None, None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr, "boom");
    }

    #[tokio::test]
    async fn stdin_is_forwarded() {
        let out = ProcessRunner
            .run(&spec("cat"), Some("ping\n".to_string()), None)
            .await
            .unwrap();
        assert_eq!(out.stdout, "ping\n");
    }

    #[tokio::test]
    async fn fast_exit_with_pending_stdin_still_completes() {
        let out = ProcessRunner
            .run(&spec("exit 7"), Some("x\n".to_string()), None)
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(7));
    }

    #[tokio::test]
    async fn positional_args_are_not_shell_parsed() {
        let mut s = spec("printf '%s'");
        s.args = vec!["a b; echo pwned".to_string()];
        let out = ProcessRunner.run(&s, None, None).await.unwrap();
        assert_eq!(out.stdout, "a b; echo pwned");
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let mut s = spec("sleep 30");
        s.timeout = Duration::from_millis(100);
        let started = std::time::Instant::now();
        let err = ProcessRunner.run(&s, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_or_exit_failure() {
        // Through a shell, an unknown command surfaces as a non-zero exit
        // with a diagnostic on stderr rather than a spawn error.
        let out = ProcessRunner
            .run(&spec("definitely-not-a-real-binary-4217"), None, None)
            .await
            .unwrap();
        assert_ne!(out.exit_code, Some(0));
        assert!(!out.stderr.is_empty());
    }
}
