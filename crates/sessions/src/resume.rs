//! Native-resume strategy: the backend issues an opaque session id on its
//! first run, which later turns pass back via `--resume`.

use std::sync::{Arc, LazyLock};

use {
    async_trait::async_trait,
    botline_common::text::strip_ansi,
    botline_config::AgentConfig,
    botline_events::EventBus,
    botline_runtime::{CommandRunner, CommandSpec},
    regex::Regex,
    tracing::{debug, warn},
};

use crate::{AgentSession, Error, Result};

/// Recognized resume-token shapes, in precedence order; the first match
/// wins. These are heuristics over free-text backend output and track the
/// backends' observed formats, not any documented contract.
static TOKEN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)session\s*id\s*[:=]\s*([A-Za-z0-9._-]+)",
        r"(?i)chat\s*id\s*[:=]\s*([A-Za-z0-9._-]+)",
        r"(?i)--resume\s+([A-Za-z0-9._-]+)",
        r"(?i)--chat-id\s+([A-Za-z0-9._-]+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Scan cleaned backend output for a resume token.
#[must_use]
pub fn parse_resume_token(output: &str) -> Option<String> {
    for pattern in TOKEN_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(output)
            && let Some(token) = captures.get(1)
        {
            return Some(token.as_str().to_string());
        }
    }
    None
}

pub struct NativeResumeSession {
    session_id: String,
    config: AgentConfig,
    runner: Arc<dyn CommandRunner>,
    /// Resume token from the previous turn; `None` means the next call is
    /// fresh. Held across the whole turn so turns never interleave.
    token: tokio::sync::Mutex<Option<String>>,
}

impl NativeResumeSession {
    #[must_use]
    pub fn new(config: AgentConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            config,
            runner,
            token: tokio::sync::Mutex::new(None),
        }
    }

    async fn invoke(&self, user_text: &str, resume: Option<&str>) -> Result<String> {
        let mut spec = CommandSpec::from_agent(&self.config);
        if let Some(token) = resume {
            spec.args.push("--resume".to_string());
            spec.args.push(token.to_string());
        }
        spec.args.push("-p".to_string());
        spec.args.push(user_text.to_string());

        let output = self.runner.run(&spec, None, None).await?;
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

        Ok(strip_ansi(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl AgentSession for NativeResumeSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(&self, user_text: &str, _execution_id: &str, _bus: &EventBus) -> Result<String> {
        let mut token = self.token.lock().await;

        match token.as_deref() {
            None => {
                // Fresh call. A failure here is never retried.
                let response = self.invoke(user_text, None).await?;
                if let Some(found) = parse_resume_token(&response) {
                    debug!(session_id = %self.session_id, "captured resume token");
                    *token = Some(found);
                }
                Ok(response)
            },
            Some(resume) => match self.invoke(user_text, Some(resume)).await {
                Ok(response) => Ok(response),
                Err(err) => {
                    // The token is only valid for the immediately preceding
                    // backend process. Drop it and retry exactly once fresh.
                    warn!(
                        session_id = %self.session_id,
                        error = %err,
                        "resume failed, retrying without token"
                    );
                    *token = None;
                    let response = self.invoke(user_text, None).await?;
                    if let Some(found) = parse_resume_token(&response) {
                        *token = Some(found);
                    }
                    Ok(response)
                },
            },
        }
    }

    async fn close(&self) -> Result<()> {
        *self.token.lock().await = None;
        Ok(())
    }
}
