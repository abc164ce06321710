//! Config types: agents, channels, ledger and throttle tuning.

use std::collections::HashMap;

use {
    secrecy::Secret,
    serde::Deserialize,
};

/// Which execution style an agent uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// One-shot: spawn, stream, terminate.
    #[default]
    Cli,
    /// Session-backed, resumed via a backend-issued token.
    SessionNative,
    /// Session-backed, context rebuilt by replaying the transcript.
    SessionTranscript,
}

/// One configured agent backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub runtime: RuntimeKind,
    /// Shell command line to run (may contain pipes and quoting).
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
    /// Hard execution timeout. Expiry kills the process.
    pub timeout_ms: u64,
    /// Idle time before a cached session is evicted.
    pub session_timeout_ms: u64,
    /// Transcript-replay history depth, in exchanges.
    pub max_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            runtime: RuntimeKind::Cli,
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            timeout_ms: 10 * 60 * 1000,
            session_timeout_ms: 30 * 60 * 1000,
            max_turns: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Telegram,
    /// In-process channel for tests and local experiments.
    Mock,
}

/// One messaging channel the hub listens on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub kind: ChannelKind,
    pub id: String,
    pub token: Option<Secret<String>>,
    pub polling_interval_ms: u64,
    /// Agent handling messages on this channel when no `@agent` prefix is given.
    pub default_agent: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            kind: ChannelKind::Telegram,
            id: String::new(),
            token: None,
            polling_interval_ms: 300,
            default_agent: None,
        }
    }
}

/// Execution ledger tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Rolling output buffer capacity, in lines.
    pub max_lines: usize,
    /// Retention horizon for terminal records.
    pub ttl_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_lines: 200,
            ttl_ms: 60 * 60 * 1000,
        }
    }
}

/// Output throttling toward rate-limited transports.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub flush_interval_ms: u64,
    pub max_chunk_len: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1000,
            max_chunk_len: 3500,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channels: Vec<ChannelConfig>,
    pub agents: Vec<AgentConfig>,
    /// Registry-wide fallback agent.
    pub default_agent: Option<String>,
    pub ledger: LedgerConfig,
    pub throttle: ThrottleConfig,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let agent = AgentConfig::default();
        assert_eq!(agent.timeout_ms, 600_000);
        assert_eq!(agent.session_timeout_ms, 1_800_000);
        assert_eq!(agent.max_turns, 10);

        let ledger = LedgerConfig::default();
        assert_eq!(ledger.max_lines, 200);
        assert_eq!(ledger.ttl_ms, 3_600_000);

        let throttle = ThrottleConfig::default();
        assert_eq!(throttle.flush_interval_ms, 1000);
        assert_eq!(throttle.max_chunk_len, 3500);
    }

    #[test]
    fn runtime_kind_parses_kebab_case() {
        let agent: AgentConfig =
            toml::from_str("name = \"claude\"\nruntime = \"session-native\"\ncommand = \"claude\"")
                .unwrap();
        assert_eq!(agent.runtime, RuntimeKind::SessionNative);
    }
}
