//! Startup validation. Duplicate ids and dangling references are
//! configuration errors and refuse to start; they are never retried.

use std::collections::HashSet;

use crate::{
    Error, Result,
    schema::{ChannelKind, Config},
};

/// Check a resolved config for fatal mistakes. Returns the list of problems
/// found so `doctor` can print all of them at once.
pub fn validate(config: &Config) -> Result<()> {
    let problems = collect_problems(config);
    if problems.is_empty() {
        return Ok(());
    }
    Err(Error::Invalid(problems.join("; ")))
}

#[must_use]
pub fn collect_problems(config: &Config) -> Vec<String> {
    let mut problems = Vec::new();

    if config.agents.is_empty() {
        problems.push("no agents configured".to_string());
    }

    let mut agent_names = HashSet::new();
    for agent in &config.agents {
        if agent.name.is_empty() {
            problems.push("agent with empty name".to_string());
            continue;
        }
        if !agent_names.insert(agent.name.as_str()) {
            problems.push(format!("duplicate agent '{}'", agent.name));
        }
        if agent.command.is_empty() {
            problems.push(format!("agent '{}' has no command", agent.name));
        }
    }

    let mut channel_ids = HashSet::new();
    for channel in &config.channels {
        if channel.id.is_empty() {
            problems.push("channel with empty id".to_string());
            continue;
        }
        if !channel_ids.insert(channel.id.as_str()) {
            problems.push(format!("duplicate channel id '{}'", channel.id));
        }
        if channel.kind == ChannelKind::Telegram && channel.token.is_none() {
            problems.push(format!("telegram channel '{}' has no token", channel.id));
        }
        if let Some(agent) = &channel.default_agent
            && !agent_names.contains(agent.as_str())
        {
            problems.push(format!(
                "channel '{}' default agent '{agent}' is not configured",
                channel.id
            ));
        }
    }

    if let Some(agent) = &config.default_agent
        && !agent_names.contains(agent.as_str())
    {
        problems.push(format!("default agent '{agent}' is not configured"));
    }

    problems
}
