//! Picks the runtime for each inbound message.
//!
//! Resolution order: an `@agent` prefix in the message text, then the
//! per-channel default, then the registry default. A prefix or channel
//! default that names an unregistered agent falls through silently to the
//! next tier.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use {
    botline_channels::InboundMessage,
    botline_runtime::Runtime,
    regex::Regex,
};

use crate::{AgentRegistry, Result};

#[allow(clippy::expect_used)]
static PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^@([A-Za-z0-9_-]+)\s+(.*)$").expect("valid regex"));

pub struct Router {
    registry: Arc<AgentRegistry>,
    /// channel id → default agent name.
    channel_defaults: HashMap<String, String>,
}

impl Router {
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>, channel_defaults: HashMap<String, String>) -> Self {
        Self {
            registry,
            channel_defaults,
        }
    }

    /// Resolve the runtime for a message. When an `@agent` prefix matched a
    /// registered agent, the returned message has the prefix stripped.
    pub fn select(&self, message: &InboundMessage) -> Result<(Arc<dyn Runtime>, InboundMessage)> {
        if let Some(caps) = PREFIX_RE.captures(&message.text) {
            let name = &caps[1];
            if let Some(runtime) = self.registry.get(name) {
                let mut rewritten = message.clone();
                rewritten.text = caps[2].trim().to_string();
                return Ok((runtime, rewritten));
            }
        }

        if let Some(name) = self.channel_defaults.get(&message.channel_id) {
            if let Some(runtime) = self.registry.get(name) {
                return Ok((runtime, message.clone()));
            }
        }

        let runtime = self.registry.default_runtime()?;
        Ok((runtime, message.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        botline_events::EventBus,
    };

    struct NamedRuntime;

    #[async_trait]
    impl Runtime for NamedRuntime {
        async fn execute(
            &self,
            _message: &InboundMessage,
            _execution_id: &str,
            _bus: &EventBus,
        ) -> botline_runtime::Result<()> {
            Ok(())
        }
    }

    fn registry(names: &[&str], default: Option<&str>) -> Arc<AgentRegistry> {
        let mut registry = AgentRegistry::new(default.map(str::to_string));
        for name in names {
            registry
                .register(*name, Arc::new(NamedRuntime) as Arc<dyn Runtime>)
                .unwrap();
        }
        Arc::new(registry)
    }

    fn message(channel: &str, text: &str) -> InboundMessage {
        InboundMessage {
            channel_id: channel.to_string(),
            chat_id: "chat-1".to_string(),
            user_id: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn prefix_routes_and_strips() {
        let registry = registry(&["claude", "codex"], None);
        let router = Router::new(Arc::clone(&registry), HashMap::new());

        let (runtime, rewritten) = router.select(&message("tg", "@codex fix the build")).unwrap();
        assert!(Arc::ptr_eq(&runtime, &registry.get("codex").unwrap()));
        assert_eq!(rewritten.text, "fix the build");
    }

    #[test]
    fn prefix_spans_multiline_text() {
        let registry = registry(&["claude"], None);
        let router = Router::new(Arc::clone(&registry), HashMap::new());

        let (_, rewritten) = router
            .select(&message("tg", "@claude line one\nline two"))
            .unwrap();
        assert_eq!(rewritten.text, "line one\nline two");
    }

    #[test]
    fn unknown_prefix_falls_through_to_channel_default() {
        let registry = registry(&["claude", "codex"], None);
        let defaults = HashMap::from([("tg".to_string(), "codex".to_string())]);
        let router = Router::new(Arc::clone(&registry), defaults);

        let (runtime, rewritten) = router.select(&message("tg", "@ghost do it")).unwrap();
        assert!(Arc::ptr_eq(&runtime, &registry.get("codex").unwrap()));
        // The prefix stays when it did not route.
        assert_eq!(rewritten.text, "@ghost do it");
    }

    #[test]
    fn channel_default_routes() {
        let registry = registry(&["claude", "codex"], None);
        let defaults = HashMap::from([("tg".to_string(), "codex".to_string())]);
        let router = Router::new(Arc::clone(&registry), defaults);

        let (runtime, _) = router.select(&message("tg", "hello")).unwrap();
        assert!(Arc::ptr_eq(&runtime, &registry.get("codex").unwrap()));
    }

    #[test]
    fn dangling_channel_default_falls_through() {
        let registry = registry(&["claude"], None);
        let defaults = HashMap::from([("tg".to_string(), "ghost".to_string())]);
        let router = Router::new(Arc::clone(&registry), defaults);

        let (runtime, _) = router.select(&message("tg", "hello")).unwrap();
        assert!(Arc::ptr_eq(&runtime, &registry.get("claude").unwrap()));
    }

    #[test]
    fn empty_registry_errors() {
        let router = Router::new(registry(&[], None), HashMap::new());
        assert!(router.select(&message("tg", "hello")).is_err());
    }

    #[test]
    fn bare_prefix_without_body_does_not_match() {
        let registry = registry(&["claude", "codex"], Some("claude"));
        let router = Router::new(Arc::clone(&registry), HashMap::new());

        let (runtime, rewritten) = router.select(&message("tg", "@codex")).unwrap();
        assert!(Arc::ptr_eq(&runtime, &registry.get("claude").unwrap()));
        assert_eq!(rewritten.text, "@codex");
    }
}
