//! Agent name → runtime mapping with a resolvable default.

use std::{collections::HashMap, sync::Arc};

use botline_runtime::Runtime;

use crate::{Error, Result};

pub struct AgentRegistry {
    runtimes: HashMap<String, Arc<dyn Runtime>>,
    /// Registration order, for the first-registered fallback.
    order: Vec<String>,
    default_agent: Option<String>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new(default_agent: Option<String>) -> Self {
        Self {
            runtimes: HashMap::new(),
            order: Vec::new(),
            default_agent,
        }
    }

    /// Register a runtime. Duplicate names are a configuration error, fatal
    /// at startup.
    pub fn register(&mut self, name: impl Into<String>, runtime: Arc<dyn Runtime>) -> Result<()> {
        let name = name.into();
        if self.runtimes.contains_key(&name) {
            return Err(Error::DuplicateAgent(name));
        }
        self.order.push(name.clone());
        self.runtimes.insert(name, runtime);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Runtime>> {
        self.runtimes.get(name).map(Arc::clone)
    }

    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// The configured default runtime if registered, else the
    /// first-registered runtime, else an error.
    pub fn default_runtime(&self) -> Result<Arc<dyn Runtime>> {
        if let Some(name) = &self.default_agent {
            return self
                .get(name)
                .ok_or_else(|| Error::DefaultNotRegistered(name.clone()));
        }

        self.order
            .first()
            .and_then(|name| self.get(name))
            .ok_or(Error::NoRuntimes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        botline_channels::InboundMessage,
        botline_events::EventBus,
    };

    struct NoopRuntime;

    #[async_trait]
    impl Runtime for NoopRuntime {
        async fn execute(
            &self,
            _message: &InboundMessage,
            _execution_id: &str,
            _bus: &EventBus,
        ) -> botline_runtime::Result<()> {
            Ok(())
        }
    }

    fn noop() -> Arc<dyn Runtime> {
        Arc::new(NoopRuntime)
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = AgentRegistry::new(None);
        registry.register("claude", noop()).unwrap();
        assert!(matches!(
            registry.register("claude", noop()),
            Err(Error::DuplicateAgent(name)) if name == "claude"
        ));
    }

    #[test]
    fn default_prefers_configured_name() {
        let mut registry = AgentRegistry::new(Some("second".into()));
        registry.register("first", noop()).unwrap();
        registry.register("second", noop()).unwrap();

        let runtime = registry.default_runtime().unwrap();
        assert!(Arc::ptr_eq(&runtime, &registry.get("second").unwrap()));
    }

    #[test]
    fn configured_default_missing_is_an_error() {
        let mut registry = AgentRegistry::new(Some("ghost".into()));
        registry.register("real", noop()).unwrap();
        assert!(matches!(
            registry.default_runtime(),
            Err(Error::DefaultNotRegistered(name)) if name == "ghost"
        ));
    }

    #[test]
    fn falls_back_to_first_registered() {
        let mut registry = AgentRegistry::new(None);
        registry.register("one", noop()).unwrap();
        registry.register("two", noop()).unwrap();

        let runtime = registry.default_runtime().unwrap();
        assert!(Arc::ptr_eq(&runtime, &registry.get("one").unwrap()));
    }

    #[test]
    fn empty_registry_has_no_default() {
        let registry = AgentRegistry::new(None);
        assert!(matches!(registry.default_runtime(), Err(Error::NoRuntimes)));
    }
}
