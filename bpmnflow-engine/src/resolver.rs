use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use bpmnflow_model::ProcessDefinition;

use crate::handler::HandlerModule;

/// How a call activity finds its called process. Pre-registered definitions
/// win; `location` is only a fallback for deployments that still resolve by
/// file path.
#[async_trait]
pub trait CalledProcessResolver: Send + Sync {
    async fn definition(
        &self,
        name: &str,
        location: Option<&str>,
    ) -> Result<Arc<ProcessDefinition>, String>;

    /// Handler module registered for the called definition, if any. Consulted
    /// when the parent module carries no sub-module for the call activity.
    async fn handlers(&self, name: &str) -> Option<Arc<HandlerModule>>;
}

/// Fixed name-keyed resolver for embedders and tests.
#[derive(Default)]
pub struct StaticResolver {
    definitions: HashMap<String, Arc<ProcessDefinition>>,
    handlers: HashMap<String, Arc<HandlerModule>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definition(mut self, def: Arc<ProcessDefinition>) -> Self {
        self.definitions.insert(def.name.clone(), def);
        self
    }

    pub fn with_handlers(mut self, name: &str, handlers: Arc<HandlerModule>) -> Self {
        self.handlers.insert(name.to_string(), handlers);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl CalledProcessResolver for StaticResolver {
    async fn definition(
        &self,
        name: &str,
        _location: Option<&str>,
    ) -> Result<Arc<ProcessDefinition>, String> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| format!("no definition named '{}'", name))
    }

    async fn handlers(&self, name: &str) -> Option<Arc<HandlerModule>> {
        self.handlers.get(name).cloned()
    }
}
