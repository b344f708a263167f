use std::sync::Arc;

use crate::{EngineEvent, EngineEventHandler};

/// Fans one engine event out to every registered hook, in registration
/// order.
pub struct EngineEventDispatcher {
    handlers: Vec<Arc<dyn EngineEventHandler>>,
}

impl EngineEventDispatcher {
    pub fn new(handlers: Vec<Arc<dyn EngineEventHandler>>) -> Self {
        Self { handlers }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn add(&mut self, handler: Arc<dyn EngineEventHandler>) {
        self.handlers.push(handler);
    }

    pub async fn dispatch(&self, event: EngineEvent) {
        for handler in &self.handlers {
            handler.handle_event(event.clone()).await;
        }
    }
}

impl Default for EngineEventDispatcher {
    fn default() -> Self {
        Self::empty()
    }
}
