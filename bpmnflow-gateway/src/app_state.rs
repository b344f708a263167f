use std::sync::Arc;

use bpmnflow_engine::ProcessManager;

use crate::idempotency::IdempotencyStore;

#[derive(Clone)]
pub struct AppState {
    pub manager: ProcessManager,
    pub idempotency: Arc<IdempotencyStore>,
}

impl AppState {
    pub fn new(manager: ProcessManager) -> Self {
        Self {
            manager,
            idempotency: IdempotencyStore::new(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("manager", &"ProcessManager")
            .field("idempotency", &"IdempotencyStore")
            .finish()
    }
}
