use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{EngineEvent, EngineEventHandler};

pub struct LogHook;

impl LogHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait::async_trait]
impl EngineEventHandler for LogHook {
    async fn handle_event(&self, event: EngineEvent) {
        match &event {
            EngineEvent::ProcessStarted {
                process_id,
                process_name,
            } => info!(%process_id, %process_name, "process started"),
            EngineEvent::ProcessFinished {
                process_id,
                process_name,
            } => info!(%process_id, %process_name, "process finished"),
            EngineEvent::InstanceFailed { process_id, error } => {
                warn!(%process_id, %error, "instance failed")
            }
            other => debug!(process_id = %other.process_id(), event = ?other, "engine event"),
        }
    }
}
