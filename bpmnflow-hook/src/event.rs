use serde_json::Value;

/// Lifecycle notifications emitted by a process instance. Observers never
/// affect token semantics.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ProcessStarted {
        process_id: String,
        process_name: String,
    },
    NodeEnter {
        process_id: String,
        flow_object: String,
        input: Value,
    },
    NodeExit {
        process_id: String,
        flow_object: String,
        output: Value,
    },
    TimerScheduled {
        process_id: String,
        event_name: String,
        fire_at_ms: i64,
    },
    TimerCleared {
        process_id: String,
        event_name: String,
    },
    ProcessFinished {
        process_id: String,
        process_name: String,
    },
    InstanceFailed {
        process_id: String,
        error: String,
    },
    DocumentPersisted {
        process_id: String,
    },
    DocumentLoaded {
        process_id: String,
    },
}

impl EngineEvent {
    pub fn process_id(&self) -> &str {
        match self {
            EngineEvent::ProcessStarted { process_id, .. }
            | EngineEvent::NodeEnter { process_id, .. }
            | EngineEvent::NodeExit { process_id, .. }
            | EngineEvent::TimerScheduled { process_id, .. }
            | EngineEvent::TimerCleared { process_id, .. }
            | EngineEvent::ProcessFinished { process_id, .. }
            | EngineEvent::InstanceFailed { process_id, .. }
            | EngineEvent::DocumentPersisted { process_id }
            | EngineEvent::DocumentLoaded { process_id } => process_id,
        }
    }
}
