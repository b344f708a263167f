use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::{EngineEvent, EngineEventHandler};

/// One line of the transaction log.
#[derive(Debug, Clone)]
pub struct TransactionEntry {
    pub at: DateTime<Utc>,
    pub process_id: String,
    pub description: String,
}

/// Destination for transaction-log entries. Injected rather than global so
/// embedders decide where the log goes.
pub trait TransactionSink: Send + Sync {
    fn append(&self, entry: TransactionEntry);
}

/// In-memory sink, mostly for tests and diagnostics.
#[derive(Default)]
pub struct MemoryTransactionSink {
    entries: Mutex<Vec<TransactionEntry>>,
}

impl MemoryTransactionSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<TransactionEntry> {
        self.entries.lock().expect("sink poisoned").clone()
    }
}

impl TransactionSink for MemoryTransactionSink {
    fn append(&self, entry: TransactionEntry) {
        self.entries.lock().expect("sink poisoned").push(entry);
    }
}

/// Hook that turns engine events into transaction-log entries.
pub struct TransactionHook {
    sink: Arc<dyn TransactionSink>,
}

impl TransactionHook {
    pub fn new(sink: Arc<dyn TransactionSink>) -> Arc<Self> {
        Arc::new(Self { sink })
    }
}

#[async_trait::async_trait]
impl EngineEventHandler for TransactionHook {
    async fn handle_event(&self, event: EngineEvent) {
        let description = match &event {
            EngineEvent::ProcessStarted { process_name, .. } => {
                format!("process '{}' started", process_name)
            }
            EngineEvent::NodeEnter { flow_object, .. } => format!("enter '{}'", flow_object),
            EngineEvent::NodeExit { flow_object, .. } => format!("exit '{}'", flow_object),
            EngineEvent::TimerScheduled {
                event_name,
                fire_at_ms,
                ..
            } => format!("timer '{}' set for {}", event_name, fire_at_ms),
            EngineEvent::TimerCleared { event_name, .. } => {
                format!("timer '{}' cleared", event_name)
            }
            EngineEvent::ProcessFinished { process_name, .. } => {
                format!("process '{}' finished", process_name)
            }
            EngineEvent::InstanceFailed { error, .. } => format!("instance failed: {}", error),
            EngineEvent::DocumentPersisted { .. } => "document persisted".to_string(),
            EngineEvent::DocumentLoaded { .. } => "document loaded".to_string(),
        };
        self.sink.append(TransactionEntry {
            at: Utc::now(),
            process_id: event.process_id().to_string(),
            description,
        });
    }
}
