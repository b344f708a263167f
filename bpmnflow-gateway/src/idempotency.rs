use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Identity of one delivered message.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct MessageKey {
    pub process_name: String,
    pub process_id: String,
    pub message_name: String,
    pub message_id: String,
}

/// Remembers every `(processName, id, messageName, messageId)` the façade
/// has accepted, so a replayed PUT produces no second trigger. Injected into
/// the server rather than global.
#[derive(Default)]
pub struct IdempotencyStore {
    seen: Mutex<HashSet<MessageKey>>,
}

impl IdempotencyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// True when the key is new; false on a replay.
    pub fn record(&self, key: MessageKey) -> bool {
        self.seen.lock().expect("idempotency poisoned").insert(key)
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.seen
            .lock()
            .expect("idempotency poisoned")
            .contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(message_id: &str) -> MessageKey {
        MessageKey {
            process_name: "Order".into(),
            process_id: "1".into(),
            message_name: "evt".into(),
            message_id: message_id.into(),
        }
    }

    #[test]
    fn first_sighting_records_replay_does_not() {
        let store = IdempotencyStore::new();
        assert!(store.record(key("m1")));
        assert!(!store.record(key("m1")));
        assert!(store.record(key("m2")));
        assert!(store.contains(&key("m1")));
    }
}
