use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tracing::debug;

use crate::event::InternalEvent;

/// Persisted form of one pending timeout: absolute fire time plus the
/// original duration, both in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub at: i64,
    pub duration_ms: i64,
}

/// Pending timeouts keyed by timer-event name. The `timeouts` map survives a
/// crash; `scheduled` holds the live wake-up tasks and is rebuilt on
/// restore. A single name has at most one scheduled callback.
#[derive(Default)]
pub(crate) struct PendingTimers {
    pub(crate) timeouts: HashMap<String, TimerRecord>,
    scheduled: HashMap<String, AbortHandle>,
}

impl PendingTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a wake `duration_ms` from now. Replaces any earlier schedule
    /// under the same name. Returns the absolute fire time.
    pub fn schedule<S>(
        &mut self,
        name: &str,
        duration_ms: i64,
        event: InternalEvent,
        send: S,
    ) -> i64
    where
        S: FnOnce(InternalEvent) + Send + 'static,
    {
        let at = Utc::now().timestamp_millis() + duration_ms;
        self.schedule_record(name, TimerRecord { at, duration_ms }, event, send);
        at
    }

    /// Schedule from a persisted record. A fire time already in the past
    /// fires immediately.
    pub fn schedule_record<S>(
        &mut self,
        name: &str,
        record: TimerRecord,
        event: InternalEvent,
        send: S,
    ) where
        S: FnOnce(InternalEvent) + Send + 'static,
    {
        self.clear(name);
        let remaining = record.at - Utc::now().timestamp_millis();
        self.timeouts.insert(name.to_string(), record);
        if remaining <= 0 {
            debug!(timer = name, "timer already due, firing immediately");
            send(event);
            return;
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(remaining as u64)).await;
            send(event);
        });
        self.scheduled
            .insert(name.to_string(), handle.abort_handle());
    }

    /// Cancel and forget a timer. Idempotent.
    pub fn clear(&mut self, name: &str) -> bool {
        let had_record = self.timeouts.remove(name).is_some();
        if let Some(handle) = self.scheduled.remove(name) {
            handle.abort();
        }
        had_record
    }

    pub fn clear_all(&mut self) {
        for (_, handle) in self.scheduled.drain() {
            handle.abort();
        }
        self.timeouts.clear();
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.timeouts.contains_key(name)
    }
}

impl Drop for PendingTimers {
    fn drop(&mut self) {
        for handle in self.scheduled.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn sender(
        tx: mpsc::UnboundedSender<InternalEvent>,
    ) -> impl FnOnce(InternalEvent) + Send + 'static {
        move |ev| {
            let _ = tx.send(ev);
        }
    }

    #[tokio::test]
    async fn fires_through_the_instance_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = PendingTimers::new();
        timers.schedule(
            "deadline",
            10,
            InternalEvent::BoundaryCatch {
                name: "deadline".into(),
                data: Value::Null,
            },
            sender(tx),
        );
        assert!(timers.is_pending("deadline"));
        let ev = rx.recv().await.unwrap();
        assert!(matches!(ev, InternalEvent::BoundaryCatch { name, .. } if name == "deadline"));
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = PendingTimers::new();
        timers.schedule(
            "t",
            5_000,
            InternalEvent::IntermediateCatch {
                name: "t".into(),
                data: Value::Null,
            },
            sender(tx),
        );
        assert!(timers.clear("t"));
        assert!(!timers.clear("t"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn past_fire_time_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = PendingTimers::new();
        timers.schedule_record(
            "t",
            TimerRecord {
                at: Utc::now().timestamp_millis() - 100,
                duration_ms: 50,
            },
            InternalEvent::IntermediateCatch {
                name: "t".into(),
                data: Value::Null,
            },
            sender(tx),
        );
        assert!(rx.try_recv().is_ok());
    }
}
