use serde_json::Value;

use bpmnflow_store::ProcessDocument;

/// Events carried on an instance's own queue. The pump drains them in FIFO
/// order; all token movement happens inside their dispatch.
#[derive(Debug)]
pub enum InternalEvent {
    /// A start event was triggered externally; place the initial token.
    TriggerStart { name: String, data: Value },
    /// A token has just been placed on `name`; run the arrival handler.
    TokenArrived { name: String, data: Value },
    /// External `taskDone` or an activity-end-handler result.
    ActivityEnd { name: String, data: Value },
    /// External trigger or timer fire matched an intermediate catch event.
    IntermediateCatch { name: String, data: Value },
    /// External trigger or timer fire matched a boundary event.
    BoundaryCatch { name: String, data: Value },
    /// A called process reached its end event.
    CalledProcessEnded { call_activity: String, data: Value },
    /// A descendant hit a persist trigger; only the main process handles it.
    PersistRequest,
    /// Store I/O finished. The only event that bypasses the deferral gate.
    IoComplete(IoOutcome),
    /// Barrier: reply once every earlier event has been dispatched. Defers
    /// like any other event, so a reply also means pending I/O completed.
    Flush(FlushHandle),
}

pub struct FlushHandle(pub(crate) tokio::sync::oneshot::Sender<()>);

impl std::fmt::Debug for FlushHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FlushHandle")
    }
}

#[derive(Debug)]
pub enum IoOutcome {
    Loaded(Result<Option<ProcessDocument>, String>),
    Saved(Result<(), String>),
}
