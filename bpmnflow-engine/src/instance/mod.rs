mod dispatch;
mod emit;
mod persist;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::warn;

use bpmnflow_hook::EngineEventDispatcher;
use bpmnflow_model::{FlowObject, MessageFlow, ProcessDefinition};
use bpmnflow_store::ProcessStore;

use crate::error::EngineError;
use crate::event::{FlushHandle, InternalEvent};
use crate::handler::HandlerModule;
use crate::history::ProcessHistory;
use crate::resolver::CalledProcessResolver;
use crate::state::ProcessState;
use crate::timer::PendingTimers;
use crate::views::ProcessViews;

/// Non-owning link from a child instance back to the call activity that
/// spawned it.
#[derive(Clone)]
pub(crate) struct ParentLink {
    pub(crate) instance: Weak<InstanceShared>,
    pub(crate) call_activity: String,
}

/// Queue sender with an in-flight counter, so `flush` can detect
/// quiescence.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<InternalEvent>,
    pending: Arc<AtomicUsize>,
}

impl EventSender {
    fn counted(ev: &InternalEvent) -> bool {
        !matches!(ev, InternalEvent::Flush(_))
    }

    pub(crate) fn send(&self, ev: InternalEvent) -> bool {
        let counted = Self::counted(&ev);
        if counted {
            self.pending.fetch_add(1, Ordering::SeqCst);
        }
        match self.tx.send(ev) {
            Ok(()) => true,
            Err(_) => {
                if counted {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                }
                false
            }
        }
    }

    pub(crate) fn mark_dispatched(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// State the pump mutates: tokens, history, timers, children, deferral.
pub(crate) struct InstanceCore {
    pub(crate) state: ProcessState,
    pub(crate) history: ProcessHistory,
    pub(crate) timers: PendingTimers,
    pub(crate) called_processes: HashMap<String, ProcessInstance>,
    pub(crate) views: ProcessViews,
    pub(crate) defer_events: bool,
    pub(crate) deferred: VecDeque<InternalEvent>,
    pub(crate) closing: bool,
}

impl InstanceCore {
    fn new() -> Self {
        Self {
            state: ProcessState::new(),
            history: ProcessHistory::new(),
            timers: PendingTimers::new(),
            called_processes: HashMap::new(),
            views: ProcessViews::default(),
            defer_events: false,
            deferred: VecDeque::new(),
            closing: false,
        }
    }
}

pub(crate) struct InstanceShared {
    pub(crate) process_id: String,
    pub(crate) definition: Arc<ProcessDefinition>,
    pub(crate) handlers: Arc<HandlerModule>,
    pub(crate) store: Option<Arc<dyn ProcessStore>>,
    pub(crate) hooks: Arc<EngineEventDispatcher>,
    pub(crate) resolver: Option<Arc<dyn CalledProcessResolver>>,
    pub(crate) sender: EventSender,
    pub(crate) started: AtomicBool,
    pub(crate) failed: AtomicBool,
    pub(crate) properties: StdMutex<Map<String, Value>>,
    pub(crate) participants: StdMutex<HashMap<String, ProcessInstance>>,
    pub(crate) parent: StdMutex<Option<ParentLink>>,
    pub(crate) core: Mutex<InstanceCore>,
}

/// A live process instance. Cheap to clone; all clones address the same
/// state machine. Token movement, handler invocation and persistence run on
/// the instance's own pump task, so the public operations never block on
/// another instance.
#[derive(Clone)]
pub struct ProcessInstance {
    pub(crate) shared: Arc<InstanceShared>,
}

/// Serializable projection of an instance for queries and the REST view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub id: String,
    pub name: String,
    pub state: ProcessState,
    pub history: ProcessHistory,
    pub properties: Map<String, Value>,
    pub views: ProcessViews,
}

impl ProcessInstance {
    pub fn new(
        process_id: impl Into<String>,
        definition: Arc<ProcessDefinition>,
        handlers: Arc<HandlerModule>,
        store: Option<Arc<dyn ProcessStore>>,
        hooks: Arc<EngineEventDispatcher>,
        resolver: Option<Arc<dyn CalledProcessResolver>>,
    ) -> Self {
        Self::build(
            process_id.into(),
            definition,
            handlers,
            store,
            hooks,
            resolver,
            None,
        )
    }

    pub(crate) fn child(
        process_id: String,
        definition: Arc<ProcessDefinition>,
        handlers: Arc<HandlerModule>,
        hooks: Arc<EngineEventDispatcher>,
        resolver: Option<Arc<dyn CalledProcessResolver>>,
        parent: ParentLink,
    ) -> Self {
        // children never talk to the store directly; persistence walks
        // parent -> child from the main process
        Self::build(
            process_id,
            definition,
            handlers,
            None,
            hooks,
            resolver,
            Some(parent),
        )
    }

    fn build(
        process_id: String,
        definition: Arc<ProcessDefinition>,
        handlers: Arc<HandlerModule>,
        store: Option<Arc<dyn ProcessStore>>,
        hooks: Arc<EngineEventDispatcher>,
        resolver: Option<Arc<dyn CalledProcessResolver>>,
        parent: Option<ParentLink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = EventSender {
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
        };
        let shared = Arc::new(InstanceShared {
            process_id,
            definition,
            handlers,
            store,
            hooks,
            resolver,
            sender,
            started: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            properties: StdMutex::new(Map::new()),
            participants: StdMutex::new(HashMap::new()),
            parent: StdMutex::new(parent),
            core: Mutex::new(InstanceCore::new()),
        });
        tokio::spawn(pump(Arc::downgrade(&shared), rx));
        Self { shared }
    }

    // ---------------- identity ----------------

    pub fn process_id(&self) -> &str {
        &self.shared.process_id
    }

    pub fn definition(&self) -> &Arc<ProcessDefinition> {
        &self.shared.definition
    }

    pub fn process_name(&self) -> &str {
        &self.shared.definition.name
    }

    // ---------------- external events ----------------

    /// Resolve an external event name against the definition and enqueue the
    /// matching internal event. Catch and boundary triggers defer to the
    /// pump, so collaborating peers always observe a consistent published
    /// state.
    pub fn trigger_event(&self, name: &str, data: Value) -> Result<(), EngineError> {
        let definition = &self.shared.definition;
        match definition.flow_object_by_name(name) {
            Some(FlowObject::StartEvent(_)) => {
                if self.shared.started.swap(true, Ordering::SeqCst) {
                    return Err(EngineError::AlreadyStarted);
                }
                self.send(InternalEvent::TriggerStart {
                    name: name.to_string(),
                    data,
                });
                Ok(())
            }
            Some(FlowObject::IntermediateCatchEvent(_)) => {
                self.send(InternalEvent::IntermediateCatch {
                    name: name.to_string(),
                    data,
                });
                Ok(())
            }
            Some(FlowObject::BoundaryEvent(_)) => {
                self.send(InternalEvent::BoundaryCatch {
                    name: name.to_string(),
                    data,
                });
                Ok(())
            }
            _ => {
                if let Some(stripped) = name.strip_suffix("Done") {
                    let is_wait = definition
                        .flow_object_by_name(stripped)
                        .map(FlowObject::is_wait_task)
                        .unwrap_or(false);
                    if is_wait {
                        self.task_done(stripped, data);
                        return Ok(());
                    }
                }
                Err(EngineError::UnknownEvent(name.to_string()))
            }
        }
    }

    /// Signal completion of a wait task. The token may live on this instance
    /// or on a descendant called process.
    pub fn task_done(&self, name: &str, data: Value) {
        self.send(InternalEvent::ActivityEnd {
            name: name.to_string(),
            data,
        });
    }

    /// Deliver a message along a typed message flow. The target participant
    /// is found by its process definition id; an unset target id means the
    /// pool is not executable.
    pub fn send_message(&self, flow: &MessageFlow, data: Value) -> Result<(), EngineError> {
        let target_def_id = flow
            .target_process_definition_id
            .as_deref()
            .ok_or(EngineError::NoTarget)?;
        let peer = {
            let participants = self.shared.participants.lock().expect("participants poisoned");
            participants
                .values()
                .find(|p| p.definition().id == target_def_id)
                .cloned()
        }
        .ok_or(EngineError::NoTarget)?;
        let target_name = peer
            .definition()
            .flow_object_by_id(&flow.target_ref)
            .map(|fo| fo.name().to_string())
            .ok_or_else(|| EngineError::UnknownEvent(flow.target_ref.clone()))?;
        peer.trigger_event(&target_name, data)
    }

    /// The string form of `send_message` delegates to `trigger_event`.
    pub fn send_message_named(&self, event_name: &str, data: Value) -> Result<(), EngineError> {
        self.trigger_event(event_name, data)
    }

    // ---------------- properties ----------------

    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        self.shared
            .properties
            .lock()
            .expect("properties poisoned")
            .insert(key.into(), value);
    }

    pub fn get_property(&self, key: &str) -> Option<Value> {
        self.shared
            .properties
            .lock()
            .expect("properties poisoned")
            .get(key)
            .cloned()
    }

    pub fn get_properties(&self) -> Map<String, Value> {
        self.shared
            .properties
            .lock()
            .expect("properties poisoned")
            .clone()
    }

    // ---------------- collaboration ----------------

    pub fn add_participant(
        &self,
        name: impl Into<String>,
        instance: ProcessInstance,
    ) -> Result<(), crate::error::ConfigError> {
        let name = name.into();
        let mut participants = self.shared.participants.lock().expect("participants poisoned");
        if participants.contains_key(&name) {
            return Err(crate::error::ConfigError::DuplicateParticipant(name));
        }
        participants.insert(name, instance);
        Ok(())
    }

    pub fn participant(&self, name: &str) -> Option<ProcessInstance> {
        self.shared
            .participants
            .lock()
            .expect("participants poisoned")
            .get(name)
            .cloned()
    }

    // ---------------- queries ----------------

    /// True when this instance or any of its called processes has a token at
    /// `position`.
    pub fn has_token_at<'a>(
        &'a self,
        position: &'a str,
    ) -> futures::future::BoxFuture<'a, bool> {
        Box::pin(async move {
            let core = self.shared.core.lock().await;
            if core.state.has_token_at(position) {
                return true;
            }
            for child in core.called_processes.values() {
                if child.has_token_at(position).await {
                    return true;
                }
            }
            false
        })
    }

    pub async fn views(&self) -> ProcessViews {
        self.shared.core.lock().await.views.clone()
    }

    pub async fn is_finished(&self) -> bool {
        self.shared.core.lock().await.history.is_finished()
    }

    pub fn has_failed(&self) -> bool {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Serializable projection with child state and history embedded the way
    /// the persisted document nests them.
    pub async fn snapshot(&self) -> InstanceSnapshot {
        let core = self.shared.core.lock().await;
        let state = self.embedded_state(&core).await;
        let history = self.embedded_history(&core).await;
        InstanceSnapshot {
            id: self.shared.process_id.clone(),
            name: self.shared.definition.name.clone(),
            state,
            history,
            properties: self.get_properties(),
            views: core.views.clone(),
        }
    }

    /// Wait until every queued internal event (including cascades they
    /// trigger) has been dispatched. Embedder-side only; calling this from
    /// inside a handler would deadlock the pump.
    pub async fn flush(&self) {
        loop {
            let (otx, orx) = tokio::sync::oneshot::channel();
            if !self.send(InternalEvent::Flush(FlushHandle(otx))) {
                return;
            }
            let _ = orx.await;
            if self.shared.sender.pending() == 0 {
                return;
            }
        }
    }

    // ---------------- plumbing ----------------

    pub(crate) fn send(&self, ev: InternalEvent) -> bool {
        let sent = self.shared.sender.send(ev);
        if !sent {
            warn!(
                process_id = %self.shared.process_id,
                "event dropped, instance pump is gone"
            );
        }
        sent
    }

    pub(crate) fn context(&self, flow_name: &str) -> crate::handler::HandlerContext {
        crate::handler::HandlerContext::new(self.clone(), flow_name)
    }

    pub(crate) fn parent_link(&self) -> Option<ParentLink> {
        self.shared.parent.lock().expect("parent poisoned").clone()
    }
}

impl std::fmt::Debug for ProcessInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessInstance")
            .field("process_id", &self.shared.process_id)
            .field("definition", &self.shared.definition.name)
            .finish()
    }
}

/// Per-instance event loop. Exits when the last handle is dropped or the
/// channel closes.
async fn pump(shared: Weak<InstanceShared>, mut rx: mpsc::UnboundedReceiver<InternalEvent>) {
    while let Some(ev) = rx.recv().await {
        let Some(strong) = shared.upgrade() else { break };
        let instance = ProcessInstance { shared: strong };
        instance.handle_event(ev).await;
    }
}
