use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{error, warn};

use bpmnflow_hook::EngineEvent;
use bpmnflow_model::FlowObject;
use bpmnflow_store::ProcessDocument;

use crate::error::ConfigError;
use crate::event::{InternalEvent, IoOutcome};
use crate::handler::canonical_handler_name;
use crate::history::ProcessHistory;
use crate::state::ProcessState;
use crate::timer::TimerRecord;
use crate::views::ProcessViews;

use super::{InstanceCore, ParentLink, ProcessInstance};

impl ProcessInstance {
    /// Hit a persist trigger. Children bubble the request up to the main
    /// process; only the main process talks to the store.
    pub(crate) async fn request_persist(&self, core: &mut InstanceCore) {
        match self.parent_link() {
            Some(link) => {
                if let Some(parent) = link.instance.upgrade() {
                    let parent = ProcessInstance { shared: parent };
                    parent.send(InternalEvent::PersistRequest);
                }
            }
            None => self.persist_now(core).await,
        }
    }

    /// Spawn the store write and close the deferral gate. Incoming events
    /// buffer until the matching `IoComplete` arrives, which also keeps at
    /// most one persist outstanding per main instance.
    pub(crate) async fn persist_now(&self, core: &mut InstanceCore) {
        let Some(store) = self.shared.store.clone() else {
            return;
        };
        let doc = self.build_document(core).await;
        core.defer_events = true;
        let sender = self.shared.sender.clone();
        tokio::spawn(async move {
            let result = store.persist(doc).await.map_err(|e| e.to_string());
            sender.send(InternalEvent::IoComplete(IoOutcome::Saved(result)));
        });
    }

    /// Rehydrate from the store on construction. Events arriving before the
    /// load completes are deferred.
    pub(crate) async fn begin_load(&self) {
        let Some(store) = self.shared.store.clone() else {
            return;
        };
        {
            let mut core = self.shared.core.lock().await;
            core.defer_events = true;
        }
        let sender = self.shared.sender.clone();
        let process_name = self.shared.definition.name.clone();
        let process_id = self.shared.process_id.clone();
        tokio::spawn(async move {
            let result = store
                .load(&process_name, &process_id)
                .await
                .map_err(|e| e.to_string());
            sender.send(InternalEvent::IoComplete(IoOutcome::Loaded(result)));
        });
    }

    /// Apply a document fetched outside the instance (manager `load_all`).
    pub async fn set_persisted_data(&self, doc: ProcessDocument) -> Result<(), ConfigError> {
        {
            let mut core = self.shared.core.lock().await;
            self.apply_document(&mut core, doc)
                .await
                .map_err(ConfigError::BadPersistedDocument)?;
        }
        self.shared
            .hooks
            .dispatch(EngineEvent::DocumentLoaded {
                process_id: self.shared.process_id.clone(),
            })
            .await;
        if let Some(hook) = self.shared.handlers.loading_hook() {
            hook(self.context(self.process_name()), None).await;
        }
        Ok(())
    }

    // ---------------- document building ----------------

    pub(crate) async fn build_document(&self, core: &InstanceCore) -> ProcessDocument {
        let state = self.embedded_state(core).await;
        let history = self.embedded_history(core).await;
        ProcessDocument {
            process_name: self.shared.definition.name.clone(),
            process_id: self.shared.process_id.clone(),
            parent_token: None,
            properties: self.get_properties(),
            state: serde_json::to_value(&state).expect("state serializes"),
            history: serde_json::to_value(&history).expect("history serializes"),
            pending_timeouts: serde_json::to_value(&core.timers.timeouts)
                .expect("timeouts serialize"),
            views: serde_json::to_value(&core.views).expect("views serialize"),
            saved_at: Utc::now(),
        }
    }

    /// Clone of the token set with every call-activity token carrying its
    /// child's state, recursively.
    pub(crate) fn embedded_state<'a>(
        &'a self,
        core: &'a InstanceCore,
    ) -> BoxFuture<'a, ProcessState> {
        Box::pin(async move {
            let mut state = core.state.clone();
            for token in &mut state.tokens {
                let Some(called_process_id) = &token.called_process_id else {
                    continue;
                };
                let Some(child) = core.called_processes.get(called_process_id) else {
                    continue;
                };
                let child_core = child.shared.core.lock().await;
                token.substate = Some(child.embedded_state(&child_core).await);
            }
            state
        })
    }

    /// Clone of the history with call-activity entries carrying the child's
    /// history, recursively.
    pub(crate) fn embedded_history<'a>(
        &'a self,
        core: &'a InstanceCore,
    ) -> BoxFuture<'a, ProcessHistory> {
        Box::pin(async move {
            let mut history = core.history.clone();
            for child in core.called_processes.values() {
                let Some(link) = child.parent_link() else {
                    continue;
                };
                let child_core = child.shared.core.lock().await;
                let subhistory = child.embedded_history(&child_core).await;
                if let Some(entry) = history.open_entry_mut(&link.call_activity) {
                    entry.subhistory = Some(subhistory);
                }
            }
            history
        })
    }

    // ---------------- rehydration ----------------

    async fn apply_document(
        &self,
        core: &mut InstanceCore,
        doc: ProcessDocument,
    ) -> Result<(), String> {
        let state: ProcessState =
            serde_json::from_value(doc.state).map_err(|e| format!("bad state: {}", e))?;
        let history: ProcessHistory =
            serde_json::from_value(doc.history).map_err(|e| format!("bad history: {}", e))?;
        let timeouts: HashMap<String, TimerRecord> = if doc.pending_timeouts.is_null() {
            HashMap::new()
        } else {
            serde_json::from_value(doc.pending_timeouts)
                .map_err(|e| format!("bad pending timeouts: {}", e))?
        };
        let views: ProcessViews = if doc.views.is_null() {
            ProcessViews::default()
        } else {
            serde_json::from_value(doc.views).map_err(|e| format!("bad views: {}", e))?
        };
        *self.shared.properties.lock().expect("properties poisoned") = doc.properties;
        self.apply_persisted(core, state, history, timeouts, views)
            .await
    }

    /// Install persisted state, recreating a child instance for every
    /// call-activity token and rescheduling timers with the remaining
    /// duration (overdue timers fire immediately).
    fn apply_persisted<'a>(
        &'a self,
        core: &'a mut InstanceCore,
        mut state: ProcessState,
        mut history: ProcessHistory,
        timeouts: HashMap<String, TimerRecord>,
        views: ProcessViews,
    ) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async move {
            for token in &mut state.tokens {
                let Some(called_process_id) = token.called_process_id.clone() else {
                    continue;
                };
                let substate = token.substate.take().unwrap_or_default();
                let subhistory = history
                    .take_subhistory(&token.position)
                    .unwrap_or_default();

                let Some(FlowObject::CallActivity(ca)) =
                    self.shared.definition.flow_object_by_name(&token.position)
                else {
                    return Err(format!(
                        "persisted token at '{}' claims a called process but the definition has no call activity there",
                        token.position
                    ));
                };
                let Some(resolver) = self.shared.resolver.clone() else {
                    return Err(format!(
                        "no resolver for called process '{}'",
                        ca.called_element_name
                    ));
                };
                let definition = resolver
                    .definition(&ca.called_element_name, ca.location.as_deref())
                    .await?;
                let handlers = match self
                    .shared
                    .handlers
                    .get_sub_module(&canonical_handler_name(&ca.base.name))
                {
                    Some(module) => module,
                    None => resolver
                        .handlers(&ca.called_element_name)
                        .await
                        .ok_or_else(|| {
                            format!(
                                "no handler module for called process '{}'",
                                ca.called_element_name
                            )
                        })?,
                };

                let child = ProcessInstance::child(
                    called_process_id.clone(),
                    definition,
                    handlers,
                    self.shared.hooks.clone(),
                    Some(resolver),
                    ParentLink {
                        instance: Arc::downgrade(&self.shared),
                        call_activity: token.position.clone(),
                    },
                );
                {
                    let mut child_core = child.shared.core.lock().await;
                    child
                        .apply_persisted(
                            &mut child_core,
                            substate,
                            subhistory,
                            HashMap::new(),
                            ProcessViews::default(),
                        )
                        .await?;
                }
                core.called_processes.insert(called_process_id, child);
            }

            self.shared
                .started
                .store(!history.entries.is_empty(), Ordering::SeqCst);
            core.state = state;
            core.history = history;
            core.views = views;

            for (name, record) in timeouts {
                let event = match self.shared.definition.flow_object_by_name(&name) {
                    Some(FlowObject::IntermediateCatchEvent(_)) => {
                        InternalEvent::IntermediateCatch {
                            name: name.clone(),
                            data: Value::Null,
                        }
                    }
                    Some(FlowObject::BoundaryEvent(_)) => InternalEvent::BoundaryCatch {
                        name: name.clone(),
                        data: Value::Null,
                    },
                    _ => {
                        warn!(timer = %name, "persisted timeout has no timer event, dropped");
                        continue;
                    }
                };
                let sender = self.shared.sender.clone();
                let fire_at = record.at;
                core.timers.schedule_record(&name, record, event, move |ev| {
                    sender.send(ev);
                });
                self.shared
                    .hooks
                    .dispatch(EngineEvent::TimerScheduled {
                        process_id: self.shared.process_id.clone(),
                        event_name: name,
                        fire_at_ms: fire_at,
                    })
                    .await;
            }
            Ok(())
        })
    }

    // ---------------- I/O completion ----------------

    pub(crate) async fn on_io_complete(&self, core: &mut InstanceCore, outcome: IoOutcome) {
        match outcome {
            IoOutcome::Saved(Ok(())) => {
                core.defer_events = false;
                self.shared
                    .hooks
                    .dispatch(EngineEvent::DocumentPersisted {
                        process_id: self.shared.process_id.clone(),
                    })
                    .await;
                if let Some(hook) = self.shared.handlers.saving_hook() {
                    hook(self.context(self.process_name()), None).await;
                }
                if core.closing {
                    if let Some(store) = self.shared.store.clone() {
                        if let Err(store_error) = store.close().await {
                            warn!(
                                process_id = %self.shared.process_id,
                                %store_error, "store close failed"
                            );
                        }
                    }
                }
            }
            IoOutcome::Saved(Err(reason)) => {
                // the gate stays closed: deferred events are not released
                // and the instance freezes pending operator intervention
                error!(
                    process_id = %self.shared.process_id,
                    %reason, "persist failed"
                );
                if let Some(hook) = self.shared.handlers.saving_hook() {
                    hook(self.context(self.process_name()), Some(reason)).await;
                }
            }
            IoOutcome::Loaded(Ok(Some(doc))) => match self.apply_document(core, doc).await {
                Ok(()) => {
                    core.defer_events = false;
                    self.shared
                        .hooks
                        .dispatch(EngineEvent::DocumentLoaded {
                            process_id: self.shared.process_id.clone(),
                        })
                        .await;
                    if let Some(hook) = self.shared.handlers.loading_hook() {
                        hook(self.context(self.process_name()), None).await;
                    }
                }
                Err(reason) => {
                    error!(
                        process_id = %self.shared.process_id,
                        %reason, "persisted document rejected"
                    );
                    if let Some(hook) = self.shared.handlers.loading_hook() {
                        hook(self.context(self.process_name()), Some(reason)).await;
                    }
                }
            },
            IoOutcome::Loaded(Ok(None)) => {
                // nothing persisted for this id; run from scratch
                core.defer_events = false;
                if let Some(hook) = self.shared.handlers.loading_hook() {
                    hook(self.context(self.process_name()), None).await;
                }
            }
            IoOutcome::Loaded(Err(reason)) => {
                error!(
                    process_id = %self.shared.process_id,
                    %reason, "load failed"
                );
                if let Some(hook) = self.shared.handlers.loading_hook() {
                    hook(self.context(self.process_name()), Some(reason)).await;
                }
            }
        }
    }
}
