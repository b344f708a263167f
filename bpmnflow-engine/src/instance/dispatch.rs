use std::sync::atomic::Ordering;

use serde_json::Value;
use tracing::{debug, error};

use bpmnflow_hook::EngineEvent;
use bpmnflow_model::FlowObject;

use crate::error::EngineError;
use crate::event::InternalEvent;
use crate::handler::{canonical_handler_name, EventDiagnostic};

use super::{InstanceCore, ProcessInstance};

impl ProcessInstance {
    pub(crate) async fn handle_event(&self, ev: InternalEvent) {
        let mut core = self.shared.core.lock().await;
        self.process_one(&mut core, ev).await;
        // deferred events released by an IoComplete re-dispatch in enqueue
        // order, re-suspending if one of them starts another persist
        while !core.defer_events {
            let Some(next) = core.deferred.pop_front() else { break };
            self.process_one(&mut core, next).await;
        }
    }

    async fn process_one(&self, core: &mut InstanceCore, ev: InternalEvent) {
        match ev {
            InternalEvent::IoComplete(outcome) => {
                self.on_io_complete(core, outcome).await;
                self.shared.sender.mark_dispatched();
            }
            ev if core.defer_events => core.deferred.push_back(ev),
            InternalEvent::Flush(handle) => {
                let _ = handle.0.send(());
            }
            ev => {
                if self.shared.failed.load(Ordering::SeqCst) {
                    self.shared.sender.mark_dispatched();
                    return;
                }
                self.dispatch(core, ev).await;
                self.shared.sender.mark_dispatched();
            }
        }
    }

    async fn dispatch(&self, core: &mut InstanceCore, ev: InternalEvent) {
        debug!(process_id = %self.shared.process_id, event = ?ev, "dispatch");
        match ev {
            InternalEvent::TriggerStart { name, data } => {
                if let Some(fo) = self.shared.definition.flow_object_by_name(&name) {
                    self.put_token_at(core, fo, data).await;
                }
            }
            InternalEvent::TokenArrived { name, data } => {
                self.on_token_arrived(core, name, data).await
            }
            InternalEvent::ActivityEnd { name, data } => {
                self.on_activity_end(core, name, data).await
            }
            InternalEvent::IntermediateCatch { name, data } => {
                self.on_intermediate_catch(core, name, data).await
            }
            InternalEvent::BoundaryCatch { name, data } => {
                self.on_boundary_catch(core, name, data).await
            }
            InternalEvent::CalledProcessEnded {
                call_activity,
                data,
            } => self.on_called_process_ended(core, call_activity, data).await,
            InternalEvent::PersistRequest => self.request_persist(core).await,
            // both handled in process_one
            InternalEvent::IoComplete(_) | InternalEvent::Flush(_) => {}
        }
    }

    // ---------------- TOKEN_ARRIVED ----------------

    async fn on_token_arrived(&self, core: &mut InstanceCore, name: String, data: Value) {
        let Some(fo) = self.shared.definition.flow_object_by_name(&name) else {
            self.route_default_event(
                "tokenArrived",
                &name,
                &canonical_handler_name(&name),
                &EngineError::UnknownEvent(name.clone()).to_string(),
            )
            .await;
            return;
        };
        match fo {
            // catch events wait for an external trigger or their timer; the
            // arrival handler fires on the catch, not on arrival
            FlowObject::IntermediateCatchEvent(ev) => {
                if ev.is_timer_event
                    && !self
                        .arm_timer(
                            core,
                            &name,
                            &name,
                            InternalEvent::IntermediateCatch {
                                name: name.clone(),
                                data: Value::Null,
                            },
                        )
                        .await
                {
                    return;
                }
                self.request_persist(core).await;
            }
            FlowObject::Task(task) if task.kind.is_wait_task() => {
                self.invoke_flow_handler("tokenArrived", &name, data).await;
                if !self.register_boundary_timers(core, fo).await {
                    return;
                }
                self.request_persist(core).await;
            }
            FlowObject::CallActivity(ca) => {
                let result = self.invoke_flow_handler("tokenArrived", &name, data).await;
                if !self.register_boundary_timers(core, fo).await {
                    return;
                }
                self.enter_call_activity(core, ca, result).await;
            }
            _ => {
                let result = self.invoke_flow_handler("tokenArrived", &name, data).await;
                self.emit_tokens(core, fo, result).await;
            }
        }
    }

    // ---------------- ACTIVITY_END ----------------

    async fn on_activity_end(&self, core: &mut InstanceCore, name: String, data: Value) {
        if core.state.has_token_at(&name) {
            let Some(fo) = self.shared.definition.flow_object_by_name(&name) else {
                return;
            };
            let handler_key = format!("{}Done", canonical_handler_name(&name));
            let result = self
                .invoke_named_handler("activityEnd", &name, &handler_key, data)
                .await;
            self.emit_tokens(core, fo, result).await;
            return;
        }

        // the token may belong to a descendant called process
        let children: Vec<ProcessInstance> = core.called_processes.values().cloned().collect();
        for child in children {
            if child.has_token_at(&name).await {
                child.send(InternalEvent::ActivityEnd { name, data });
                return;
            }
        }

        self.route_default_event(
            "activityEnd",
            &name,
            &format!("{}Done", canonical_handler_name(&name)),
            &EngineError::NotExecuting(name.clone()).to_string(),
        )
        .await;
    }

    // ---------------- INTERMEDIATE_CATCH ----------------

    async fn on_intermediate_catch(&self, core: &mut InstanceCore, name: String, data: Value) {
        if !core.state.has_token_at(&name) {
            self.route_default_event(
                "intermediateCatch",
                &name,
                &canonical_handler_name(&name),
                &EngineError::NotExecuting(name.clone()).to_string(),
            )
            .await;
            return;
        }
        let Some(fo) = self.shared.definition.flow_object_by_name(&name) else {
            return;
        };
        let result = self
            .invoke_flow_handler("intermediateCatch", &name, data)
            .await;
        self.emit_tokens(core, fo, result).await;
    }

    // ---------------- BOUNDARY_CATCH ----------------

    async fn on_boundary_catch(&self, core: &mut InstanceCore, name: String, data: Value) {
        let Some(FlowObject::BoundaryEvent(be)) =
            self.shared.definition.flow_object_by_name(&name)
        else {
            self.route_default_event(
                "boundaryCatch",
                &name,
                &canonical_handler_name(&name),
                &EngineError::UnknownEvent(name.clone()).to_string(),
            )
            .await;
            return;
        };
        let Some(activity) = self.shared.definition.flow_object_by_id(&be.attached_to_ref) else {
            return;
        };
        if core.state.has_token_at(activity.name()) {
            core.state.remove_first_at(activity.name());
            let fo = self
                .shared
                .definition
                .flow_object_by_name(&name)
                .expect("boundary event resolved above");
            self.put_token_at(core, fo, data).await;
        } else {
            self.route_default_event(
                "boundaryCatch",
                &name,
                &canonical_handler_name(&name),
                &EngineError::NotExecuting(activity.name().to_string()).to_string(),
            )
            .await;
        }
    }

    // ---------------- call-activity return ----------------

    async fn on_called_process_ended(
        &self,
        core: &mut InstanceCore,
        call_activity: String,
        data: Value,
    ) {
        let Some(fo) = self.shared.definition.flow_object_by_name(&call_activity) else {
            return;
        };
        let called_process_id = core
            .state
            .find_first_at(&call_activity)
            .and_then(|t| t.called_process_id.clone());

        // freeze the child's history into the call-activity entry before the
        // child is unregistered
        if let Some(child) = called_process_id
            .as_ref()
            .and_then(|id| core.called_processes.get(id))
            .cloned()
        {
            let child_core = child.shared.core.lock().await;
            let subhistory = child.embedded_history(&child_core).await;
            drop(child_core);
            if let Some(entry) = core.history.open_entry_mut(&call_activity) {
                entry.subhistory = Some(subhistory);
            }
        }

        let handler_key = format!("{}Done", canonical_handler_name(&call_activity));
        let result = self
            .invoke_named_handler("callActivityDone", &call_activity, &handler_key, data)
            .await;
        self.emit_tokens(core, fo, result).await;
        if let Some(called_process_id) = called_process_id {
            core.called_processes.remove(&called_process_id);
        }
    }

    // ---------------- handler plumbing ----------------

    pub(crate) async fn invoke_flow_handler(
        &self,
        event_type: &str,
        flow_name: &str,
        data: Value,
    ) -> Value {
        let key = canonical_handler_name(flow_name);
        self.invoke_named_handler(event_type, flow_name, &key, data)
            .await
    }

    /// Run the handler registered under `handler_key`. A missing handler
    /// routes through `default_event_handler` and a failing one through
    /// `default_error_handler`; in both cases the token advances with its
    /// input data unchanged.
    pub(crate) async fn invoke_named_handler(
        &self,
        event_type: &str,
        flow_name: &str,
        handler_key: &str,
        data: Value,
    ) -> Value {
        match self.shared.handlers.get(handler_key) {
            Some(handler) => match handler(self.context(flow_name), data.clone()).await {
                Ok(result) => result,
                Err(reason) => {
                    self.route_handler_error(flow_name, reason).await;
                    data
                }
            },
            None => {
                self.route_default_event(
                    event_type,
                    flow_name,
                    handler_key,
                    "no handler registered",
                )
                .await;
                data
            }
        }
    }

    pub(crate) async fn route_default_event(
        &self,
        event_type: &str,
        flow_name: &str,
        handler_name: &str,
        reason: &str,
    ) {
        debug!(
            process_id = %self.shared.process_id,
            event_type, flow_name, reason, "routed to default event handler"
        );
        if let Some(handler) = self.shared.handlers.event_diagnostic() {
            handler(
                self.context(flow_name),
                EventDiagnostic {
                    event_type: event_type.to_string(),
                    flow_name: flow_name.to_string(),
                    handler_name: handler_name.to_string(),
                    reason: reason.to_string(),
                },
            )
            .await;
        }
    }

    pub(crate) async fn route_handler_error(&self, flow_name: &str, reason: String) {
        error!(
            process_id = %self.shared.process_id,
            flow_name, %reason, "handler failed"
        );
        if let Some(handler) = self.shared.handlers.error_handler() {
            handler(self.context(flow_name), reason).await;
        }
    }

    /// `BadTimeout` and `BadCalledProcess` land here: the instance stops
    /// advancing tokens and only an operator restart can revive it.
    pub(crate) async fn fail_instance(&self, flow_name: &str, error: EngineError) {
        self.shared.failed.store(true, Ordering::SeqCst);
        error!(
            process_id = %self.shared.process_id,
            %error, "instance failed"
        );
        self.shared
            .hooks
            .dispatch(EngineEvent::InstanceFailed {
                process_id: self.shared.process_id.clone(),
                error: error.to_string(),
            })
            .await;
        if let Some(handler) = self.shared.handlers.error_handler() {
            handler(self.context(flow_name), error.to_string()).await;
        }
    }
}
