use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use bpmnflow_hook::EngineEvent;
use bpmnflow_model::{CallActivity, FlowObject};

use crate::error::EngineError;
use crate::event::InternalEvent;
use crate::handler::{canonical_handler_name, is_truthy};
use crate::state::Token;
use crate::views::ViewNode;

use super::{InstanceCore, ParentLink, ProcessInstance};

impl ProcessInstance {
    /// Place a token on a flow object: record the history entry, fire the
    /// begin hooks, then enqueue `TokenArrived`. History `begin` is always
    /// recorded before the arrival handler runs.
    pub(crate) async fn put_token_at(&self, core: &mut InstanceCore, fo: &FlowObject, data: Value) {
        core.state
            .put(Token::new(fo.name(), self.shared.process_id.clone()));
        core.history.add_entry(fo.name(), fo.type_name());

        if matches!(fo, FlowObject::StartEvent(_)) {
            self.shared.started.store(true, Ordering::SeqCst);
            let begin = core
                .history
                .last_entry()
                .map(|e| e.begin)
                .unwrap_or_else(Utc::now);
            core.views.start_event = Some(ViewNode {
                name: fo.name().to_string(),
                node_type: fo.type_name().to_string(),
                begin,
                end: None,
            });
            self.shared
                .hooks
                .dispatch(EngineEvent::ProcessStarted {
                    process_id: self.shared.process_id.clone(),
                    process_name: self.shared.definition.name.clone(),
                })
                .await;
        }

        if let Some(hook) = self.shared.handlers.begin_hook() {
            if let Err(reason) = hook(self.context(fo.name()), data.clone()).await {
                self.route_handler_error(fo.name(), reason).await;
            }
        }
        self.shared
            .hooks
            .dispatch(EngineEvent::NodeEnter {
                process_id: self.shared.process_id.clone(),
                flow_object: fo.name().to_string(),
                input: data.clone(),
            })
            .await;

        self.send(InternalEvent::TokenArrived {
            name: fo.name().to_string(),
            data,
        });
    }

    /// The universal advance primitive: consume the token at `fo`, clear its
    /// timers, then run the variant-specific emission.
    pub(crate) async fn emit_tokens(&self, core: &mut InstanceCore, fo: &FlowObject, data: Value) {
        core.state.remove_first_at(fo.name());

        if let FlowObject::BoundaryEvent(be) = fo {
            // the diverted activity is finished by the boundary event
            if let Some(activity) = self.shared.definition.flow_object_by_id(&be.attached_to_ref) {
                core.state.remove_first_at(activity.name());
                self.clear_timers_for(core, activity).await;
                self.finish_flow_object(core, activity, &data).await;
            }
        }
        self.clear_timers_for(core, fo).await;

        match fo {
            FlowObject::ExclusiveGateway(_) => self.emit_exclusive(core, fo, data).await,
            FlowObject::ParallelGateway(_) => self.emit_parallel(core, fo, data).await,
            FlowObject::EndEvent(_) => self.emit_end(core, fo, data).await,
            _ => self.emit_default(core, fo, data).await,
        }
    }

    /// Default emission: finish the flow object, then put a token on every
    /// outgoing target.
    async fn emit_default(&self, core: &mut InstanceCore, fo: &FlowObject, data: Value) {
        self.finish_flow_object(core, fo, &data).await;
        let targets: Vec<String> = self
            .shared
            .definition
            .outgoing_flows(fo.id())
            .iter()
            .map(|f| f.target_ref.clone())
            .collect();
        for target_ref in targets {
            if let Some(target) = self.shared.definition.flow_object_by_id(&target_ref) {
                self.put_token_at(core, target, data.clone()).await;
            }
        }
    }

    /// Diverging exclusive gateway: predicates run in definition order, the
    /// first truthy one wins. When none matches the token is consumed and
    /// nothing is emitted; `default_event_handler` makes the stuck state
    /// observable.
    async fn emit_exclusive(&self, core: &mut InstanceCore, fo: &FlowObject, data: Value) {
        self.finish_flow_object(core, fo, &data).await;

        let flows: Vec<(Option<String>, String)> = self
            .shared
            .definition
            .outgoing_flows(fo.id())
            .iter()
            .map(|f| (f.name.clone(), f.target_ref.clone()))
            .collect();

        if let [(_, target_ref)] = flows.as_slice() {
            if let Some(target) = self.shared.definition.flow_object_by_id(target_ref) {
                self.put_token_at(core, target, data).await;
            }
            return;
        }

        for (flow_name, target_ref) in &flows {
            let Some(flow_name) = flow_name.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };
            let key = canonical_handler_name(&format!("{}${}", fo.name(), flow_name));
            match self.shared.handlers.get(&key) {
                Some(predicate) => {
                    match predicate(self.context(fo.name()), data.clone()).await {
                        Ok(result) if is_truthy(&result) => {
                            if let Some(target) =
                                self.shared.definition.flow_object_by_id(target_ref)
                            {
                                self.put_token_at(core, target, data.clone()).await;
                            }
                            return;
                        }
                        Ok(_) => {}
                        Err(reason) => self.route_handler_error(fo.name(), reason).await,
                    }
                }
                None => {
                    self.route_default_event(
                        "exclusiveGateway",
                        fo.name(),
                        &key,
                        "no predicate handler registered",
                    )
                    .await
                }
            }
        }

        self.route_default_event(
            "exclusiveGateway",
            fo.name(),
            &canonical_handler_name(fo.name()),
            "no outgoing flow predicate matched",
        )
        .await;
    }

    /// Parallel gateway: tokens accumulate at the gateway until the count
    /// matches the number of incoming flows, then every outgoing flow is
    /// taken at once. A partial join is a persist point.
    async fn emit_parallel(&self, core: &mut InstanceCore, fo: &FlowObject, data: Value) {
        core.state
            .put(Token::new(fo.name(), self.shared.process_id.clone()));
        let arrivals = core.state.count_at(fo.name());
        let expected = self.shared.definition.incoming_flows(fo.id()).len();
        if arrivals < expected {
            debug!(
                process_id = %self.shared.process_id,
                gateway = fo.name(),
                arrivals, expected, "parallel join waiting"
            );
            self.request_persist(core).await;
            return;
        }

        core.state.remove_all_at(fo.name());
        core.history.set_end_all(fo.name());
        self.after_finish(fo, &data).await;

        let targets: Vec<String> = self
            .shared
            .definition
            .outgoing_flows(fo.id())
            .iter()
            .map(|f| f.target_ref.clone())
            .collect();
        for target_ref in targets {
            if let Some(target) = self.shared.definition.flow_object_by_id(&target_ref) {
                self.put_token_at(core, target, data.clone()).await;
            }
        }
    }

    /// End event: close the history, derive the summary views, then either
    /// notify the parent call activity or finish the main process.
    async fn emit_end(&self, core: &mut InstanceCore, fo: &FlowObject, data: Value) {
        self.finish_flow_object(core, fo, &data).await;
        core.history.finished_at = Some(Utc::now());

        let (begin, end) = core
            .history
            .entries
            .iter()
            .rev()
            .find(|e| e.name == fo.name())
            .map(|e| (e.begin, e.end))
            .unwrap_or((Utc::now(), None));
        core.views.end_event = Some(ViewNode {
            name: fo.name().to_string(),
            node_type: fo.type_name().to_string(),
            begin,
            end,
        });
        core.views.duration = core
            .history
            .finished_at
            .map(|finished| (finished - core.history.created_at).num_milliseconds());

        self.shared
            .hooks
            .dispatch(EngineEvent::ProcessFinished {
                process_id: self.shared.process_id.clone(),
                process_name: self.shared.definition.name.clone(),
            })
            .await;

        match self.parent_link() {
            Some(link) => {
                if let Some(parent) = link.instance.upgrade() {
                    let parent = ProcessInstance { shared: parent };
                    parent.send(InternalEvent::CalledProcessEnded {
                        call_activity: link.call_activity,
                        data,
                    });
                }
            }
            None => {
                core.closing = true;
                self.persist_now(core).await;
            }
        }
    }

    /// Instantiate the called process, wire it to this instance, and trigger
    /// its single start event.
    pub(crate) async fn enter_call_activity(
        &self,
        core: &mut InstanceCore,
        ca: &CallActivity,
        data: Value,
    ) {
        let called_process_id = format!("{}::{}", self.shared.process_id, ca.base.name);
        if let Some(token) = core.state.find_first_at_mut(&ca.base.name) {
            token.called_process_id = Some(called_process_id.clone());
        }

        let Some(resolver) = self.shared.resolver.clone() else {
            self.fail_instance(
                &ca.base.name,
                EngineError::BadCalledProcess(format!(
                    "no resolver for called process '{}'",
                    ca.called_element_name
                )),
            )
            .await;
            return;
        };
        let definition = match resolver
            .definition(&ca.called_element_name, ca.location.as_deref())
            .await
        {
            Ok(definition) => definition,
            Err(reason) => {
                self.fail_instance(&ca.base.name, EngineError::BadCalledProcess(reason))
                    .await;
                return;
            }
        };
        let handlers = match self
            .shared
            .handlers
            .get_sub_module(&canonical_handler_name(&ca.base.name))
        {
            Some(module) => module,
            None => match resolver.handlers(&ca.called_element_name).await {
                Some(module) => module,
                None => {
                    self.fail_instance(
                        &ca.base.name,
                        EngineError::BadCalledProcess(format!(
                            "no handler module for called process '{}'",
                            ca.called_element_name
                        )),
                    )
                    .await;
                    return;
                }
            },
        };

        let starts = definition.start_events();
        if starts.len() != 1 {
            self.fail_instance(
                &ca.base.name,
                EngineError::BadCalledProcess(format!(
                    "definition '{}' has {} start events, expected exactly one",
                    definition.name,
                    starts.len()
                )),
            )
            .await;
            return;
        }
        let start_name = starts[0].name().to_string();

        let child = ProcessInstance::child(
            called_process_id.clone(),
            definition,
            handlers,
            self.shared.hooks.clone(),
            Some(resolver),
            ParentLink {
                instance: Arc::downgrade(&self.shared),
                call_activity: ca.base.name.clone(),
            },
        );
        core.called_processes.insert(called_process_id, child.clone());
        if let Err(error) = child.trigger_event(&start_name, data) {
            self.route_handler_error(&ca.base.name, error.to_string())
                .await;
        }
    }

    // ---------------- timers ----------------

    /// Resolve `owner$getTimeout` and schedule a wake. A missing or
    /// non-numeric timeout is a programming error fatal to the instance.
    pub(crate) async fn arm_timer(
        &self,
        core: &mut InstanceCore,
        timer_name: &str,
        timeout_owner: &str,
        event: InternalEvent,
    ) -> bool {
        match self.resolve_timeout(timeout_owner).await {
            Ok(ms) => {
                let sender = self.shared.sender.clone();
                let fire_at = core.timers.schedule(timer_name, ms, event, move |ev| {
                    sender.send(ev);
                });
                self.shared
                    .hooks
                    .dispatch(EngineEvent::TimerScheduled {
                        process_id: self.shared.process_id.clone(),
                        event_name: timer_name.to_string(),
                        fire_at_ms: fire_at,
                    })
                    .await;
                true
            }
            Err(reason) => {
                debug!(
                    process_id = %self.shared.process_id,
                    timer = timer_name, %reason, "timeout resolution failed"
                );
                self.fail_instance(
                    timeout_owner,
                    EngineError::BadTimeout(timeout_owner.to_string()),
                )
                .await;
                false
            }
        }
    }

    async fn resolve_timeout(&self, owner_name: &str) -> Result<i64, String> {
        let key = format!("{}$getTimeout", canonical_handler_name(owner_name));
        let Some(handler) = self.shared.handlers.get(&key) else {
            return Err(format!("no '{}' handler registered", key));
        };
        let value = handler(self.context(owner_name), Value::Null)
            .await
            .map_err(|reason| format!("'{}' failed: {}", key, reason))?;
        value
            .as_f64()
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map(|ms| ms as i64)
            .ok_or_else(|| format!("'{}' returned {} instead of milliseconds", key, value))
    }

    /// Arm every timer boundary event attached to the given activity.
    pub(crate) async fn register_boundary_timers(
        &self,
        core: &mut InstanceCore,
        activity: &FlowObject,
    ) -> bool {
        let boundary_timers: Vec<String> = self
            .shared
            .definition
            .boundary_events_for(activity.id())
            .into_iter()
            .filter(|be| be.is_timer_event)
            .map(|be| be.base.name.clone())
            .collect();
        for timer_name in boundary_timers {
            let event = InternalEvent::BoundaryCatch {
                name: timer_name.clone(),
                data: Value::Null,
            };
            if !self
                .arm_timer(core, &timer_name, activity.name(), event)
                .await
            {
                return false;
            }
        }
        true
    }

    /// Timers are cancelled implicitly when their associated token is
    /// consumed: the flow object's own timer plus any boundary timers
    /// attached to it.
    async fn clear_timers_for(&self, core: &mut InstanceCore, fo: &FlowObject) {
        let mut names = vec![fo.name().to_string()];
        for be in self.shared.definition.boundary_events_for(fo.id()) {
            names.push(be.base.name.clone());
        }
        for name in names {
            if core.timers.clear(&name) {
                self.shared
                    .hooks
                    .dispatch(EngineEvent::TimerCleared {
                        process_id: self.shared.process_id.clone(),
                        event_name: name,
                    })
                    .await;
            }
        }
    }

    // ---------------- finish plumbing ----------------

    /// History `end` is recorded after the handler's result and before any
    /// downstream token is placed.
    pub(crate) async fn finish_flow_object(
        &self,
        core: &mut InstanceCore,
        fo: &FlowObject,
        data: &Value,
    ) {
        core.history.set_end(fo.name());
        self.after_finish(fo, data).await;
    }

    async fn after_finish(&self, fo: &FlowObject, data: &Value) {
        if let Some(hook) = self.shared.handlers.end_hook() {
            if let Err(reason) = hook(self.context(fo.name()), data.clone()).await {
                self.route_handler_error(fo.name(), reason).await;
            }
        }
        self.shared
            .hooks
            .dispatch(EngineEvent::NodeExit {
                process_id: self.shared.process_id.clone(),
                flow_object: fo.name().to_string(),
                output: data.clone(),
            })
            .await;
    }
}
