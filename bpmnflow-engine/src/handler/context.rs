use serde_json::{Map, Value};

use bpmnflow_model::MessageFlow;

use crate::error::EngineError;
use crate::instance::ProcessInstance;

/// What a user handler may touch while the engine is mid-dispatch. Property
/// access and event triggering are safe from inside a handler; state and
/// history stay with the pump.
#[derive(Clone)]
pub struct HandlerContext {
    instance: ProcessInstance,
    flow_name: String,
}

impl HandlerContext {
    pub(crate) fn new(instance: ProcessInstance, flow_name: impl Into<String>) -> Self {
        Self {
            instance,
            flow_name: flow_name.into(),
        }
    }

    /// Name of the flow object this handler fires for.
    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    pub fn process_id(&self) -> String {
        self.instance.process_id().to_string()
    }

    pub fn process_name(&self) -> String {
        self.instance.process_name().to_string()
    }

    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        self.instance.set_property(key, value);
    }

    pub fn get_property(&self, key: &str) -> Option<Value> {
        self.instance.get_property(key)
    }

    pub fn properties(&self) -> Map<String, Value> {
        self.instance.get_properties()
    }

    /// Enqueue an external event on this instance.
    pub fn trigger_event(&self, name: &str, data: Value) -> Result<(), EngineError> {
        self.instance.trigger_event(name, data)
    }

    /// Signal completion of a wait task on this instance.
    pub fn task_done(&self, name: &str, data: Value) {
        self.instance.task_done(name, data);
    }

    /// Deliver a message along a typed message flow to a collaborating
    /// participant.
    pub fn send_message(&self, flow: &MessageFlow, data: Value) -> Result<(), EngineError> {
        self.instance.send_message(flow, data)
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("process_id", &self.instance.process_id())
            .field("flow_name", &self.flow_name)
            .finish()
    }
}
