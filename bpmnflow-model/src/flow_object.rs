use serde::{Deserialize, Serialize};

/// Attributes shared by every flow object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseFlowObject {
    pub id: String,
    pub name: String,
}

impl BaseFlowObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// BPMN task kind. The kind decides whether the task blocks on an external
/// `taskDone` (wait task) or completes when its arrival handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    Task,
    UserTask,
    ReceiveTask,
    ManualTask,
    ServiceTask,
    ScriptTask,
    SendTask,
}

impl TaskKind {
    pub fn is_wait_task(self) -> bool {
        matches!(
            self,
            TaskKind::Task | TaskKind::UserTask | TaskKind::ReceiveTask | TaskKind::ManualTask
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Task => "task",
            TaskKind::UserTask => "userTask",
            TaskKind::ReceiveTask => "receiveTask",
            TaskKind::ManualTask => "manualTask",
            TaskKind::ServiceTask => "serviceTask",
            TaskKind::ScriptTask => "scriptTask",
            TaskKind::SendTask => "sendTask",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    #[serde(flatten)]
    pub base: BaseFlowObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndEvent {
    #[serde(flatten)]
    pub base: BaseFlowObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskObject {
    #[serde(flatten)]
    pub base: BaseFlowObject,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallActivity {
    #[serde(flatten)]
    pub base: BaseFlowObject,
    pub called_element_name: String,
    #[serde(default)]
    pub called_element_namespace: Option<String>,
    /// Where the called definition can be loaded from when it is not
    /// pre-registered by name.
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateCatchEvent {
    #[serde(flatten)]
    pub base: BaseFlowObject,
    #[serde(default)]
    pub is_timer_event: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryEvent {
    #[serde(flatten)]
    pub base: BaseFlowObject,
    /// Id of the activity this event is attached to. Only wait tasks may
    /// carry boundary events.
    pub attached_to_ref: String,
    #[serde(default)]
    pub is_timer_event: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    #[serde(flatten)]
    pub base: BaseFlowObject,
}

/// A BPMN flow object. The tag determines the token semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowObject {
    StartEvent(StartEvent),
    EndEvent(EndEvent),
    Task(TaskObject),
    CallActivity(CallActivity),
    IntermediateCatchEvent(IntermediateCatchEvent),
    BoundaryEvent(BoundaryEvent),
    ExclusiveGateway(Gateway),
    ParallelGateway(Gateway),
}

impl FlowObject {
    pub fn base(&self) -> &BaseFlowObject {
        match self {
            FlowObject::StartEvent(o) => &o.base,
            FlowObject::EndEvent(o) => &o.base,
            FlowObject::Task(o) => &o.base,
            FlowObject::CallActivity(o) => &o.base,
            FlowObject::IntermediateCatchEvent(o) => &o.base,
            FlowObject::BoundaryEvent(o) => &o.base,
            FlowObject::ExclusiveGateway(o) => &o.base,
            FlowObject::ParallelGateway(o) => &o.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn name(&self) -> &str {
        &self.base().name
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FlowObject::StartEvent(_) => "startEvent",
            FlowObject::EndEvent(_) => "endEvent",
            FlowObject::Task(t) => t.kind.as_str(),
            FlowObject::CallActivity(_) => "callActivity",
            FlowObject::IntermediateCatchEvent(_) => "intermediateCatchEvent",
            FlowObject::BoundaryEvent(_) => "boundaryEvent",
            FlowObject::ExclusiveGateway(_) => "exclusiveGateway",
            FlowObject::ParallelGateway(_) => "parallelGateway",
        }
    }

    /// True for tasks whose completion is signalled externally.
    pub fn is_wait_task(&self) -> bool {
        matches!(self, FlowObject::Task(t) if t.kind.is_wait_task())
    }

    pub fn is_timer_event(&self) -> bool {
        match self {
            FlowObject::IntermediateCatchEvent(e) => e.is_timer_event,
            FlowObject::BoundaryEvent(e) => e.is_timer_event,
            _ => false,
        }
    }

    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            FlowObject::ExclusiveGateway(_) | FlowObject::ParallelGateway(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_task_kinds() {
        assert!(TaskKind::UserTask.is_wait_task());
        assert!(TaskKind::ReceiveTask.is_wait_task());
        assert!(TaskKind::Task.is_wait_task());
        assert!(!TaskKind::ServiceTask.is_wait_task());
        assert!(!TaskKind::SendTask.is_wait_task());
    }

    #[test]
    fn serde_tag_round_trip() {
        let fo = FlowObject::Task(TaskObject {
            base: BaseFlowObject::new("_3", "Approve Order"),
            kind: TaskKind::UserTask,
        });
        let json = serde_json::to_value(&fo).unwrap();
        assert_eq!(json["type"], "task");
        assert_eq!(json["name"], "Approve Order");
        let back: FlowObject = serde_json::from_value(json).unwrap();
        assert!(back.is_wait_task());
    }
}
