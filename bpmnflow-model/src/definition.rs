use std::collections::HashMap;

use crate::collaboration::{MessageFlow, Participant, SequenceFlow};
use crate::flow_object::{
    BaseFlowObject, BoundaryEvent, CallActivity, EndEvent, FlowObject, Gateway,
    IntermediateCatchEvent, StartEvent, TaskKind, TaskObject,
};
use crate::validation::{validate, ErrorQueue};

/// Index maps built once when the definition is assembled.
#[derive(Debug, Default)]
struct DefinitionIndex {
    element_by_id: HashMap<String, usize>,
    element_by_name: HashMap<String, usize>,
    flows_by_source: HashMap<String, Vec<usize>>,
    flows_by_target: HashMap<String, Vec<usize>>,
    message_flows_by_source: HashMap<String, Vec<usize>>,
    message_flows_by_target: HashMap<String, Vec<usize>>,
    boundary_events_by_attachment: HashMap<String, Vec<usize>>,
    name_to_id: HashMap<String, String>,
}

/// Immutable BPMN process graph. Read-only after construction; all runtime
/// lookups go through the prebuilt indices.
#[derive(Debug)]
pub struct ProcessDefinition {
    pub id: String,
    pub name: String,
    pub flow_objects: Vec<FlowObject>,
    pub sequence_flows: Vec<SequenceFlow>,
    pub message_flows: Vec<MessageFlow>,
    pub collaborating_participants: Vec<Participant>,
    index: DefinitionIndex,
}

impl ProcessDefinition {
    pub fn flow_object_by_id(&self, id: &str) -> Option<&FlowObject> {
        self.index
            .element_by_id
            .get(id)
            .map(|&i| &self.flow_objects[i])
    }

    pub fn flow_object_by_name(&self, name: &str) -> Option<&FlowObject> {
        self.index
            .element_by_name
            .get(name)
            .map(|&i| &self.flow_objects[i])
    }

    pub fn id_for_name(&self, name: &str) -> Option<&str> {
        self.index.name_to_id.get(name).map(String::as_str)
    }

    /// Outgoing sequence flows of the given element, in definition order.
    pub fn outgoing_flows(&self, id: &str) -> Vec<&SequenceFlow> {
        self.index
            .flows_by_source
            .get(id)
            .map(|v| v.iter().map(|&i| &self.sequence_flows[i]).collect())
            .unwrap_or_default()
    }

    pub fn incoming_flows(&self, id: &str) -> Vec<&SequenceFlow> {
        self.index
            .flows_by_target
            .get(id)
            .map(|v| v.iter().map(|&i| &self.sequence_flows[i]).collect())
            .unwrap_or_default()
    }

    pub fn message_flows_from(&self, source_ref: &str) -> Vec<&MessageFlow> {
        self.index
            .message_flows_by_source
            .get(source_ref)
            .map(|v| v.iter().map(|&i| &self.message_flows[i]).collect())
            .unwrap_or_default()
    }

    pub fn message_flows_to(&self, target_ref: &str) -> Vec<&MessageFlow> {
        self.index
            .message_flows_by_target
            .get(target_ref)
            .map(|v| v.iter().map(|&i| &self.message_flows[i]).collect())
            .unwrap_or_default()
    }

    /// Boundary events attached to the given activity id.
    pub fn boundary_events_for(&self, activity_id: &str) -> Vec<&BoundaryEvent> {
        self.index
            .boundary_events_by_attachment
            .get(activity_id)
            .map(|v| {
                v.iter()
                    .filter_map(|&i| match &self.flow_objects[i] {
                        FlowObject::BoundaryEvent(be) => Some(be),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn start_events(&self) -> Vec<&FlowObject> {
        self.flow_objects
            .iter()
            .filter(|fo| matches!(fo, FlowObject::StartEvent(_)))
            .collect()
    }

    pub fn participant_named(&self, name: &str) -> Option<&Participant> {
        self.collaborating_participants
            .iter()
            .find(|p| p.name == name)
    }
}

/// Chained construction of a [`ProcessDefinition`]. `build()` runs the
/// structural invariants and fails with the accumulated error queue.
#[derive(Debug)]
pub struct DefinitionBuilder {
    id: String,
    name: String,
    flow_objects: Vec<FlowObject>,
    sequence_flows: Vec<SequenceFlow>,
    message_flows: Vec<MessageFlow>,
    participants: Vec<Participant>,
}

impl DefinitionBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            flow_objects: Vec::new(),
            sequence_flows: Vec::new(),
            message_flows: Vec::new(),
            participants: Vec::new(),
        }
    }

    pub fn flow_object(mut self, fo: FlowObject) -> Self {
        self.flow_objects.push(fo);
        self
    }

    pub fn start_event(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.flow_object(FlowObject::StartEvent(StartEvent {
            base: BaseFlowObject::new(id, name),
        }))
    }

    pub fn end_event(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.flow_object(FlowObject::EndEvent(EndEvent {
            base: BaseFlowObject::new(id, name),
        }))
    }

    pub fn task(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        kind: TaskKind,
    ) -> Self {
        self.flow_object(FlowObject::Task(TaskObject {
            base: BaseFlowObject::new(id, name),
            kind,
        }))
    }

    pub fn call_activity(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        called_element_name: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        self.flow_object(FlowObject::CallActivity(CallActivity {
            base: BaseFlowObject::new(id, name),
            called_element_name: called_element_name.into(),
            called_element_namespace: None,
            location,
        }))
    }

    pub fn intermediate_catch_event(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        is_timer_event: bool,
    ) -> Self {
        self.flow_object(FlowObject::IntermediateCatchEvent(IntermediateCatchEvent {
            base: BaseFlowObject::new(id, name),
            is_timer_event,
        }))
    }

    pub fn boundary_event(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        attached_to_ref: impl Into<String>,
        is_timer_event: bool,
    ) -> Self {
        self.flow_object(FlowObject::BoundaryEvent(BoundaryEvent {
            base: BaseFlowObject::new(id, name),
            attached_to_ref: attached_to_ref.into(),
            is_timer_event,
        }))
    }

    pub fn exclusive_gateway(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.flow_object(FlowObject::ExclusiveGateway(Gateway {
            base: BaseFlowObject::new(id, name),
        }))
    }

    pub fn parallel_gateway(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.flow_object(FlowObject::ParallelGateway(Gateway {
            base: BaseFlowObject::new(id, name),
        }))
    }

    pub fn flow(mut self, source_ref: impl Into<String>, target_ref: impl Into<String>) -> Self {
        self.sequence_flows
            .push(SequenceFlow::new(source_ref, target_ref));
        self
    }

    pub fn named_flow(
        mut self,
        name: impl Into<String>,
        source_ref: impl Into<String>,
        target_ref: impl Into<String>,
    ) -> Self {
        self.sequence_flows
            .push(SequenceFlow::named(name, source_ref, target_ref));
        self
    }

    pub fn message_flow(mut self, flow: MessageFlow) -> Self {
        self.message_flows.push(flow);
        self
    }

    pub fn participant(mut self, participant: Participant) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn build(self) -> Result<ProcessDefinition, ErrorQueue> {
        let mut def = ProcessDefinition {
            id: self.id,
            name: self.name,
            flow_objects: self.flow_objects,
            sequence_flows: self.sequence_flows,
            message_flows: self.message_flows,
            collaborating_participants: self.participants,
            index: DefinitionIndex::default(),
        };
        def.index = build_index(&def);

        let errors = validate(&def);
        if errors.is_empty() {
            Ok(def)
        } else {
            Err(errors)
        }
    }
}

fn build_index(def: &ProcessDefinition) -> DefinitionIndex {
    let mut index = DefinitionIndex::default();

    for (i, fo) in def.flow_objects.iter().enumerate() {
        index.element_by_id.entry(fo.id().to_string()).or_insert(i);
        index
            .element_by_name
            .entry(fo.name().to_string())
            .or_insert(i);
        index
            .name_to_id
            .entry(fo.name().to_string())
            .or_insert_with(|| fo.id().to_string());
        if let FlowObject::BoundaryEvent(be) = fo {
            index
                .boundary_events_by_attachment
                .entry(be.attached_to_ref.clone())
                .or_default()
                .push(i);
        }
    }

    for (i, flow) in def.sequence_flows.iter().enumerate() {
        index
            .flows_by_source
            .entry(flow.source_ref.clone())
            .or_default()
            .push(i);
        index
            .flows_by_target
            .entry(flow.target_ref.clone())
            .or_default()
            .push(i);
    }

    for (i, flow) in def.message_flows.iter().enumerate() {
        index
            .message_flows_by_source
            .entry(flow.source_ref.clone())
            .or_default()
            .push(i);
        index
            .message_flows_by_target
            .entry(flow.target_ref.clone())
            .or_default()
            .push(i);
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ParseErrorCode;

    fn linear() -> Result<ProcessDefinition, ErrorQueue> {
        DefinitionBuilder::new("PROCESS_1", "Order")
            .start_event("_2", "start")
            .task("_3", "TaskA", TaskKind::UserTask)
            .end_event("_4", "end")
            .flow("_2", "_3")
            .flow("_3", "_4")
            .build()
    }

    #[test]
    fn builds_with_indices() {
        let def = linear().unwrap();
        assert_eq!(def.flow_object_by_name("TaskA").unwrap().id(), "_3");
        assert_eq!(def.outgoing_flows("_2").len(), 1);
        assert_eq!(def.incoming_flows("_4").len(), 1);
        assert_eq!(def.id_for_name("start"), Some("_2"));
    }

    #[test]
    fn accumulates_invariant_violations() {
        let err = DefinitionBuilder::new("PROCESS_2", "Broken")
            .start_event("_2", "start")
            .task("_3", "start", TaskKind::ServiceTask)
            .end_event("_4", "end")
            .flow("_4", "_3")
            .build()
            .unwrap_err();
        // duplicate name, start without outgoing, end with outgoing, end
        // without incoming all arrive in one queue
        assert!(err.issues.len() >= 3);
        assert!(err
            .issues
            .iter()
            .any(|i| i.code == ParseErrorCode::DuplicateName));
        assert!(err
            .issues
            .iter()
            .any(|i| i.code == ParseErrorCode::EndEventOutgoing));
    }

    #[test]
    fn boundary_event_must_attach_to_wait_task() {
        let err = DefinitionBuilder::new("PROCESS_3", "Bad boundary")
            .start_event("_2", "start")
            .task("_3", "Send", TaskKind::ServiceTask)
            .boundary_event("_5", "deadline", "_3", true)
            .end_event("_4", "end")
            .flow("_2", "_3")
            .flow("_3", "_4")
            .flow("_5", "_4")
            .build()
            .unwrap_err();
        assert!(err
            .issues
            .iter()
            .any(|i| i.code == ParseErrorCode::BadBoundaryAttachment));
    }
}
