pub mod collaboration;
pub mod definition;
pub mod flow_object;
pub mod loader;
pub mod validation;

pub use collaboration::{MessageFlow, Participant, SequenceFlow};
pub use definition::{DefinitionBuilder, ProcessDefinition};
pub use flow_object::{
    BaseFlowObject, BoundaryEvent, CallActivity, EndEvent, FlowObject, Gateway,
    IntermediateCatchEvent, StartEvent, TaskKind, TaskObject,
};
pub use loader::{BpmnParser, DefinitionCache, DefinitionLoader, FileLoader, LoadError};
pub use validation::{ErrorQueue, ParseErrorCode, ParseIssue};
