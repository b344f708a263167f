use thiserror::Error;

use crate::definition::ProcessDefinition;
use crate::flow_object::FlowObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorCode {
    #[error("duplicate flow object name")]
    DuplicateName,
    #[error("duplicate flow object id")]
    DuplicateId,
    #[error("start event must have no incoming flow")]
    StartEventIncoming,
    #[error("start event must have at least one outgoing flow")]
    StartEventNoOutgoing,
    #[error("end event must have no outgoing flow")]
    EndEventOutgoing,
    #[error("end event must have at least one incoming flow")]
    EndEventNoIncoming,
    #[error("boundary event must attach to a wait task")]
    BadBoundaryAttachment,
    #[error("gateway must have at least two incoming or two outgoing flows")]
    GatewayCardinality,
    #[error("diverging exclusive gateway flow must carry a non-empty name")]
    UnnamedGatewayFlow,
    #[error("sequence flow references an unknown flow object")]
    UnknownFlowRef,
}

/// One parse-time defect, pointing at the offending element.
#[derive(Debug, Clone)]
pub struct ParseIssue {
    pub code: ParseErrorCode,
    pub element: String,
    pub message: String,
}

/// Accumulated parse-time defects. Fatal to definition load.
#[derive(Debug, Clone, Default)]
pub struct ErrorQueue {
    pub issues: Vec<ParseIssue>,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: ParseErrorCode, element: impl Into<String>, message: String) {
        self.issues.push(ParseIssue {
            code,
            element: element.into(),
            message,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }
}

impl std::fmt::Display for ErrorQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} definition error(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "; {}: {}", issue.element, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorQueue {}

/// Re-checks the structural invariants of a built definition. The builder
/// runs this before handing the definition out; instance creation runs it
/// again against definitions that arrived through an external parser.
pub fn validate(def: &ProcessDefinition) -> ErrorQueue {
    let mut errors = ErrorQueue::new();

    let mut seen_names = std::collections::HashSet::new();
    let mut seen_ids = std::collections::HashSet::new();
    for fo in &def.flow_objects {
        if !seen_names.insert(fo.name().to_string()) {
            errors.push(
                ParseErrorCode::DuplicateName,
                fo.id(),
                format!("flow object name '{}' is not unique", fo.name()),
            );
        }
        if !seen_ids.insert(fo.id().to_string()) {
            errors.push(
                ParseErrorCode::DuplicateId,
                fo.id(),
                format!("flow object id '{}' is not unique", fo.id()),
            );
        }
    }

    for flow in &def.sequence_flows {
        for fo_ref in [&flow.source_ref, &flow.target_ref] {
            if def.flow_object_by_id(fo_ref).is_none() {
                errors.push(
                    ParseErrorCode::UnknownFlowRef,
                    fo_ref.clone(),
                    format!("sequence flow references unknown element '{}'", fo_ref),
                );
            }
        }
    }

    for fo in &def.flow_objects {
        let incoming = def.incoming_flows(fo.id()).len();
        let outgoing = def.outgoing_flows(fo.id()).len();
        match fo {
            FlowObject::StartEvent(_) => {
                if incoming > 0 {
                    errors.push(
                        ParseErrorCode::StartEventIncoming,
                        fo.id(),
                        format!("start event '{}' has incoming flows", fo.name()),
                    );
                }
                if outgoing == 0 {
                    errors.push(
                        ParseErrorCode::StartEventNoOutgoing,
                        fo.id(),
                        format!("start event '{}' has no outgoing flow", fo.name()),
                    );
                }
            }
            FlowObject::EndEvent(_) => {
                if outgoing > 0 {
                    errors.push(
                        ParseErrorCode::EndEventOutgoing,
                        fo.id(),
                        format!("end event '{}' has outgoing flows", fo.name()),
                    );
                }
                if incoming == 0 {
                    errors.push(
                        ParseErrorCode::EndEventNoIncoming,
                        fo.id(),
                        format!("end event '{}' has no incoming flow", fo.name()),
                    );
                }
            }
            FlowObject::BoundaryEvent(be) => {
                let attached = def.flow_object_by_id(&be.attached_to_ref);
                if !attached.map(FlowObject::is_wait_task).unwrap_or(false) {
                    errors.push(
                        ParseErrorCode::BadBoundaryAttachment,
                        fo.id(),
                        format!(
                            "boundary event '{}' is not attached to a wait task",
                            fo.name()
                        ),
                    );
                }
            }
            FlowObject::ExclusiveGateway(_) | FlowObject::ParallelGateway(_) => {
                if incoming < 2 && outgoing < 2 {
                    errors.push(
                        ParseErrorCode::GatewayCardinality,
                        fo.id(),
                        format!(
                            "gateway '{}' needs at least two incoming or two outgoing flows",
                            fo.name()
                        ),
                    );
                }
                if matches!(fo, FlowObject::ExclusiveGateway(_)) && outgoing > 1 {
                    for flow in def.outgoing_flows(fo.id()) {
                        if flow.name.as_deref().map(str::is_empty).unwrap_or(true) {
                            errors.push(
                                ParseErrorCode::UnnamedGatewayFlow,
                                fo.id(),
                                format!(
                                    "outgoing flow of diverging gateway '{}' has no name",
                                    fo.name()
                                ),
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }

    errors
}
