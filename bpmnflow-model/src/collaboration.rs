use serde::{Deserialize, Serialize};

/// Internal control flow between two flow objects of the same process.
/// `source_ref` / `target_ref` are flow object ids; the name is only
/// required on diverging exclusive-gateway flows, where it doubles as the
/// predicate handler key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceFlow {
    #[serde(default)]
    pub name: Option<String>,
    pub source_ref: String,
    pub target_ref: String,
}

impl SequenceFlow {
    pub fn new(source_ref: impl Into<String>, target_ref: impl Into<String>) -> Self {
        Self {
            name: None,
            source_ref: source_ref.into(),
            target_ref: target_ref.into(),
        }
    }

    pub fn named(
        name: impl Into<String>,
        source_ref: impl Into<String>,
        target_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            source_ref: source_ref.into(),
            target_ref: target_ref.into(),
        }
    }
}

/// Message wire between two collaborating processes. The process definition
/// ids identify the pools on each end; an unset target means the pool is not
/// executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFlow {
    #[serde(default)]
    pub name: Option<String>,
    pub source_ref: String,
    pub target_ref: String,
    #[serde(default)]
    pub source_process_definition_id: Option<String>,
    #[serde(default)]
    pub target_process_definition_id: Option<String>,
}

/// A pool in a collaboration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub name: String,
    pub process_ref: String,
}

impl Participant {
    pub fn new(name: impl Into<String>, process_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            process_ref: process_ref.into(),
        }
    }
}
