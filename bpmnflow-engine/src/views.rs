use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub begin: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

/// Derived summary of an instance: where it started, where it ended, and how
/// long it ran (milliseconds).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessViews {
    #[serde(default)]
    pub start_event: Option<ViewNode>,
    #[serde(default)]
    pub end_event: Option<ViewNode>,
    #[serde(default)]
    pub duration: Option<i64>,
}
