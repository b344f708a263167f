use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Persisted form of a main process instance. Child processes are not
/// separate records: their state rides inside call-activity tokens
/// (`substate`) and their history inside the matching history entry
/// (`subhistory`), so the engine round-trips the runtime shapes through
/// JSON values here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocument {
    pub process_name: String,
    pub process_id: String,
    #[serde(default)]
    pub parent_token: Option<Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub state: Value,
    pub history: Value,
    #[serde(default)]
    pub pending_timeouts: Value,
    #[serde(default)]
    pub views: Value,
    pub saved_at: DateTime<Utc>,
}

impl ProcessDocument {
    pub fn key(&self) -> (String, String) {
        (self.process_name.clone(), self.process_id.clone())
    }
}
