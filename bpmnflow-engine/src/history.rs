use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One visited flow object. `end` stays `None` while the object is active;
/// call-activity entries additionally carry the called process's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub begin: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subhistory: Option<ProcessHistory>,
}

/// Ordered visit log of one instance. Append-only except for closing `end`
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHistory {
    pub entries: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessHistory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn add_entry(&mut self, name: impl Into<String>, entry_type: impl Into<String>) {
        self.entries.push(HistoryEntry {
            name: name.into(),
            entry_type: entry_type.into(),
            begin: Utc::now(),
            end: None,
            subhistory: None,
        });
    }

    /// Close the most recent open entry with the given name.
    pub fn set_end(&mut self, name: &str) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.name == name && e.end.is_none())
        {
            entry.end = Some(Utc::now());
        }
    }

    /// Close every open entry with the given name (parallel-join arrivals).
    pub fn set_end_all(&mut self, name: &str) {
        let now = Utc::now();
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.name == name && e.end.is_none())
        {
            entry.end = Some(now);
        }
    }

    pub fn has_begun(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn last_entry(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// The most recent open entry with the given name.
    pub fn open_entry_mut(&mut self, name: &str) -> Option<&mut HistoryEntry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|e| e.name == name && e.end.is_none())
    }

    /// Detach the nested history of the most recent entry with the given
    /// name. Used while rehydrating: the parent keeps a flat log, the child
    /// instance owns its own copy.
    pub fn take_subhistory(&mut self, name: &str) -> Option<ProcessHistory> {
        self.entries
            .iter_mut()
            .rev()
            .find(|e| e.name == name)
            .and_then(|e| e.subhistory.take())
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

impl Default for ProcessHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_end_closes_latest_open_entry() {
        let mut history = ProcessHistory::new();
        history.add_entry("join", "parallelGateway");
        history.add_entry("join", "parallelGateway");
        history.set_end("join");
        assert_eq!(
            history.entries.iter().filter(|e| e.end.is_some()).count(),
            1
        );
        history.set_end_all("join");
        assert!(history.entries.iter().all(|e| e.end.is_some()));
    }
}
