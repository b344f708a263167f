use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::ProcessDocument;
use crate::error::StoreError;
use crate::ProcessStore;

/// HashMap-backed store for tests and embedded deployments without a
/// database.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(String, String), ProcessDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl ProcessStore for MemoryStore {
    async fn load(
        &self,
        process_name: &str,
        process_id: &str,
    ) -> Result<Option<ProcessDocument>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&(process_name.to_string(), process_id.to_string()))
            .cloned())
    }

    async fn load_all(&self, process_name: &str) -> Result<Vec<ProcessDocument>, StoreError> {
        let documents = self.documents.read().await;
        let mut docs: Vec<ProcessDocument> = documents
            .values()
            .filter(|d| d.process_name == process_name)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.process_id.cmp(&b.process_id));
        Ok(docs)
    }

    async fn persist(&self, doc: ProcessDocument) -> Result<(), StoreError> {
        self.documents.write().await.insert(doc.key(), doc);
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
