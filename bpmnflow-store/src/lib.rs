pub mod document;
pub mod error;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

pub use document::ProcessDocument;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key-value persistence for process instances, keyed by
/// `(process_name, process_id)`. The engine treats the stored document as a
/// checkpoint: one persist per suspension point, one load per rehydration.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Fetch a single persisted instance, or `None` if it was never saved.
    async fn load(
        &self,
        process_name: &str,
        process_id: &str,
    ) -> Result<Option<ProcessDocument>, StoreError>;

    /// Fetch every persisted instance of a definition.
    async fn load_all(&self, process_name: &str) -> Result<Vec<ProcessDocument>, StoreError>;

    /// Write a checkpoint, replacing any previous one for the same key.
    async fn persist(&self, doc: ProcessDocument) -> Result<(), StoreError>;

    /// Release the underlying connection. Called once after the final
    /// persist of a main process.
    async fn close(&self) -> Result<(), StoreError>;
}
