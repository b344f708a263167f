use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::definition::ProcessDefinition;
use crate::validation::ErrorQueue;

/// External definition parser. Converting BPMN XML into the object graph is
/// out of scope for the runtime; embedders plug their parser in here.
pub trait BpmnParser: Send + Sync {
    fn parse(&self, xml: &str) -> Result<Vec<ProcessDefinition>, ErrorQueue>;
}

/// Source of definition documents, keyed by location. The default is the
/// filesystem; tests and embedded deployments provide in-memory loaders.
#[async_trait]
pub trait DefinitionLoader: Send + Sync {
    async fn load(&self, location: &str) -> Result<String, LoadError>;
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse '{location}': {errors}")]
    Parse { location: String, errors: ErrorQueue },
    #[error("no definition named '{name}' at '{location}'")]
    NotFound { name: String, location: String },
}

pub struct FileLoader;

#[async_trait]
impl DefinitionLoader for FileLoader {
    async fn load(&self, location: &str) -> Result<String, LoadError> {
        tokio::fs::read_to_string(location)
            .await
            .map_err(|source| LoadError::Io {
                location: location.to_string(),
                source,
            })
    }
}

/// Location-keyed cache in front of a loader and a parser. A location is
/// loaded and parsed at most once; subsequent lookups hit the cache.
pub struct DefinitionCache {
    loader: Arc<dyn DefinitionLoader>,
    parser: Arc<dyn BpmnParser>,
    cache: Mutex<HashMap<String, Vec<Arc<ProcessDefinition>>>>,
}

impl DefinitionCache {
    pub fn new(loader: Arc<dyn DefinitionLoader>, parser: Arc<dyn BpmnParser>) -> Self {
        Self {
            loader,
            parser,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// All process definitions found at `location`.
    pub async fn definitions_at(
        &self,
        location: &str,
    ) -> Result<Vec<Arc<ProcessDefinition>>, LoadError> {
        let mut cache = self.cache.lock().await;
        if let Some(defs) = cache.get(location) {
            return Ok(defs.clone());
        }
        let xml = self.loader.load(location).await?;
        let defs = self
            .parser
            .parse(&xml)
            .map_err(|errors| LoadError::Parse {
                location: location.to_string(),
                errors,
            })?
            .into_iter()
            .map(Arc::new)
            .collect::<Vec<_>>();
        cache.insert(location.to_string(), defs.clone());
        Ok(defs)
    }

    /// The definition named `name` at `location`.
    pub async fn definition_named(
        &self,
        location: &str,
        name: &str,
    ) -> Result<Arc<ProcessDefinition>, LoadError> {
        let defs = self.definitions_at(location).await?;
        defs.iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                name: name.to_string(),
                location: location.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionBuilder;
    use crate::flow_object::TaskKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubLoader(AtomicUsize);

    #[async_trait]
    impl DefinitionLoader for StubLoader {
        async fn load(&self, _location: &str) -> Result<String, LoadError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("<definitions/>".to_string())
        }
    }

    struct StubParser;

    impl BpmnParser for StubParser {
        fn parse(&self, _xml: &str) -> Result<Vec<ProcessDefinition>, ErrorQueue> {
            let def = DefinitionBuilder::new("P1", "Stub")
                .start_event("_1", "start")
                .task("_2", "work", TaskKind::ServiceTask)
                .end_event("_3", "end")
                .flow("_1", "_2")
                .flow("_2", "_3")
                .build()?;
            Ok(vec![def])
        }
    }

    #[tokio::test]
    async fn caches_by_location() {
        let loader = Arc::new(StubLoader(AtomicUsize::new(0)));
        let cache = DefinitionCache::new(loader.clone(), Arc::new(StubParser));
        cache.definition_named("a.bpmn", "Stub").await.unwrap();
        cache.definition_named("a.bpmn", "Stub").await.unwrap();
        assert_eq!(loader.0.load(Ordering::SeqCst), 1);
        cache.definitions_at("b.bpmn").await.unwrap();
        assert_eq!(loader.0.load(Ordering::SeqCst), 2);
    }
}
