use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};
use uuid::Uuid;

use bpmnflow_hook::EngineEventDispatcher;
use bpmnflow_model::{DefinitionCache, ProcessDefinition};
use bpmnflow_store::ProcessStore;

use crate::error::ConfigError;
use crate::handler::HandlerModule;
use crate::instance::ProcessInstance;
use crate::resolver::CalledProcessResolver;

/// One pool of a collaborating set to create.
#[derive(Debug, Clone)]
pub struct CollaborationDescriptor {
    pub name: String,
    pub id: String,
}

struct ManagerState {
    definitions: HashMap<String, Arc<ProcessDefinition>>,
    handlers: HashMap<String, Arc<HandlerModule>>,
    cache: HashMap<String, ProcessInstance>,
    initialized: bool,
    initialising: bool,
    initialization_error: Option<String>,
    queued_definitions: VecDeque<(Arc<ProcessDefinition>, Arc<HandlerModule>)>,
}

struct ManagerInner {
    store: Option<Arc<dyn ProcessStore>>,
    hooks: Arc<EngineEventDispatcher>,
    definition_cache: Option<Arc<DefinitionCache>>,
    state: Mutex<ManagerState>,
    init_notify: Notify,
}

/// Owns definitions, handler modules, and the live instance cache.
/// Registration drains asynchronously (rehydrating persisted instances when
/// a store is configured); every public operation waits behind the
/// initialization gate.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<ManagerInner>,
}

impl ProcessManager {
    pub fn new(
        store: Option<Arc<dyn ProcessStore>>,
        hooks: Arc<EngineEventDispatcher>,
        definition_cache: Option<Arc<DefinitionCache>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                hooks,
                definition_cache,
                state: Mutex::new(ManagerState {
                    definitions: HashMap::new(),
                    handlers: HashMap::new(),
                    cache: HashMap::new(),
                    // vacuously initialized until the first definition queues
                    initialized: true,
                    initialising: false,
                    initialization_error: None,
                    queued_definitions: VecDeque::new(),
                }),
                init_notify: Notify::new(),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None, Arc::new(EngineEventDispatcher::empty()), None)
    }

    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    // ---------------- initialization gate ----------------

    /// Queue a definition with its handler module and kick the drain if it
    /// is not already running.
    pub async fn add_definition(&self, definition: ProcessDefinition, handlers: Arc<HandlerModule>) {
        let mut st = self.inner.state.lock().await;
        st.queued_definitions
            .push_back((Arc::new(definition), handlers));
        st.initialized = false;
        if !st.initialising {
            st.initialising = true;
            let inner = self.inner.clone();
            tokio::spawn(drain(inner));
        }
    }

    /// Resolve once every queued definition is registered (and its persisted
    /// instances are materialized), or fail with the recorded
    /// initialization error.
    pub async fn after_initialization(&self) -> Result<(), ConfigError> {
        loop {
            let notified = self.inner.init_notify.notified();
            tokio::pin!(notified);
            // register before the check so a drain finishing in between
            // cannot produce a lost wakeup
            notified.as_mut().enable();
            {
                let st = self.inner.state.lock().await;
                if let Some(reason) = &st.initialization_error {
                    return Err(ConfigError::Initialization(reason.clone()));
                }
                if st.initialized && !st.initialising {
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    // ---------------- creation ----------------

    /// Create an instance when exactly one definition is registered.
    pub async fn create_process(
        &self,
        id: impl Into<String>,
    ) -> Result<ProcessInstance, ConfigError> {
        self.after_initialization().await?;
        let (definition, handlers) = {
            let st = self.inner.state.lock().await;
            if st.definitions.len() != 1 {
                return Err(ConfigError::AmbiguousDefinition(st.definitions.len()));
            }
            let (name, definition) = st
                .definitions
                .iter()
                .next()
                .expect("one definition present");
            let handlers = st
                .handlers
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingHandler(name.clone()))?;
            (definition.clone(), handlers)
        };
        self.create_with(id.into(), definition, handlers).await
    }

    /// Create an instance of the named definition.
    pub async fn create_process_named(
        &self,
        name: &str,
        id: impl Into<String>,
    ) -> Result<ProcessInstance, ConfigError> {
        self.after_initialization().await?;
        let (definition, handlers) = self.definition_and_handlers(name).await?;
        self.create_with(id.into(), definition, handlers).await
    }

    /// Create a collaborating set: every pool is instantiated sequentially,
    /// then peers are wired by participant name. Id collisions are checked
    /// both before and after creation to catch races.
    pub async fn create_collaboration(
        &self,
        descriptors: &[CollaborationDescriptor],
    ) -> Result<Vec<ProcessInstance>, ConfigError> {
        self.after_initialization().await?;
        {
            let st = self.inner.state.lock().await;
            let mut seen = HashSet::new();
            for d in descriptors {
                if !seen.insert(d.id.clone()) || st.cache.contains_key(&d.id) {
                    return Err(ConfigError::DuplicateProcessId(d.id.clone()));
                }
                if !st.definitions.contains_key(&d.name) {
                    return Err(ConfigError::UnknownDefinition(d.name.clone()));
                }
            }
        }

        let mut created = Vec::with_capacity(descriptors.len());
        for d in descriptors {
            let (definition, handlers) = self.definition_and_handlers(&d.name).await?;
            let instance = self.create_with(d.id.clone(), definition, handlers).await?;
            created.push(instance);
        }

        for instance in &created {
            for participant in &instance.definition().collaborating_participants {
                let Some(peer) = created
                    .iter()
                    .find(|p| p.definition().id == participant.process_ref)
                else {
                    continue;
                };
                if peer.process_id() == instance.process_id() {
                    continue;
                }
                instance.add_participant(&participant.name, peer.clone())?;
            }
        }
        info!(count = created.len(), "collaboration created");
        Ok(created)
    }

    async fn definition_and_handlers(
        &self,
        name: &str,
    ) -> Result<(Arc<ProcessDefinition>, Arc<HandlerModule>), ConfigError> {
        let st = self.inner.state.lock().await;
        let definition = st
            .definitions
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDefinition(name.to_string()))?;
        let handlers = st
            .handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingHandler(name.to_string()))?;
        Ok((definition, handlers))
    }

    async fn create_with(
        &self,
        id: String,
        definition: Arc<ProcessDefinition>,
        handlers: Arc<HandlerModule>,
    ) -> Result<ProcessInstance, ConfigError> {
        let instance = {
            let mut st = self.inner.state.lock().await;
            if st.cache.contains_key(&id) {
                return Err(ConfigError::DuplicateProcessId(id));
            }
            let instance = ProcessInstance::new(
                id.clone(),
                definition,
                handlers,
                self.inner.store.clone(),
                self.inner.hooks.clone(),
                Some(self.resolver()),
            );
            st.cache.insert(id.clone(), instance.clone());
            instance
        };
        debug!(process_id = %id, "instance created");
        instance.begin_load().await;
        Ok(instance)
    }

    fn resolver(&self) -> Arc<dyn CalledProcessResolver> {
        Arc::new(ManagerResolver {
            inner: Arc::downgrade(&self.inner),
            cache: self.inner.definition_cache.clone(),
        })
    }

    // ---------------- queries ----------------

    pub async fn get_process(&self, id: &str) -> Option<ProcessInstance> {
        self.inner.state.lock().await.cache.get(id).cloned()
    }

    pub async fn remove_process(&self, id: &str) -> Option<ProcessInstance> {
        self.inner.state.lock().await.cache.remove(id)
    }

    pub async fn instances(&self) -> Vec<ProcessInstance> {
        // clone the handles out so queries never hold the manager lock while
        // touching instance state
        self.inner.state.lock().await.cache.values().cloned().collect()
    }

    /// Instances with at least one token at the given position, descendants
    /// included.
    pub async fn find_by_state(&self, position: &str) -> Vec<ProcessInstance> {
        let mut found = Vec::new();
        for instance in self.instances().await {
            if instance.has_token_at(position).await {
                found.push(instance);
            }
        }
        found
    }

    pub async fn find_by_name(&self, name: &str, case_sensitive: bool) -> Vec<ProcessInstance> {
        self.instances()
            .await
            .into_iter()
            .filter(|i| {
                if case_sensitive {
                    i.process_name() == name
                } else {
                    i.process_name().eq_ignore_ascii_case(name)
                }
            })
            .collect()
    }

    /// AND over every key of the query; dot-separated keys descend into
    /// nested objects; equality is strict.
    pub async fn find_by_property(&self, query: &Map<String, Value>) -> Vec<ProcessInstance> {
        self.instances()
            .await
            .into_iter()
            .filter(|instance| {
                let props = instance.get_properties();
                query.iter().all(|(key, expected)| {
                    lookup_property_path(&props, key)
                        .map(|v| v == expected)
                        .unwrap_or(false)
                })
            })
            .collect()
    }

    pub async fn definition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .state
            .lock()
            .await
            .definitions
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub async fn has_definition(&self, name: &str) -> bool {
        self.inner.state.lock().await.definitions.contains_key(name)
    }
}

/// Dot-separated descent into a property map; `None` when any segment is
/// missing or a non-object is descended into.
pub fn lookup_property_path<'a>(props: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let mut segments = key.split('.');
    let mut current = props.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Drain task: registers queued definitions one by one, materializing
/// persisted instances for each, then opens the gate.
async fn drain(inner: Arc<ManagerInner>) {
    loop {
        let next = {
            let mut st = inner.state.lock().await;
            match st.queued_definitions.pop_front() {
                Some(item) => Some(item),
                None => {
                    st.initialising = false;
                    st.initialized = st.initialization_error.is_none();
                    None
                }
            }
        };
        let Some((definition, handlers)) = next else {
            break;
        };
        if let Err(error) = register_one(&inner, definition, handlers).await {
            let mut st = inner.state.lock().await;
            st.initialization_error = Some(error.to_string());
            st.initialising = false;
            drop(st);
            break;
        }
    }
    inner.init_notify.notify_waiters();
}

async fn register_one(
    inner: &Arc<ManagerInner>,
    definition: Arc<ProcessDefinition>,
    handlers: Arc<HandlerModule>,
) -> Result<(), ConfigError> {
    // definitions may arrive from an external parser, so the structural
    // invariants are re-checked before anything is instantiated on them
    let issues = bpmnflow_model::validation::validate(&definition);
    if !issues.is_empty() {
        return Err(ConfigError::InvalidDefinition(
            definition.name.clone(),
            issues.to_string(),
        ));
    }
    {
        let mut st = inner.state.lock().await;
        st.definitions
            .insert(definition.name.clone(), definition.clone());
        st.handlers.insert(definition.name.clone(), handlers.clone());
    }
    info!(definition = %definition.name, "definition registered");

    let Some(store) = inner.store.clone() else {
        return Ok(());
    };
    let docs = store
        .load_all(&definition.name)
        .await
        .map_err(|e| ConfigError::Store(e.to_string()))?;
    for doc in docs {
        let process_id = doc.process_id.clone();
        {
            let st = inner.state.lock().await;
            if st.cache.contains_key(&process_id) {
                return Err(ConfigError::DuplicatePersistedId(process_id));
            }
        }
        let instance = ProcessInstance::new(
            process_id.clone(),
            definition.clone(),
            handlers.clone(),
            Some(store.clone()),
            inner.hooks.clone(),
            Some(Arc::new(ManagerResolver {
                inner: Arc::downgrade(inner),
                cache: inner.definition_cache.clone(),
            })),
        );
        instance.set_persisted_data(doc).await?;
        inner.state.lock().await.cache.insert(process_id.clone(), instance);
        debug!(%process_id, definition = %definition.name, "instance rehydrated");
    }
    Ok(())
}

/// Call activities resolve through the manager's registry first;
/// `location` only reaches the path-keyed definition cache as a fallback.
struct ManagerResolver {
    inner: Weak<ManagerInner>,
    cache: Option<Arc<DefinitionCache>>,
}

#[async_trait]
impl CalledProcessResolver for ManagerResolver {
    async fn definition(
        &self,
        name: &str,
        location: Option<&str>,
    ) -> Result<Arc<ProcessDefinition>, String> {
        if let Some(inner) = self.inner.upgrade() {
            let st = inner.state.lock().await;
            if let Some(definition) = st.definitions.get(name) {
                return Ok(definition.clone());
            }
        }
        if let (Some(cache), Some(location)) = (&self.cache, location) {
            return cache
                .definition_named(location, name)
                .await
                .map_err(|e| e.to_string());
        }
        Err(format!("no definition named '{}'", name))
    }

    async fn handlers(&self, name: &str) -> Option<Arc<HandlerModule>> {
        let inner = self.inner.upgrade()?;
        let st = inner.state.lock().await;
        st.handlers.get(name).cloned()
    }
}
