use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::context::HandlerContext;
use super::names::canonical_handler_name;

pub type HandlerFuture = BoxFuture<'static, Result<Value, String>>;
pub type Handler = Arc<dyn Fn(HandlerContext, Value) -> HandlerFuture + Send + Sync>;
pub type DiagnosticHandler =
    Arc<dyn Fn(HandlerContext, EventDiagnostic) -> BoxFuture<'static, ()> + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(HandlerContext, String) -> BoxFuture<'static, ()> + Send + Sync>;
pub type IoDoneHandler =
    Arc<dyn Fn(HandlerContext, Option<String>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Why the engine fell back to `default_event_handler` instead of a named
/// handler.
#[derive(Debug, Clone)]
pub struct EventDiagnostic {
    pub event_type: String,
    pub flow_name: String,
    pub handler_name: String,
    pub reason: String,
}

/// User code for one process definition: canonicalized flow-object name to
/// async handler, plus the special lifecycle hooks. Call activities resolve
/// their handlers through nested sub-modules registered under the
/// activity's name.
#[derive(Default)]
pub struct HandlerModule {
    handlers: HashMap<String, Handler>,
    sub_modules: HashMap<String, Arc<HandlerModule>>,
    default_event_handler: Option<DiagnosticHandler>,
    default_error_handler: Option<ErrorHandler>,
    on_begin: Option<Handler>,
    on_end: Option<Handler>,
    done_loading: Option<IoDoneHandler>,
    done_saving: Option<IoDoneHandler>,
}

impl HandlerModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for flow object `name`. The returned future
    /// resolving plays the role of the `done(result)` callback.
    pub fn handler<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(HandlerContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.handlers.insert(
            canonical_handler_name(name),
            Arc::new(move |ctx, data| Box::pin(f(ctx, data))),
        );
        self
    }

    /// Register a synchronous exclusive-gateway predicate for the outgoing
    /// flow `flow_name` of `gateway_name`.
    pub fn predicate<F>(self, gateway_name: &str, flow_name: &str, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let key = format!("{}${}", gateway_name, flow_name);
        self.handler(&key, move |_ctx, data| {
            let truthy = f(&data);
            async move { Ok(Value::Bool(truthy)) }
        })
    }

    /// Register a fixed timeout (milliseconds) for the timer keyed by
    /// `name$getTimeout`.
    pub fn timeout_ms(self, name: &str, ms: i64) -> Self {
        let key = format!("{}$getTimeout", name);
        self.handler(&key, move |_ctx, _data| async move { Ok(json!(ms)) })
    }

    /// Nest the handler module of a called process under the call activity's
    /// name.
    pub fn sub_module(mut self, call_activity_name: &str, module: Arc<HandlerModule>) -> Self {
        self.sub_modules
            .insert(canonical_handler_name(call_activity_name), module);
        self
    }

    pub fn default_event_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(HandlerContext, EventDiagnostic) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.default_event_handler = Some(Arc::new(f));
        self
    }

    pub fn default_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(HandlerContext, String) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.default_error_handler = Some(Arc::new(f));
        self
    }

    pub fn on_begin<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HandlerContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.on_begin = Some(Arc::new(move |ctx, data| Box::pin(f(ctx, data))));
        self
    }

    pub fn on_end<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(HandlerContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.on_end = Some(Arc::new(move |ctx, data| Box::pin(f(ctx, data))));
        self
    }

    pub fn done_loading<F>(mut self, f: F) -> Self
    where
        F: Fn(HandlerContext, Option<String>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.done_loading = Some(Arc::new(f));
        self
    }

    pub fn done_saving<F>(mut self, f: F) -> Self
    where
        F: Fn(HandlerContext, Option<String>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.done_saving = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Arc<HandlerModule> {
        Arc::new(self)
    }

    // ---------------- lookup (canonical keys) ----------------

    pub(crate) fn get(&self, canonical_name: &str) -> Option<Handler> {
        self.handlers.get(canonical_name).cloned()
    }

    pub(crate) fn get_sub_module(&self, canonical_name: &str) -> Option<Arc<HandlerModule>> {
        self.sub_modules.get(canonical_name).cloned()
    }

    pub(crate) fn event_diagnostic(&self) -> Option<DiagnosticHandler> {
        self.default_event_handler.clone()
    }

    pub(crate) fn error_handler(&self) -> Option<ErrorHandler> {
        self.default_error_handler.clone()
    }

    pub(crate) fn begin_hook(&self) -> Option<Handler> {
        self.on_begin.clone()
    }

    pub(crate) fn end_hook(&self) -> Option<Handler> {
        self.on_end.clone()
    }

    pub(crate) fn loading_hook(&self) -> Option<IoDoneHandler> {
        self.done_loading.clone()
    }

    pub(crate) fn saving_hook(&self) -> Option<IoDoneHandler> {
        self.done_saving.clone()
    }
}

impl std::fmt::Debug for HandlerModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerModule")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("sub_modules", &self.sub_modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
