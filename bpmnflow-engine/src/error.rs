use thiserror::Error;

/// Runtime errors raised during event dispatch. Everything except
/// `BadTimeout` and `BadCalledProcess` is routed through the handler
/// module's `default_event_handler` and leaves the instance alive.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("process has already been started")]
    AlreadyStarted,

    #[error("no token at '{0}'")]
    NotExecuting(String),

    #[error("message flow has no executable target")]
    NoTarget,

    #[error("bad called process: {0}")]
    BadCalledProcess(String),

    #[error("timeout handler for '{0}' did not return a finite number of milliseconds")]
    BadTimeout(String),

    #[error("handler failed: {0}")]
    Handler(String),
}

/// Configuration defects. Fatal to the operation that hit them.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no handler module registered for definition '{0}'")]
    MissingHandler(String),

    #[error("duplicate participant name '{0}'")]
    DuplicateParticipant(String),

    #[error("duplicate process id '{0}' in persisted data")]
    DuplicatePersistedId(String),

    #[error("process id '{0}' already exists")]
    DuplicateProcessId(String),

    #[error("no process definition named '{0}'")]
    UnknownDefinition(String),

    #[error("expected exactly one registered definition, found {0}")]
    AmbiguousDefinition(usize),

    #[error("invalid definition '{0}': {1}")]
    InvalidDefinition(String, String),

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid persisted document: {0}")]
    BadPersistedDocument(String),
}
