pub mod config;

pub use config::{BpmnflowConfig, StoreBackend};
