use std::{env, fmt};

use anyhow::{anyhow, Result};

/// Which persistence backend the runtime uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl StoreBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(anyhow!(
                "Unsupported store backend: {} (use 'memory' or 'sqlite')",
                other
            )),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Runtime configuration for the gateway binary, read from the environment.
#[derive(Debug, Clone)]
pub struct BpmnflowConfig {
    pub bind: String,
    pub store: StoreBackend,
    pub db_path: String,
}

impl BpmnflowConfig {
    pub fn from_env() -> Result<Self> {
        let bind = env::var("BPMNFLOW_BIND").unwrap_or_else(|_| "127.0.0.1:9009".into());
        let store = StoreBackend::from_str(
            &env::var("BPMNFLOW_STORE").unwrap_or_else(|_| "memory".into()),
        )?;
        let db_path = env::var("BPMNFLOW_DB_PATH").unwrap_or_else(|_| "data/bpmnflow.db".into());
        Ok(Self {
            bind,
            store,
            db_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing() {
        assert_eq!(StoreBackend::from_str("memory").unwrap(), StoreBackend::Memory);
        assert_eq!(StoreBackend::from_str(" SQLITE ").unwrap(), StoreBackend::Sqlite);
        assert!(StoreBackend::from_str("postgres").is_err());
    }
}
