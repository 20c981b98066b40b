use sim_bridge::{BridgeError, ConfigError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to read engine parameters from {path}: {source}")]
    EngineFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid engine parameters in {path}: {source}")]
    EngineJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to open audit log {path}: {source}")]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tick rate must be finite and positive, got {0}")]
    InvalidTickRate(f64),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
