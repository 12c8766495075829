use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::registry::RegistryError;
use crate::core::switching::matrix::SwitchingMatrixError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration failed: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Switching function lookup failed: {source}")]
    Switching {
        #[from]
        source: SwitchingMatrixError,
    },

    #[error("Node registry rejected an operation: {source}")]
    Registry {
        #[from]
        source: RegistryError,
    },

    #[error("Node group '{0}' named in the configuration is not present in the registry")]
    UnknownGroup(String),

    #[error("Registry defines {registry} node groups but the configuration names {config}")]
    GroupCountMismatch { registry: usize, config: usize },

    #[error(
        "Node group '{config}' is listed at position {position} but the registry has '{registry}' there"
    )]
    GroupOrderMismatch {
        position: usize,
        config: String,
        registry: String,
    },

    #[error("Task index {index} is out of range ({n_tasks} tasks)")]
    TaskOutOfRange { index: usize, n_tasks: usize },

    #[error("Task {index} was already committed this cycle")]
    AlreadyCommitted { index: usize },

    #[error("No weight committed for task {index} this cycle")]
    WeightNotAvailable { index: usize },

    #[error("Derivatives were not computed for task {index} this cycle")]
    DerivativesNotAvailable { index: usize },
}
