use impactlab_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid slice key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Unknown dimension '{dimension}' for variable {variable} (declared: {declared})")]
    UnknownDimension {
        variable: String,
        dimension: String,
        declared: String,
    },

    #[error("Step '{step}' iterates but has no index-bearing arguments")]
    NoIndexDimensions { step: String },

    #[error("Step '{step}' is missing a binding for parameter '{parameter}'")]
    MissingBinding { step: String, parameter: String },

    #[error("Argument '{parameter}' of step '{step}' is a {found}, expected {expected}")]
    ArgumentKind {
        step: String,
        parameter: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Variable not found: {0}")]
    UnknownVariable(String),

    #[error("Superindex not found: {0}")]
    UnknownSuperIndex(String),

    #[error("Invalid superindex '{name}': {reason}")]
    InvalidSuperIndex { name: String, reason: String },

    #[error("Invalid composition for step '{step}': {reason}")]
    InvalidComposition { step: String, reason: String },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Step '{step}': {failed} of {total} iterations failed")]
    IterationsFailed {
        step: String,
        failed: usize,
        total: usize,
    },

    #[error("Pipeline dependency cycle detected")]
    DagCycleDetected,

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl OrchestratorError {
    pub fn invalid_key(key: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_superindex(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSuperIndex {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_composition(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidComposition {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub fn step_failed(step: impl Into<String>, source: anyhow::Error) -> Self {
        Self::StepFailed {
            step: step.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_missing_binding_message() {
        let err = OrchestratorError::MissingBinding {
            step: "mortality".to_string(),
            parameter: "tas".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mortality"));
        assert!(msg.contains("'tas'"));
    }

    #[test]
    fn test_step_failed_keeps_source() {
        let err = OrchestratorError::step_failed("tas2_ir", anyhow::anyhow!("bad payload"));
        assert!(err.to_string().contains("bad payload"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_storage_conversion() {
        let err: OrchestratorError = StorageError::invalid_version("x").into();
        assert!(matches!(err, OrchestratorError::Storage(_)));
    }
}
