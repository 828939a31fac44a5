//! Error types for the pipeline engine

use crate::stage::StageId;
use crate::unit::UnitId;
use thiserror::Error;

/// Invariant violated while assembling a registry, pipeline or executor
///
/// Always fatal: construction is aborted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("stage '{0}' is registered twice")]
    DuplicateStage(StageId),

    #[error("unknown stage '{name}'")]
    UnknownStage { name: String },

    #[error("stage '{stage}' requires '{required}', which is not an analysis")]
    NotAnAnalysis { stage: StageId, required: StageId },

    #[error("stage '{stage}' requires '{required}', which runs on a different unit granularity")]
    GranularityMismatch { stage: StageId, required: StageId },

    #[error("analysis '{0}' declares an invalidation footprint")]
    AnalysisWithFootprint(StageId),

    #[error("analysis dependency cycle through '{0}'")]
    AnalysisCycle(StageId),

    #[error("stage '{stage}' needs '{prerequisite}' earlier in the pipeline")]
    MissingPrerequisite { stage: StageId, prerequisite: StageId },

    #[error("stage '{stage}' must run after '{after}'")]
    OrderViolation { stage: StageId, after: StageId },

    #[error("stage '{0}' has no body bound")]
    Unbound(StageId),

    #[error("stage '{stage}' is declared as {declared} but bound to a {bound} body")]
    BodyMismatch {
        stage: StageId,
        declared: String,
        bound: String,
    },
}

/// Failure reported by a stage body
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StageError {
    /// Create a failure from a message
    pub fn msg(message: impl Into<String>) -> Self {
        StageError::Failed(message.into())
    }
}

/// Failure while running a pipeline on one unit
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("stage '{stage}' failed on {unit}: {source}")]
    StageFailed {
        stage: StageId,
        unit: UnitId,
        #[source]
        source: StageError,
    },

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("pipeline already ran on this executor")]
    AlreadyRan,
}

impl ExecutionError {
    /// Get the stage a failure is attributed to, if any
    pub fn stage(&self) -> Option<StageId> {
        match self {
            ExecutionError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::OrderViolation {
            stage: StageId::new("slsr"),
            after: StageId::new("separate-const-offset-from-gep"),
        };
        assert_eq!(
            err.to_string(),
            "stage 'slsr' must run after 'separate-const-offset-from-gep'"
        );
    }

    #[test]
    fn test_execution_error_attribution() {
        let err = ExecutionError::StageFailed {
            stage: StageId::new("amdgpu-isel"),
            unit: UnitId(3),
            source: StageError::msg("cannot select"),
        };
        assert_eq!(err.stage(), Some(StageId::new("amdgpu-isel")));
        assert_eq!(err.to_string(), "stage 'amdgpu-isel' failed on unit#3: cannot select");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(ExecutionError::AlreadyRan.stage(), None);
    }
}
