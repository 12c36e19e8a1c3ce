//! Engine-level error taxonomy.

use crate::domain::plan::ActionType;
use crate::workflow::error::AdapterError;

/// Errors produced while resolving, executing or auditing a remediation.
///
/// None of these cross the orchestrator boundary: `RemediationService`
/// folds every variant into a failed `RemediationResult`.
#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error("parameter validation failed: {0}")]
    Validation(String),

    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("no remediator registered for action type {0}")]
    NoRemediator(ActionType),

    #[error("remediator for {action_type} cannot handle incident {incident_id}")]
    Unsupported {
        action_type: ActionType,
        incident_id: uuid::Uuid,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RemediationError>;

/// Render an error and its `source()` chain, one cause per line.
///
/// Used as the `error_traceback` of failed results.
pub fn render_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
