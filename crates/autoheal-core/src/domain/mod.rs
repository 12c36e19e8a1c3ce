//! Domain types shared by every stage of the remediation pipeline.

pub mod error;
pub mod incident;
pub mod plan;
pub mod result;
pub mod validation;

pub use error::{render_error_chain, RemediationError, Result};
pub use incident::{AnalysisResult, Incident, IncidentSource, Severity};
pub use plan::{ActionType, RemediationPlan, RiskLevel};
pub use result::{
    ExecutionLog, ExecutionLogEntry, LogLevel, RemediationOutcome, RemediationResult,
    BLAST_RADIUS, POST_VALIDATION, PRE_VALIDATION,
};
pub use validation::{CheckResult, CheckSeverity, ValidationResult};
