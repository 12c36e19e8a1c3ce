//! autoheal core library
//!
//! Safety-gated automated remediation of CI/CD incidents: guard rules,
//! blast-radius limiting, pre/post validation, pluggable remediators and the
//! orchestrator that ties them together.

pub mod audit;
pub mod blast_radius;
pub mod clock;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod remediator;
pub mod rules;
pub mod service;
pub mod telemetry;
pub mod validators;
pub mod workflow;

pub use audit::{read_result_artifact, write_result_artifact, RemediationArtifact};

pub use blast_radius::{
    Admission, BlastRadiusConfig, BlastRadiusLimiter, ExecutionPermit, TargetField, TargetKey,
    TargetKeyPolicy, TargetUsage, MAX_WINDOW_SECONDS,
};

pub use clock::{Clock, ManualClock, SystemClock};

pub use config::EngineConfig;

pub use domain::{
    ActionType, AnalysisResult, CheckResult, CheckSeverity, ExecutionLogEntry, Incident, IncidentSource,
    LogLevel, RemediationError, RemediationOutcome, RemediationPlan, RemediationResult, Result, RiskLevel,
    Severity, ValidationResult,
};

pub use remediator::{
    RemediatorRegistry, RerunDefaults, RerunParameters, Remediator, SupportsRollback, WorkflowRerunRemediator,
    MAX_TIMEOUT_SECONDS,
};

pub use rules::{BlacklistConfig, BlacklistRule, Rule, RuleSet, RuleVerdict};

pub use service::{ExecutionOptions, PlanValidation, RemediationService};

pub use validators::{CheckContext, ValidationCheck, ValidationConfig, ValidatorChain};

pub use workflow::{
    AdapterError, ApiError, ApiErrorKind, CompletionReport, Conclusion, RunRef, RunStatus, WorkflowApi,
    WorkflowJob, WorkflowRun, WorkflowRunAdapter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
