//! `RemediationResult`: the single artifact returned to every caller and
//! persisted for audit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{render_error_chain, RemediationError};
use super::validation::ValidationResult;

/// `validation_details` key for the pre-execution battery.
pub const PRE_VALIDATION: &str = "pre_validation";
/// `validation_details` key for the blast-radius checks.
pub const BLAST_RADIUS: &str = "blast_radius";
/// `validation_details` key for the post-execution battery.
pub const POST_VALIDATION: &str = "post_validation";

/// Final state of one remediation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcome {
    Success,
    Failed,
    PartialSuccess,
    Rejected,
    TimedOut,
    RolledBack,
}

impl std::fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::PartialSuccess => write!(f, "partial_success"),
            Self::Rejected => write!(f, "rejected"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One chronological entry of `RemediationResult::execution_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: String,
    pub message: String,
}

/// Append-only log collector that mirrors every entry to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Vec<ExecutionLogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(stage = %stage, "{message}");
        self.push(LogLevel::Info, stage, message);
    }

    pub fn warn(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = %stage, "{message}");
        self.push(LogLevel::Warn, stage, message);
    }

    pub fn error(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(stage = %stage, "{message}");
        self.push(LogLevel::Error, stage, message);
    }

    /// Append entries recorded elsewhere (e.g. by a remediator) without re-emitting them.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ExecutionLogEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ExecutionLogEntry> {
        self.entries
    }

    fn push(&mut self, level: LogLevel, stage: &str, message: String) {
        self.entries.push(ExecutionLogEntry {
            timestamp: Utc::now(),
            level,
            stage: stage.to_string(),
            message,
        });
    }
}

/// Structured outcome of one remediation. Field names are a stable contract
/// read by the API, audit and notification layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub success: bool,
    pub outcome: RemediationOutcome,
    pub message: String,
    pub error_message: Option<String>,
    pub error_traceback: Option<String>,
    pub duration_seconds: f64,
    pub actions_performed: Vec<String>,
    pub metadata: Map<String, Value>,
    pub pre_validation_passed: bool,
    pub post_validation_passed: bool,
    pub rollback_required: bool,
    pub rollback_performed: bool,
    pub execution_logs: Vec<ExecutionLogEntry>,
    /// Keyed by [`PRE_VALIDATION`], [`BLAST_RADIUS`], [`POST_VALIDATION`].
    pub validation_details: BTreeMap<String, ValidationResult>,
}

impl RemediationResult {
    fn base(success: bool, outcome: RemediationOutcome, message: String) -> Self {
        Self {
            success,
            outcome,
            message,
            error_message: None,
            error_traceback: None,
            duration_seconds: 0.0,
            actions_performed: Vec::new(),
            metadata: Map::new(),
            pre_validation_passed: true,
            post_validation_passed: true,
            rollback_required: false,
            rollback_performed: false,
            execution_logs: Vec::new(),
            validation_details: BTreeMap::new(),
        }
    }

    pub fn success(
        message: impl Into<String>,
        actions_performed: Vec<String>,
        duration_seconds: f64,
    ) -> Self {
        let mut result = Self::base(true, RemediationOutcome::Success, message.into());
        result.actions_performed = actions_performed;
        result.duration_seconds = duration_seconds;
        result
    }

    pub fn failure(
        message: impl Into<String>,
        error_message: impl Into<String>,
        duration_seconds: f64,
        rollback_required: bool,
    ) -> Self {
        let mut result = Self::base(false, RemediationOutcome::Failed, message.into());
        result.error_message = Some(error_message.into());
        result.duration_seconds = duration_seconds;
        result.rollback_required = rollback_required;
        result
    }

    /// Failure built from an error; the traceback is the error's source chain.
    pub fn from_error(
        message: impl Into<String>,
        err: &RemediationError,
        duration_seconds: f64,
        rollback_required: bool,
    ) -> Self {
        Self::failure(message, err.to_string(), duration_seconds, rollback_required)
            .with_traceback(render_error_chain(err))
    }

    /// A validation rejection: nothing was executed.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut result = Self::base(false, RemediationOutcome::Rejected, message.clone());
        result.error_message = Some(message);
        result
    }

    pub fn with_outcome(mut self, outcome: RemediationOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.error_traceback = Some(traceback.into());
        self
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions_performed = actions;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_logs(mut self, log: ExecutionLog) -> Self {
        self.execution_logs = log.into_entries();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validation::CheckResult;

    #[test]
    fn test_success_shape() {
        let result = RemediationResult::success("done", vec!["a".into()], 1.5);
        assert!(result.success);
        assert_eq!(result.outcome, RemediationOutcome::Success);
        assert!(result.error_message.is_none());
        assert!(!result.rollback_required);
    }

    #[test]
    fn test_failure_shape_carries_rollback_flag() {
        let result = RemediationResult::failure("boom", "api down", 0.2, true);
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("api down"));
        assert!(result.rollback_required);
        assert!(!result.rollback_performed);
    }

    #[test]
    fn test_from_error_sets_traceback() {
        let err = RemediationError::Validation("run_id must be numeric".into());
        let result = RemediationResult::from_error("bad params", &err, 0.0, false);
        assert!(result.error_traceback.unwrap().contains("run_id"));
    }

    #[test]
    fn test_validation_details_keys_are_stable_in_json() {
        let mut result = RemediationResult::rejected("blocked");
        result.validation_details.insert(
            BLAST_RADIUS.to_string(),
            ValidationResult::from_checks(BLAST_RADIUS, vec![CheckResult::pass("x", "ok")]),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["validation_details"]["blast_radius"]["passed"]
            .as_bool()
            .unwrap());
        assert_eq!(json["outcome"], "rejected");
    }

    #[test]
    fn test_execution_log_is_chronological() {
        let mut log = ExecutionLog::new();
        log.info("pre_validation", "first");
        log.warn("execution", "second");
        log.error("rollback", "third");
        let entries = log.into_entries();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].timestamp <= entries[2].timestamp);
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert_eq!(entries[2].stage, "rollback");
    }
}
