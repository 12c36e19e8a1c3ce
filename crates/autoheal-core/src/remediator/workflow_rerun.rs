//! Re-runs a failed CI workflow and optionally waits for the new attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{info, instrument};

use super::{Remediator, SupportsRollback};
use crate::config::EngineConfig;
use crate::domain::{
    ActionType, Incident, IncidentSource, RemediationError, RemediationOutcome, RemediationPlan,
    RemediationResult, Result,
};
use crate::workflow::{AdapterError, CompletionReport, RunRef, WorkflowRunAdapter};

const OWNER_KEYS: &[&str] = &["owner", "repo_owner", "repository_owner", "organization"];
const REPO_KEYS: &[&str] = &["repo", "repository", "repository_name", "repo_name"];
const RUN_ID_KEYS: &[&str] = &["run_id", "workflow_run_id", "run"];

const WAIT_KEYS: &[&str] = &["wait_for_completion", "wait"];
const TIMEOUT_KEYS: &[&str] = &["timeout_seconds", "timeout"];
const POLL_KEYS: &[&str] = &["poll_interval_seconds", "poll_interval"];
const FAILED_ONLY_KEYS: &[&str] = &["rerun_failed_only", "failed_jobs_only"];

/// Longest wait a rerun may request (one week).
pub const MAX_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

const PAYLOAD_OWNER: &[&str] = &["/repository/owner/login", "/workflow_run/repository/owner/login"];
const PAYLOAD_REPO: &[&str] = &["/repository/name", "/workflow_run/repository/name"];
const PAYLOAD_FULL_NAME: &[&str] = &["/repository/full_name", "/workflow_run/repository/full_name"];
const PAYLOAD_RUN_ID: &[&str] = &["/workflow_run/id", "/run_id"];

/// Fallbacks for the optional rerun parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerunDefaults {
    pub wait_for_completion: bool,
    pub timeout_seconds: u64,
    pub poll_interval_seconds: u64,
    pub rerun_failed_only: bool,
}

impl Default for RerunDefaults {
    fn default() -> Self {
        Self {
            wait_for_completion: true,
            timeout_seconds: 600,
            poll_interval_seconds: 10,
            rerun_failed_only: true,
        }
    }
}

/// Fully resolved inputs of one rerun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerunParameters {
    pub run: RunRef,
    pub wait_for_completion: bool,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub rerun_failed_only: bool,
}

fn non_empty(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(other),
    }
}

/// First usable value under `keys`, checking the plan parameters before the
/// incident context.
fn lookup<'a>(maps: &[&'a Map<String, Value>], keys: &[&str]) -> Option<&'a Value> {
    maps.iter()
        .find_map(|map| keys.iter().find_map(|k| map.get(*k).and_then(non_empty)))
}

/// Every usable value under `keys`, plan parameters first.
fn lookup_all<'a>(maps: &[&'a Map<String, Value>], keys: &[&str]) -> Vec<&'a Value> {
    maps.iter()
        .flat_map(|map| keys.iter().filter_map(move |k| map.get(*k).and_then(non_empty)))
        .collect()
}

fn payload_lookup<'a>(payload: Option<&'a Value>, pointers: &[&str]) -> Option<&'a Value> {
    let payload = payload?;
    pointers
        .iter()
        .find_map(|p| payload.pointer(p).and_then(non_empty))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Split `owner/name` into its parts.
fn split_full_name(full: &str) -> Option<(String, String)> {
    let (owner, name) = full.split_once('/')?;
    let (owner, name) = (owner.trim(), name.trim());
    (!owner.is_empty() && !name.is_empty()).then(|| (owner.to_string(), name.to_string()))
}

fn parse_u64(field: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| RemediationError::Validation(format!("{field} must be a non-negative integer, got {n}"))),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| {
            RemediationError::Validation(format!("{field} must be a non-negative integer, got '{s}'"))
        }),
        other => Err(RemediationError::Validation(format!(
            "{field} must be a non-negative integer, got {other}"
        ))),
    }
}

fn parse_bool(field: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(RemediationError::Validation(format!(
                "{field} must be a boolean, got '{s}'"
            ))),
        },
        other => Err(RemediationError::Validation(format!(
            "{field} must be a boolean, got {other}"
        ))),
    }
}

impl RerunParameters {
    /// Resolve parameters from the plan, then the incident context, then the
    /// provider payload. Every missing required field is reported at once.
    pub fn resolve(incident: &Incident, plan: &RemediationPlan, defaults: &RerunDefaults) -> Result<Self> {
        let maps = [&plan.parameters, &incident.context];
        let payload = incident.raw_payload.as_ref();

        let declared_repos: Vec<String> = lookup_all(&maps, REPO_KEYS).into_iter().filter_map(as_text).collect();
        let repo = declared_repos
            .first()
            .map(|declared| split_full_name(declared).map_or_else(|| declared.clone(), |(_, name)| name));
        let owner_from_repo = declared_repos
            .iter()
            .find_map(|declared| split_full_name(declared))
            .map(|(owner, _)| owner);
        let full_name = payload_lookup(payload, PAYLOAD_FULL_NAME)
            .and_then(Value::as_str)
            .and_then(split_full_name);

        let owner = lookup(&maps, OWNER_KEYS)
            .and_then(as_text)
            .or(owner_from_repo)
            .or_else(|| payload_lookup(payload, PAYLOAD_OWNER).and_then(as_text))
            .or_else(|| full_name.as_ref().map(|(owner, _)| owner.clone()));
        let repo = repo
            .or_else(|| payload_lookup(payload, PAYLOAD_REPO).and_then(as_text))
            .or_else(|| full_name.as_ref().map(|(_, name)| name.clone()));
        let run_id = lookup(&maps, RUN_ID_KEYS).or_else(|| payload_lookup(payload, PAYLOAD_RUN_ID));

        let missing: Vec<String> = [
            ("owner", owner.is_none()),
            ("repo", repo.is_none()),
            ("run_id", run_id.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name.to_string())
        .collect();

        let (Some(owner), Some(repo), Some(run_id)) = (owner, repo, run_id) else {
            return Err(RemediationError::MissingParameters(missing));
        };
        let run_id = parse_u64("run_id", run_id)?;

        let wait_for_completion = match lookup(&maps, WAIT_KEYS) {
            Some(v) => parse_bool("wait_for_completion", v)?,
            None => defaults.wait_for_completion,
        };
        let rerun_failed_only = match lookup(&maps, FAILED_ONLY_KEYS) {
            Some(v) => parse_bool("rerun_failed_only", v)?,
            None => defaults.rerun_failed_only,
        };
        let timeout_seconds = match lookup(&maps, TIMEOUT_KEYS) {
            Some(v) => parse_u64("timeout_seconds", v)?,
            None => defaults.timeout_seconds,
        };
        if timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(RemediationError::Validation(format!(
                "timeout_seconds must be at most {MAX_TIMEOUT_SECONDS}, got {timeout_seconds}"
            )));
        }
        let poll_interval_seconds = match lookup(&maps, POLL_KEYS) {
            Some(v) => parse_u64("poll_interval_seconds", v)?,
            None => defaults.poll_interval_seconds,
        };

        Ok(Self {
            run: RunRef::new(owner, repo, run_id),
            wait_for_completion,
            timeout: Duration::from_secs(timeout_seconds),
            poll_interval: Duration::from_secs(poll_interval_seconds),
            rerun_failed_only,
        })
    }
}

enum Progress {
    Triggered,
    Completed(CompletionReport),
}

/// Remediator for [`ActionType::RerunWorkflow`].
#[derive(Clone)]
pub struct WorkflowRerunRemediator {
    adapter: WorkflowRunAdapter,
    defaults: RerunDefaults,
}

impl WorkflowRerunRemediator {
    pub fn new(adapter: WorkflowRunAdapter) -> Self {
        Self {
            adapter,
            defaults: RerunDefaults::default(),
        }
    }

    /// Remediator using the `[rerun]` defaults of an engine config.
    pub fn from_config(adapter: WorkflowRunAdapter, config: &EngineConfig) -> Self {
        Self::new(adapter).with_defaults(config.rerun.clone())
    }

    pub fn with_defaults(mut self, defaults: RerunDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &RerunDefaults {
        &self.defaults
    }

    /// Resolve this incident's rerun inputs against the configured defaults.
    pub fn parameters(&self, incident: &Incident, plan: &RemediationPlan) -> Result<RerunParameters> {
        RerunParameters::resolve(incident, plan, &self.defaults)
    }

    async fn drive(&self, params: &RerunParameters, actions: &mut Vec<String>) -> std::result::Result<Progress, AdapterError> {
        let run = &params.run;
        let current = self.adapter.get_run(run).await?;
        info!(
            run = %run,
            workflow = current.display_name(),
            status = current.status.as_str(),
            conclusion = current.conclusion.map_or("none", |c| c.as_str()),
            "current workflow run state"
        );

        self.adapter.rerun(run, params.rerun_failed_only).await?;
        actions.push(
            if params.rerun_failed_only {
                "Reran only failed jobs"
            } else {
                "Reran entire workflow"
            }
            .to_string(),
        );

        if !params.wait_for_completion {
            actions.push("triggered rerun".to_string());
            return Ok(Progress::Triggered);
        }

        let report = self
            .adapter
            .wait_for_completion(run, params.timeout, params.poll_interval)
            .await?;
        Ok(Progress::Completed(report))
    }

    fn adapter_failure(
        params: &RerunParameters,
        actions: Vec<String>,
        err: AdapterError,
        duration: f64,
    ) -> RemediationResult {
        let run = &params.run;
        let (message, outcome, details) = match &err {
            AdapterError::Timeout { elapsed, timeout } => (
                format!(
                    "Workflow run {run} did not complete within the {}s timeout",
                    timeout.as_secs()
                ),
                RemediationOutcome::TimedOut,
                vec![
                    ("elapsed_seconds", json!(elapsed.as_secs_f64())),
                    ("timeout_seconds", json!(timeout.as_secs())),
                ],
            ),
            AdapterError::Api(api) => (
                format!("CI provider request failed while rerunning {run}"),
                RemediationOutcome::Failed,
                vec![
                    ("api_error_kind", json!(api.kind().as_str())),
                    ("http_status", json!(api.status())),
                ],
            ),
        };

        let err = RemediationError::from(err);
        let mut result = RemediationResult::from_error(message, &err, duration, false)
            .with_outcome(outcome)
            .with_actions(actions);
        for (key, value) in details {
            result.metadata.insert(key.to_string(), value);
        }
        result
    }
}

#[async_trait]
impl Remediator for WorkflowRerunRemediator {
    fn action_type(&self) -> ActionType {
        ActionType::RerunWorkflow
    }

    fn can_handle(&self, incident: &Incident, plan: &RemediationPlan) -> bool {
        plan.action_type == ActionType::RerunWorkflow
            && matches!(incident.source, IncidentSource::Github | IncidentSource::Manual)
    }

    fn validate_parameters(&self, incident: &Incident, plan: &RemediationPlan) -> Result<()> {
        self.parameters(incident, plan).map(|_| ())
    }

    #[instrument(skip_all, fields(incident_id = %incident.id))]
    async fn execute(&self, incident: &Incident, plan: &RemediationPlan) -> RemediationResult {
        let started = Instant::now();
        let params = match self.parameters(incident, plan) {
            Ok(params) => params,
            Err(err) => {
                return RemediationResult::from_error(
                    "Cannot rerun workflow: invalid parameters",
                    &err,
                    started.elapsed().as_secs_f64(),
                    false,
                );
            }
        };

        let mut actions = Vec::new();
        let progress = self.drive(&params, &mut actions).await;
        let duration = started.elapsed().as_secs_f64();
        let run = &params.run;

        match progress {
            Ok(Progress::Triggered) => RemediationResult::success(
                format!("Triggered rerun of {run}; completion was not awaited"),
                actions,
                duration,
            )
            .with_metadata("run", run.to_string())
            .with_metadata("completion_awaited", false),
            Ok(Progress::Completed(report)) if report.success => {
                actions.push("workflow completed successfully".to_string());
                RemediationResult::success(
                    format!("Workflow rerun of {run} completed successfully"),
                    actions,
                    duration,
                )
                .with_metadata("run", run.to_string())
                .with_metadata("completion_awaited", true)
                .with_metadata("polls", report.polls)
                .with_metadata("html_url", report.run.html_url.clone())
            }
            Ok(Progress::Completed(report)) => {
                let reason = report
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| format!("workflow '{}' did not succeed", report.run.display_name()));
                let failed_jobs = serde_json::to_value(&report.failed_jobs).unwrap_or(Value::Null);
                RemediationResult::failure(
                    format!("Workflow rerun of {run} failed"),
                    reason.clone(),
                    duration,
                    false,
                )
                .with_actions(actions)
                .with_metadata("run", run.to_string())
                .with_metadata("completion_awaited", true)
                .with_metadata("polls", report.polls)
                .with_metadata("conclusion", report.conclusion.map(|c| c.as_str()))
                .with_metadata("failure_reason", reason)
                .with_metadata("failed_jobs", failed_jobs)
            }
            Err(err) => Self::adapter_failure(&params, actions, err, duration)
                .with_metadata("run", run.to_string()),
        }
    }

    fn rollback_support(&self) -> Option<&dyn SupportsRollback> {
        Some(self)
    }
}

/// Rolling back a rerun means stopping it if it is still running.
#[async_trait]
impl SupportsRollback for WorkflowRerunRemediator {
    async fn rollback(&self, incident: &Incident, plan: &RemediationPlan) -> Result<String> {
        let params = self.parameters(incident, plan)?;
        let cancelled = self.adapter.cancel(&params.run).await?;
        Ok(if cancelled {
            format!("cancelled workflow run {}", params.run)
        } else {
            format!("workflow run {} already completed; nothing to cancel", params.run)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IncidentSource;

    fn resolve(incident: &Incident, plan: &RemediationPlan) -> Result<RerunParameters> {
        RerunParameters::resolve(incident, plan, &RerunDefaults::default())
    }

    fn plan() -> RemediationPlan {
        RemediationPlan::new(ActionType::RerunWorkflow, "flaky")
    }

    #[test]
    fn test_resolve_from_context() {
        let incident = Incident::new(IncidentSource::Github, "build_failure")
            .with_context("owner", "o")
            .with_context("repo", "r")
            .with_context("run_id", 123);
        let params = resolve(&incident, &plan()).unwrap();
        assert_eq!(params.run, RunRef::new("o", "r", 123));
        assert!(params.wait_for_completion);
        assert!(params.rerun_failed_only);
        assert_eq!(params.timeout, Duration::from_secs(600));
        assert_eq!(params.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_plan_parameters_win_over_context() {
        let incident = Incident::new(IncidentSource::Github, "x")
            .with_context("owner", "ctx-owner")
            .with_context("repo", "ctx-repo")
            .with_context("run_id", 1);
        let plan = plan()
            .with_parameter("owner", "plan-owner")
            .with_parameter("run_id", "42")
            .with_parameter("timeout", 30)
            .with_parameter("rerun_failed_only", "false");
        let params = resolve(&incident, &plan).unwrap();
        assert_eq!(params.run, RunRef::new("plan-owner", "ctx-repo", 42));
        assert_eq!(params.timeout, Duration::from_secs(30));
        assert!(!params.rerun_failed_only);
    }

    #[test]
    fn test_repository_alias_is_split() {
        let incident = Incident::new(IncidentSource::Github, "x")
            .with_context("repository", "acme/widgets")
            .with_context("workflow_run_id", 7);
        let params = resolve(&incident, &plan()).unwrap();
        assert_eq!(params.run, RunRef::new("acme", "widgets", 7));
    }

    #[test]
    fn test_owner_taken_from_context_repository_when_plan_sets_repo() {
        let incident = Incident::new(IncidentSource::Github, "x")
            .with_context("repository", "acme/widgets")
            .with_context("run_id", 1);
        let plan = plan().with_parameter("repo", "widgets");
        let params = resolve(&incident, &plan).unwrap();
        assert_eq!(params.run, RunRef::new("acme", "widgets", 1));
    }

    #[test]
    fn test_plan_repo_name_wins_over_context_full_name() {
        let incident = Incident::new(IncidentSource::Github, "x")
            .with_context("repository", "acme/widgets")
            .with_context("run_id", 1);
        let plan = plan().with_parameter("repo", "gadgets");
        let params = resolve(&incident, &plan).unwrap();
        assert_eq!(params.run, RunRef::new("acme", "gadgets", 1));
    }

    #[test]
    fn test_timeout_above_limit_is_rejected() {
        let incident = Incident::new(IncidentSource::Github, "x")
            .with_context("owner", "o")
            .with_context("repo", "r")
            .with_context("run_id", 1);
        let err = resolve(&incident, &plan().with_parameter("timeout_seconds", MAX_TIMEOUT_SECONDS + 1)).unwrap_err();
        assert!(matches!(err, RemediationError::Validation(_)));
        assert!(resolve(&incident, &plan().with_parameter("timeout_seconds", MAX_TIMEOUT_SECONDS)).is_ok());
    }

    #[test]
    fn test_resolve_from_webhook_payload() {
        let incident = Incident::new(IncidentSource::Github, "x").with_raw_payload(json!({
            "workflow_run": { "id": 99 },
            "repository": { "name": "widgets", "full_name": "acme/widgets", "owner": { "login": "acme" } }
        }));
        let params = resolve(&incident, &plan()).unwrap();
        assert_eq!(params.run, RunRef::new("acme", "widgets", 99));
    }

    #[test]
    fn test_full_name_fallback() {
        let incident = Incident::new(IncidentSource::Github, "x").with_raw_payload(json!({
            "run_id": "5",
            "repository": { "full_name": "acme/widgets" }
        }));
        let params = resolve(&incident, &plan()).unwrap();
        assert_eq!(params.run, RunRef::new("acme", "widgets", 5));
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let incident = Incident::new(IncidentSource::Github, "x").with_context("repo", "r");
        let err = resolve(&incident, &plan()).unwrap_err();
        match err {
            RemediationError::MissingParameters(missing) => {
                assert_eq!(missing, vec!["owner".to_string(), "run_id".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_run_id_is_rejected() {
        let incident = Incident::new(IncidentSource::Github, "x")
            .with_context("owner", "o")
            .with_context("repo", "r")
            .with_context("run_id", "latest");
        let err = resolve(&incident, &plan()).unwrap_err();
        assert!(matches!(err, RemediationError::Validation(_)));
        assert!(err.to_string().contains("run_id"));
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let incident = Incident::new(IncidentSource::Github, "x")
            .with_context("owner", "  ")
            .with_context("repo_owner", "o")
            .with_context("repo", "r")
            .with_context("run_id", 3);
        let params = resolve(&incident, &plan()).unwrap();
        assert_eq!(params.run.owner, "o");
    }
}
