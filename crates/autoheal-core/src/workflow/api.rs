//! The CI provider surface the adapter drives, expressed as a trait so the
//! HTTP client and test fakes are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiResult;

/// Lifecycle status of a workflow run or job.
///
/// Everything except `Completed` is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    Waiting,
    Requested,
    Pending,
    Completed,
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Waiting => "waiting",
            Self::Requested => "requested",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "waiting" => Self::Waiting,
            "requested" => Self::Requested,
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            _ => Self::Unknown,
        }
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal conclusion of a completed run or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    Neutral,
    StartupFailure,
    Stale,
    Unknown,
}

impl Conclusion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed_out",
            Self::ActionRequired => "action_required",
            Self::Neutral => "neutral",
            Self::StartupFailure => "startup_failure",
            Self::Stale => "stale",
            Self::Unknown => "unknown",
        }
    }

    /// Conclusions that mark a job as failed in failure reports.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failure
                | Self::Cancelled
                | Self::TimedOut
                | Self::ActionRequired
                | Self::StartupFailure
        )
    }
}

impl From<String> for Conclusion {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "cancelled" => Self::Cancelled,
            "skipped" => Self::Skipped,
            "timed_out" => Self::TimedOut,
            "action_required" => Self::ActionRequired,
            "neutral" => Self::Neutral,
            "startup_failure" => Self::StartupFailure,
            "stale" => Self::Stale,
            _ => Self::Unknown,
        }
    }
}

impl From<Conclusion> for String {
    fn from(conclusion: Conclusion) -> Self {
        conclusion.as_str().to_string()
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunRef {
    pub owner: String,
    pub repo: String,
    pub run_id: u64,
}

impl RunRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, run_id: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            run_id,
        }
    }
}

impl std::fmt::Display for RunRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.run_id)
    }
}

/// Snapshot of a workflow run as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub run_number: Option<u64>,
    #[serde(default)]
    pub run_attempt: Option<u32>,
}

impl WorkflowRun {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }
}

/// One job of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl WorkflowJob {
    pub fn failed(&self) -> bool {
        self.conclusion.is_some_and(Conclusion::is_failure)
    }
}

/// CI provider operations consumed by [`super::WorkflowRunAdapter`].
///
/// Implementations classify transport failures into [`super::ApiError`];
/// transient-error retries, if any, belong to the implementation.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn get_run(&self, run: &RunRef) -> ApiResult<WorkflowRun>;

    /// Re-run every job of the run.
    async fn rerun(&self, run: &RunRef) -> ApiResult<()>;

    /// Re-run only the failed jobs (and their dependents).
    async fn rerun_failed_jobs(&self, run: &RunRef) -> ApiResult<()>;

    async fn list_jobs(&self, run: &RunRef) -> ApiResult<Vec<WorkflowJob>>;

    async fn cancel_run(&self, run: &RunRef) -> ApiResult<()>;

    async fn download_job_logs(&self, run: &RunRef, job_id: u64) -> ApiResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_deserializes_github_shape() {
        let run: WorkflowRun = serde_json::from_value(json!({
            "id": 123,
            "name": "CI",
            "status": "completed",
            "conclusion": "startup_failure",
            "html_url": "https://github.com/o/r/actions/runs/123",
            "run_number": 7,
            "event": "push"
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.conclusion, Some(Conclusion::StartupFailure));
        assert_eq!(run.run_number, Some(7));
    }

    #[test]
    fn test_unknown_status_and_null_conclusion() {
        let run: WorkflowRun = serde_json::from_value(json!({
            "id": 1,
            "status": "brand_new_status",
            "conclusion": null
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_terminal());
        assert_eq!(run.conclusion, None);
        assert_eq!(run.display_name(), "workflow");
    }

    #[test]
    fn test_failure_conclusions() {
        assert!(Conclusion::Failure.is_failure());
        assert!(Conclusion::TimedOut.is_failure());
        assert!(!Conclusion::Success.is_failure());
        assert!(!Conclusion::Skipped.is_failure());
        assert!(!Conclusion::Neutral.is_failure());
    }

    #[test]
    fn test_run_ref_display() {
        assert_eq!(RunRef::new("o", "r", 123).to_string(), "o/r#123");
    }
}
