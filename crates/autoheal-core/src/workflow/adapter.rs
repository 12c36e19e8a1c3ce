//! Workflow-run lifecycle state machine layered over a [`WorkflowApi`].
//!
//! ```text
//! queued | in_progress | waiting | requested | pending ──► completed(conclusion)
//! ```
//!
//! [`WorkflowRunAdapter::wait_for_completion`] is the only routine in the
//! engine that sleeps. It gives up client-side when its wall-clock budget is
//! spent: the rerun on the provider is **not** cancelled and keeps running.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::api::{Conclusion, RunRef, RunStatus, WorkflowApi, WorkflowJob, WorkflowRun};
use super::error::{AdapterError, AdapterResult};
use crate::obs::emit_poll_tick;

/// Floor applied to the poll interval so a zero interval cannot spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A job reported as failed when a run concludes unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: u64,
    pub name: String,
    pub conclusion: Option<Conclusion>,
    pub html_url: Option<String>,
}

impl From<&WorkflowJob> for FailedJob {
    fn from(job: &WorkflowJob) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            conclusion: job.conclusion,
            html_url: job.html_url.clone(),
        }
    }
}

/// Terminal state observed by `wait_for_completion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub run: WorkflowRun,
    /// `true` iff the conclusion is `success`.
    pub success: bool,
    pub conclusion: Option<Conclusion>,
    pub failure_reason: Option<String>,
    pub failed_jobs: Vec<FailedJob>,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Read-only overview of a run and its jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub run_id: u64,
    pub name: Option<String>,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub html_url: Option<String>,
    pub run_number: Option<u64>,
    pub total_jobs: usize,
    pub failed_jobs: Vec<String>,
}

/// Log text of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLog {
    pub job_id: u64,
    pub job_name: String,
    pub content: String,
}

/// Drives workflow runs through their lifecycle.
#[derive(Clone)]
pub struct WorkflowRunAdapter {
    api: Arc<dyn WorkflowApi>,
}

impl WorkflowRunAdapter {
    pub fn new(api: Arc<dyn WorkflowApi>) -> Self {
        Self { api }
    }

    pub async fn get_run(&self, run: &RunRef) -> AdapterResult<WorkflowRun> {
        Ok(self.api.get_run(run).await?)
    }

    /// Trigger a rerun of either the failed jobs or the whole workflow.
    #[instrument(skip(self), fields(run = %run))]
    pub async fn rerun(&self, run: &RunRef, failed_only: bool) -> AdapterResult<()> {
        if failed_only {
            self.api.rerun_failed_jobs(run).await?;
        } else {
            self.api.rerun(run).await?;
        }
        debug!(failed_only, "rerun triggered");
        Ok(())
    }

    /// Poll until the run completes or `timeout` of wall-clock time elapses.
    ///
    /// The deadline is fixed on entry and checked before every fetch, so a
    /// run that never completes is fetched `ceil(timeout / poll_interval)`
    /// times. On failure the job list is fetched to build `failure_reason`
    /// and `failed_jobs`; a failing job listing degrades the report instead
    /// of failing the wait.
    #[instrument(skip(self), fields(run = %run))]
    pub async fn wait_for_completion(
        &self,
        run: &RunRef,
        timeout: Duration,
        poll_interval: Duration,
    ) -> AdapterResult<CompletionReport> {
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let started = Instant::now();
        // An unrepresentable deadline means the wait is effectively unbounded.
        let deadline = started.checked_add(timeout);
        let mut polls = 0u32;

        loop {
            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(polls, "gave up waiting; the run keeps going on the provider");
                return Err(AdapterError::Timeout {
                    elapsed: now - started,
                    timeout,
                });
            }

            polls += 1;
            let current = self.api.get_run(run).await?;
            emit_poll_tick(&run.to_string(), polls, current.status.as_str());

            if current.status.is_terminal() {
                return Ok(self.report(run, current, polls, started.elapsed()).await);
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn report(
        &self,
        run: &RunRef,
        current: WorkflowRun,
        polls: u32,
        elapsed: Duration,
    ) -> CompletionReport {
        let conclusion = current.conclusion;
        let success = conclusion == Some(Conclusion::Success);
        let mut report = CompletionReport {
            run: current,
            success,
            conclusion,
            failure_reason: None,
            failed_jobs: Vec::new(),
            polls,
            elapsed,
        };
        if success {
            return report;
        }

        let concluded = conclusion.map_or("no conclusion", Conclusion::as_str);
        match self.api.list_jobs(run).await {
            Ok(jobs) => {
                report.failed_jobs = jobs.iter().filter(|j| j.failed()).map(FailedJob::from).collect();
                report.failure_reason = Some(failure_reason(
                    report.run.display_name(),
                    concluded,
                    &report.failed_jobs,
                ));
            }
            Err(err) => {
                warn!(error = %err, "could not list jobs for failed run");
                report.failure_reason = Some(format!(
                    "workflow '{}' concluded with {concluded} (job details unavailable: {err})",
                    report.run.display_name()
                ));
            }
        }
        report
    }

    /// `Some(success)` once the run has completed, `None` while it is still going.
    pub async fn check_success(&self, run: &RunRef) -> AdapterResult<Option<bool>> {
        let current = self.api.get_run(run).await?;
        Ok(current
            .status
            .is_terminal()
            .then(|| current.conclusion == Some(Conclusion::Success)))
    }

    /// Cancel the run if it is still in flight.
    ///
    /// Returns `false` when the run had already completed.
    #[instrument(skip(self), fields(run = %run))]
    pub async fn cancel(&self, run: &RunRef) -> AdapterResult<bool> {
        let current = self.api.get_run(run).await?;
        if current.status.is_terminal() {
            debug!("run already completed; nothing to cancel");
            return Ok(false);
        }
        self.api.cancel_run(run).await?;
        Ok(true)
    }

    /// Fetch job logs, optionally restricted to failed jobs.
    pub async fn get_logs(&self, run: &RunRef, failed_only: bool) -> AdapterResult<Vec<JobLog>> {
        let jobs = self.api.list_jobs(run).await?;
        let mut logs = Vec::new();
        for job in jobs.iter().filter(|j| !failed_only || j.failed()) {
            let bytes = self.api.download_job_logs(run, job.id).await?;
            logs.push(JobLog {
                job_id: job.id,
                job_name: job.name.clone(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(logs)
    }

    pub async fn get_status_summary(&self, run: &RunRef) -> AdapterResult<StatusSummary> {
        let current = self.api.get_run(run).await?;
        let jobs = self.api.list_jobs(run).await?;
        Ok(StatusSummary {
            run_id: current.id,
            name: current.name,
            status: current.status,
            conclusion: current.conclusion,
            html_url: current.html_url,
            run_number: current.run_number,
            total_jobs: jobs.len(),
            failed_jobs: jobs
                .iter()
                .filter(|j| j.failed())
                .map(|j| j.name.clone())
                .collect(),
        })
    }
}

fn failure_reason(workflow: &str, concluded: &str, failed_jobs: &[FailedJob]) -> String {
    if failed_jobs.is_empty() {
        return format!("workflow '{workflow}' concluded with {concluded}");
    }
    let jobs: Vec<String> = failed_jobs
        .iter()
        .map(|j| {
            format!(
                "{} ({})",
                j.name,
                j.conclusion.map_or("unknown", Conclusion::as_str)
            )
        })
        .collect();
    format!(
        "workflow '{workflow}' concluded with {concluded}: {} job(s) failed: {}",
        failed_jobs.len(),
        jobs.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_without_jobs() {
        assert_eq!(
            failure_reason("CI", "cancelled", &[]),
            "workflow 'CI' concluded with cancelled"
        );
    }

    #[test]
    fn test_failure_reason_lists_jobs() {
        let jobs = vec![
            FailedJob {
                id: 1,
                name: "build".into(),
                conclusion: Some(Conclusion::Failure),
                html_url: None,
            },
            FailedJob {
                id: 2,
                name: "test".into(),
                conclusion: Some(Conclusion::TimedOut),
                html_url: None,
            },
        ];
        let reason = failure_reason("CI", "failure", &jobs);
        assert!(reason.contains("2 job(s) failed"));
        assert!(reason.contains("build (failure)"));
        assert!(reason.contains("test (timed_out)"));
    }
}
