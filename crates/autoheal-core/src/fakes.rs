//! In-memory CI provider fake (testing only)
//!
//! `ScriptedWorkflowApi` satisfies the [`WorkflowApi`] contract from a
//! script of run states. Before a rerun is triggered it reports the
//! `initial` state; afterwards it walks the scripted states one per
//! `get_run`, repeating the last one forever.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::workflow::{ApiError, ApiResult, Conclusion, RunRef, RunStatus, WorkflowApi, WorkflowJob, WorkflowRun};

/// Provider operations, for call counting and error injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    GetRun,
    Rerun,
    RerunFailedJobs,
    ListJobs,
    CancelRun,
    DownloadJobLogs,
}

type RunState = (RunStatus, Option<Conclusion>);

#[derive(Debug)]
struct Script {
    name: String,
    initial: RunState,
    after_rerun: VecDeque<RunState>,
    rerun_triggered: bool,
    cancelled: bool,
    polls_after_rerun: usize,
    jobs: Vec<WorkflowJob>,
    logs: HashMap<u64, Vec<u8>>,
    errors: HashMap<ApiCall, ApiError>,
    calls: HashMap<ApiCall, usize>,
}

/// Scripted [`WorkflowApi`] backed by a `Mutex<Script>`.
#[derive(Debug)]
pub struct ScriptedWorkflowApi {
    script: Mutex<Script>,
}

impl Default for ScriptedWorkflowApi {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script {
                name: "CI".to_string(),
                initial: (RunStatus::Completed, Some(Conclusion::Failure)),
                after_rerun: VecDeque::from([(RunStatus::Completed, Some(Conclusion::Success))]),
                rerun_triggered: false,
                cancelled: false,
                polls_after_rerun: 0,
                jobs: Vec::new(),
                logs: HashMap::new(),
                errors: HashMap::new(),
                calls: HashMap::new(),
            }),
        }
    }
}

impl ScriptedWorkflowApi {
    /// A failed run whose rerun completes successfully on the first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// A rerun that stays in progress forever.
    pub fn never_completes() -> Self {
        Self::new().with_states(vec![(RunStatus::InProgress, None)])
    }

    /// A rerun that goes queued → in progress → completed with `conclusion`.
    pub fn completes_with(conclusion: Conclusion) -> Self {
        Self::new().with_states(vec![
            (RunStatus::Queued, None),
            (RunStatus::InProgress, None),
            (RunStatus::Completed, Some(conclusion)),
        ])
    }

    /// States reported after the rerun is triggered; the last one repeats.
    pub fn with_states(self, states: Vec<(RunStatus, Option<Conclusion>)>) -> Self {
        self.script.lock().unwrap().after_rerun = states.into();
        self
    }

    pub fn with_initial_state(self, status: RunStatus, conclusion: Option<Conclusion>) -> Self {
        self.script.lock().unwrap().initial = (status, conclusion);
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.script.lock().unwrap().name = name.into();
        self
    }

    pub fn with_jobs(self, jobs: Vec<WorkflowJob>) -> Self {
        self.script.lock().unwrap().jobs = jobs;
        self
    }

    pub fn with_job_log(self, job_id: u64, content: impl Into<Vec<u8>>) -> Self {
        self.script.lock().unwrap().logs.insert(job_id, content.into());
        self
    }

    /// Make every `call` fail with `error`.
    pub fn fail_on(self, call: ApiCall, error: ApiError) -> Self {
        self.script.lock().unwrap().errors.insert(call, error);
        self
    }

    pub fn calls(&self, call: ApiCall) -> usize {
        self.script.lock().unwrap().calls.get(&call).copied().unwrap_or(0)
    }

    /// `get_run` calls made after the rerun was triggered.
    pub fn polls_after_rerun(&self) -> usize {
        self.script.lock().unwrap().polls_after_rerun
    }

    pub fn was_cancelled(&self) -> bool {
        self.script.lock().unwrap().cancelled
    }

    fn enter(&self, call: ApiCall) -> ApiResult<std::sync::MutexGuard<'_, Script>> {
        let mut script = self.script.lock().unwrap();
        *script.calls.entry(call).or_default() += 1;
        match script.errors.get(&call) {
            Some(err) => Err(err.clone()),
            None => Ok(script),
        }
    }
}

/// A job fixture with the given conclusion.
pub fn job(id: u64, name: &str, conclusion: Conclusion) -> WorkflowJob {
    WorkflowJob {
        id,
        name: name.to_string(),
        status: Some(RunStatus::Completed),
        conclusion: Some(conclusion),
        started_at: None,
        completed_at: None,
        html_url: Some(format!("https://ci.example/jobs/{id}")),
    }
}

#[async_trait]
impl WorkflowApi for ScriptedWorkflowApi {
    async fn get_run(&self, run: &RunRef) -> ApiResult<WorkflowRun> {
        let mut script = self.enter(ApiCall::GetRun)?;
        let (status, conclusion) = if script.cancelled {
            (RunStatus::Completed, Some(Conclusion::Cancelled))
        } else if script.rerun_triggered {
            script.polls_after_rerun += 1;
            if script.after_rerun.len() > 1 {
                script.after_rerun.pop_front().unwrap_or((RunStatus::Unknown, None))
            } else {
                script.after_rerun.front().copied().unwrap_or((RunStatus::Unknown, None))
            }
        } else {
            script.initial
        };
        Ok(WorkflowRun {
            id: run.run_id,
            name: Some(script.name.clone()),
            status,
            conclusion,
            html_url: Some(format!("https://ci.example/{}/{}/runs/{}", run.owner, run.repo, run.run_id)),
            run_number: Some(1),
            run_attempt: Some(if script.rerun_triggered { 2 } else { 1 }),
        })
    }

    async fn rerun(&self, _run: &RunRef) -> ApiResult<()> {
        self.enter(ApiCall::Rerun)?.rerun_triggered = true;
        Ok(())
    }

    async fn rerun_failed_jobs(&self, _run: &RunRef) -> ApiResult<()> {
        self.enter(ApiCall::RerunFailedJobs)?.rerun_triggered = true;
        Ok(())
    }

    async fn list_jobs(&self, _run: &RunRef) -> ApiResult<Vec<WorkflowJob>> {
        Ok(self.enter(ApiCall::ListJobs)?.jobs.clone())
    }

    async fn cancel_run(&self, _run: &RunRef) -> ApiResult<()> {
        self.enter(ApiCall::CancelRun)?.cancelled = true;
        Ok(())
    }

    async fn download_job_logs(&self, _run: &RunRef, job_id: u64) -> ApiResult<Vec<u8>> {
        let script = self.enter(ApiCall::DownloadJobLogs)?;
        script.logs.get(&job_id).cloned().ok_or_else(|| ApiError::Http {
            status: 404,
            message: format!("no logs for job {job_id}"),
        })
    }
}
