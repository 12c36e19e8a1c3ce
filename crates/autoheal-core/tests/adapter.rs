use std::sync::Arc;
use std::time::Duration;

use autoheal_core::fakes::{job, ApiCall, ScriptedWorkflowApi};
use autoheal_core::{AdapterError, ApiError, ApiErrorKind, Conclusion, RunRef, RunStatus, WorkflowRunAdapter};

fn run() -> RunRef {
    RunRef::new("acme", "widgets", 123)
}

#[tokio::test(start_paused = true)]
async fn wait_reports_success_after_walking_states() {
    let api = Arc::new(ScriptedWorkflowApi::completes_with(Conclusion::Success));
    let adapter = WorkflowRunAdapter::new(api.clone());

    adapter.rerun(&run(), true).await.unwrap();
    let report = adapter
        .wait_for_completion(&run(), Duration::from_secs(60), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.conclusion, Some(Conclusion::Success));
    assert_eq!(report.polls, 3);
    assert!(report.elapsed >= Duration::from_secs(10));
    assert!(report.failed_jobs.is_empty());
    assert_eq!(api.calls(ApiCall::RerunFailedJobs), 1);
    assert_eq!(api.calls(ApiCall::Rerun), 0);
    assert_eq!(api.calls(ApiCall::ListJobs), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_after_exactly_timeout_over_interval_polls() {
    let api = Arc::new(ScriptedWorkflowApi::never_completes());
    let adapter = WorkflowRunAdapter::new(api.clone());

    adapter.rerun(&run(), false).await.unwrap();
    let err = adapter
        .wait_for_completion(&run(), Duration::from_secs(30), Duration::from_secs(10))
        .await
        .unwrap_err();

    match err {
        AdapterError::Timeout { elapsed, timeout } => {
            assert_eq!(timeout, Duration::from_secs(30));
            assert!(elapsed >= timeout);
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(api.polls_after_rerun(), 3);
    assert!(!api.was_cancelled(), "a client-side timeout must not cancel the run");
}

#[tokio::test(start_paused = true)]
async fn unbounded_timeout_still_waits_for_completion() {
    let api = Arc::new(ScriptedWorkflowApi::completes_with(Conclusion::Success));
    let adapter = WorkflowRunAdapter::new(api.clone());

    adapter.rerun(&run(), true).await.unwrap();
    let report = adapter
        .wait_for_completion(&run(), Duration::MAX, Duration::from_secs(5))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.polls, 3);
}

#[tokio::test(start_paused = true)]
async fn failed_run_lists_failed_jobs() {
    let api = Arc::new(ScriptedWorkflowApi::completes_with(Conclusion::Failure).with_jobs(vec![
        job(1, "build", Conclusion::Failure),
        job(2, "lint", Conclusion::Success),
        job(3, "test", Conclusion::TimedOut),
    ]));
    let adapter = WorkflowRunAdapter::new(api.clone());

    adapter.rerun(&run(), true).await.unwrap();
    let report = adapter
        .wait_for_completion(&run(), Duration::from_secs(60), Duration::from_secs(1))
        .await
        .unwrap();

    assert!(!report.success);
    let names: Vec<&str> = report.failed_jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["build", "test"]);
    let reason = report.failure_reason.unwrap();
    assert!(reason.contains("build (failure)"));
    assert!(reason.contains("test (timed_out)"));
}

#[tokio::test(start_paused = true)]
async fn job_listing_failure_degrades_report() {
    let api = Arc::new(
        ScriptedWorkflowApi::completes_with(Conclusion::Cancelled).fail_on(
            ApiCall::ListJobs,
            ApiError::Http {
                status: 500,
                message: "boom".into(),
            },
        ),
    );
    let adapter = WorkflowRunAdapter::new(api.clone());

    adapter.rerun(&run(), true).await.unwrap();
    let report = adapter
        .wait_for_completion(&run(), Duration::from_secs(60), Duration::from_secs(1))
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.failed_jobs.is_empty());
    assert!(report
        .failure_reason
        .unwrap()
        .contains("job details unavailable"));
}

#[tokio::test]
async fn api_errors_are_classified() {
    let api = Arc::new(ScriptedWorkflowApi::new().fail_on(
        ApiCall::GetRun,
        ApiError::Http {
            status: 404,
            message: "Not Found".into(),
        },
    ));
    let adapter = WorkflowRunAdapter::new(api);

    let err = adapter.get_run(&run()).await.unwrap_err();
    match &err {
        AdapterError::Api(api_err) => assert_eq!(api_err.kind(), ApiErrorKind::NotFound),
        other => panic!("expected api error, got {other}"),
    }
    assert!(err.to_string().contains("not_found"));
}

#[tokio::test]
async fn check_success_reflects_completion() {
    let api = Arc::new(ScriptedWorkflowApi::new().with_states(vec![(RunStatus::InProgress, None)]));
    let adapter = WorkflowRunAdapter::new(api);

    assert_eq!(adapter.check_success(&run()).await.unwrap(), Some(false));
    adapter.rerun(&run(), true).await.unwrap();
    assert_eq!(adapter.check_success(&run()).await.unwrap(), None);
}

#[tokio::test]
async fn cancel_only_stops_in_flight_runs() {
    let api = Arc::new(ScriptedWorkflowApi::new().with_initial_state(RunStatus::InProgress, None));
    let adapter = WorkflowRunAdapter::new(api.clone());

    assert!(adapter.cancel(&run()).await.unwrap());
    assert!(api.was_cancelled());
    assert!(!adapter.cancel(&run()).await.unwrap());
    assert_eq!(api.calls(ApiCall::CancelRun), 1);
}

#[tokio::test]
async fn logs_and_status_summary() {
    let api = Arc::new(
        ScriptedWorkflowApi::new()
            .with_name("CI")
            .with_jobs(vec![
                job(1, "build", Conclusion::Failure),
                job(2, "lint", Conclusion::Success),
            ])
            .with_job_log(1, "error[E0425]: cannot find value")
            .with_job_log(2, "ok"),
    );
    let adapter = WorkflowRunAdapter::new(api);

    let failed = adapter.get_logs(&run(), true).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].job_name, "build");
    assert!(failed[0].content.contains("E0425"));
    assert_eq!(adapter.get_logs(&run(), false).await.unwrap().len(), 2);

    let summary = adapter.get_status_summary(&run()).await.unwrap();
    assert_eq!(summary.run_id, 123);
    assert_eq!(summary.name.as_deref(), Some("CI"));
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.total_jobs, 2);
    assert_eq!(summary.failed_jobs, vec!["build".to_string()]);
}
