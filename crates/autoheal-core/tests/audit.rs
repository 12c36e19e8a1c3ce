use autoheal_core::{
    read_result_artifact, write_result_artifact, CheckResult, RemediationError, RemediationResult, ValidationResult,
};
use tempfile::tempdir;

fn result() -> RemediationResult {
    let mut result = RemediationResult::success("Workflow rerun of o/r#1 completed", vec!["Reran only failed jobs".into()], 4.0)
        .with_metadata("run", "o/r#1");
    result.validation_details.insert(
        "pre_validation".into(),
        ValidationResult::from_checks("pre_validation", vec![CheckResult::pass("approval", "not required")]),
    );
    result
}

#[test]
fn artifact_round_trips_with_digest() {
    let dir = tempdir().unwrap();

    let path = write_result_artifact("run-1", &result(), dir.path()).unwrap();
    assert!(path.ends_with("run-1/remediation.json"));
    assert!(dir.path().join("run-1/remediation.digest").exists());

    let artifact = read_result_artifact("run-1", dir.path()).unwrap();
    assert_eq!(artifact.run_id, "run-1");
    assert!(artifact.result.success);
    assert_eq!(artifact.result.actions_performed, vec!["Reran only failed jobs".to_string()]);
    assert!(artifact.result.validation_details["pre_validation"].passed);
}

#[test]
fn tampered_artifact_is_rejected() {
    let dir = tempdir().unwrap();
    let path = write_result_artifact("run-2", &result(), dir.path()).unwrap();

    let tampered = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"success\": true", "\"success\": false");
    std::fs::write(&path, tampered).unwrap();

    let err = read_result_artifact("run-2", dir.path()).unwrap_err();
    assert!(matches!(err, RemediationError::DigestMismatch { .. }));
}

#[test]
fn missing_artifact_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = read_result_artifact("nope", dir.path()).unwrap_err();
    assert!(matches!(err, RemediationError::Io(_)));
}

#[test]
fn run_ids_that_leave_the_artifact_dir_are_rejected() {
    let root = tempdir().unwrap();
    let dir = root.path().join("artifacts");

    for run_id in ["../escape", "..", "a/b", "a\\b", ""] {
        let err = write_result_artifact(run_id, &result(), &dir).unwrap_err();
        assert!(matches!(err, RemediationError::Validation(_)), "{run_id}: {err}");
        assert!(matches!(read_result_artifact(run_id, &dir), Err(RemediationError::Validation(_))));
    }
    assert!(!root.path().join("escape").exists());
}
