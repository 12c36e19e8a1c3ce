//! Integrity-checked audit artifacts for remediation results.
//!
//! Artifacts are written to `<dir>/<run_id>/remediation.json` with a
//! companion `<dir>/<run_id>/remediation.digest` holding the SHA-256 of the
//! JSON bytes. Reading recomputes the digest and refuses tampered files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{RemediationError, RemediationResult, Result};

const RESULT_FILE: &str = "remediation.json";
const DIGEST_FILE: &str = "remediation.digest";

/// A persisted remediation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationArtifact {
    pub run_id: String,
    pub recorded_at: DateTime<Utc>,
    pub result: RemediationResult,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Directory for `run_id`; the id must be a single plain path component.
fn run_dir(dir: &Path, run_id: &str) -> Result<PathBuf> {
    let plain = !run_id.is_empty()
        && run_id != "."
        && run_id != ".."
        && !run_id.contains(['/', '\\', '\0']);
    if !plain {
        return Err(RemediationError::Validation(format!(
            "artifact run id '{run_id}' must be a single path component"
        )));
    }
    Ok(dir.join(run_id))
}

/// Write `result` under `<dir>/<run_id>/`. Returns the path to `remediation.json`.
pub fn write_result_artifact(run_id: &str, result: &RemediationResult, dir: &Path) -> Result<PathBuf> {
    let run_dir = run_dir(dir, run_id)?;
    std::fs::create_dir_all(&run_dir)?;

    let artifact = RemediationArtifact {
        run_id: run_id.to_string(),
        recorded_at: Utc::now(),
        result: result.clone(),
    };
    let json = serde_json::to_vec_pretty(&artifact)?;

    let result_path = run_dir.join(RESULT_FILE);
    std::fs::write(&result_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), sha256_hex(&json))?;

    Ok(result_path)
}

/// Read and verify the artifact for `run_id`.
///
/// Returns [`RemediationError::DigestMismatch`] if the JSON no longer
/// matches its stored digest.
pub fn read_result_artifact(run_id: &str, dir: &Path) -> Result<RemediationArtifact> {
    let run_dir = run_dir(dir, run_id)?;
    let json = std::fs::read(run_dir.join(RESULT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?
        .trim()
        .to_string();

    let actual = sha256_hex(&json);
    if actual != expected {
        return Err(RemediationError::DigestMismatch { expected, actual });
    }

    Ok(serde_json::from_slice(&json)?)
}
