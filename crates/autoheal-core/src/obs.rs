//! Structured observability hooks for the remediation lifecycle.
//!
//! Events are emitted at `info!` level except rejections and failed
//! rollbacks, which warn. See [`crate::telemetry::init_tracing`] for
//! subscriber setup.

use tracing::{info, warn, Span};

/// Span covering one remediation attempt.
///
/// Attach with `tracing::Instrument::instrument` so it survives `.await`
/// points on a multi-threaded runtime.
pub fn remediation_span(incident_id: &str, action_type: &str) -> Span {
    tracing::info_span!("autoheal.remediation", incident_id = %incident_id, action_type = %action_type)
}

pub fn emit_remediation_started(incident_id: &str, action_type: &str, target: &str) {
    info!(
        event = "remediation.started",
        incident_id = %incident_id,
        action_type = %action_type,
        target_key = %target,
    );
}

pub fn emit_remediation_rejected(incident_id: &str, stage: &str, reason: &str) {
    warn!(
        event = "remediation.rejected",
        incident_id = %incident_id,
        stage = %stage,
        reason = %reason,
    );
}

pub fn emit_remediation_finished(incident_id: &str, outcome: &str, duration_ms: u64, success: bool) {
    info!(
        event = "remediation.finished",
        incident_id = %incident_id,
        outcome = %outcome,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_poll_tick(run: &str, poll: u32, status: &str) {
    tracing::debug!(event = "workflow.poll", run = %run, poll = poll, status = %status);
}

pub fn emit_rollback_attempted(incident_id: &str, action_type: &str, performed: bool) {
    if performed {
        info!(event = "rollback.attempted", incident_id = %incident_id, action_type = %action_type, performed);
    } else {
        warn!(event = "rollback.attempted", incident_id = %incident_id, action_type = %action_type, performed);
    }
}
