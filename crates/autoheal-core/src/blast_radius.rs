//! Blast-radius limiter: bounds how much automated remediation one target
//! absorbs within a sliding window and how many runs hit it concurrently.
//!
//! State is keyed by [`TargetKey`] and guarded by one mutex, so the
//! admission check and the start bookkeeping in [`BlastRadiusLimiter::try_acquire`]
//! happen atomically. Two concurrent runs on the same key can never both
//! observe "under threshold" when only one may proceed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::domain::{CheckResult, CheckSeverity, Incident, RemediationPlan, ValidationResult, BLAST_RADIUS};

/// Incident fields that can identify a remediation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetField {
    Service,
    Namespace,
    Repository,
}

impl TargetField {
    fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Namespace => "namespace",
            Self::Repository => "repository",
        }
    }

    fn read(self, incident: &Incident) -> Option<&str> {
        match self {
            Self::Service => incident.service(),
            Self::Namespace => incident.namespace(),
            Self::Repository => incident.repository(),
        }
    }
}

/// Identity of a remediation target, e.g. `service:payments` or `global`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetKey(String);

impl TargetKey {
    pub const GLOBAL: &'static str = "global";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority order used to derive a [`TargetKey`]; the first field present wins,
/// otherwise every incident shares the `global` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetKeyPolicy {
    pub fields: Vec<TargetField>,
}

impl Default for TargetKeyPolicy {
    fn default() -> Self {
        Self {
            fields: vec![
                TargetField::Service,
                TargetField::Namespace,
                TargetField::Repository,
            ],
        }
    }
}

impl TargetKeyPolicy {
    pub fn key_for(&self, incident: &Incident) -> TargetKey {
        self.fields
            .iter()
            .find_map(|field| {
                field
                    .read(incident)
                    .map(|value| TargetKey(format!("{}:{value}", field.as_str())))
            })
            .unwrap_or_else(|| TargetKey(TargetKey::GLOBAL.to_string()))
    }
}

/// Longest accepted sliding window (30 days).
pub const MAX_WINDOW_SECONDS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastRadiusConfig {
    pub window_seconds: u64,
    pub max_attempts_per_window: u32,
    pub max_concurrent_per_target: u32,
    pub key_policy: TargetKeyPolicy,
}

impl Default for BlastRadiusConfig {
    fn default() -> Self {
        Self {
            window_seconds: 600,
            max_attempts_per_window: 10,
            max_concurrent_per_target: 1,
            key_policy: TargetKeyPolicy::default(),
        }
    }
}

/// Current usage of one target.
///
/// `succeeded` and `failed` count since the target was last idle: a target
/// with no attempts in the window and nothing in flight is forgotten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUsage {
    pub attempts_in_window: u32,
    pub in_flight: u32,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct TargetState {
    attempts: VecDeque<DateTime<Utc>>,
    in_flight: u32,
    succeeded: u64,
    failed: u64,
}

impl TargetState {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self.attempts.front().is_some_and(|t| *t <= cutoff) {
            self.attempts.pop_front();
        }
    }

    fn is_idle(&self) -> bool {
        self.attempts.is_empty() && self.in_flight == 0
    }

    fn usage(&self) -> TargetUsage {
        TargetUsage {
            attempts_in_window: self.attempts.len() as u32,
            in_flight: self.in_flight,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }

    fn finish(&mut self, success: bool) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

type SharedState = Arc<Mutex<HashMap<TargetKey, TargetState>>>;

/// Drop targets whose window has drained and that have nothing in flight.
fn evict_idle(targets: &mut HashMap<TargetKey, TargetState>, cutoff: DateTime<Utc>) {
    targets.retain(|_, target| {
        target.prune(cutoff);
        !target.is_idle()
    });
}

fn lock(state: &SharedState) -> MutexGuard<'_, HashMap<TargetKey, TargetState>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Result of [`BlastRadiusLimiter::try_acquire`].
#[derive(Debug)]
pub enum Admission {
    /// Checks passed and the start has been recorded.
    Granted {
        validation: ValidationResult,
        permit: ExecutionPermit,
    },
    /// A check failed; nothing was recorded.
    Denied(ValidationResult),
}

/// Proof that an execution start was recorded for a target.
///
/// [`ExecutionPermit::finish`] records the matching end. A permit dropped
/// without finishing (early return, panic unwinding) records a failed end,
/// so start/end stay paired on every path.
#[derive(Debug)]
pub struct ExecutionPermit {
    state: SharedState,
    key: TargetKey,
    finished: bool,
}

impl ExecutionPermit {
    pub fn key(&self) -> &TargetKey {
        &self.key
    }

    pub fn finish(mut self, success: bool) {
        self.release(success);
    }

    fn release(&mut self, success: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        let mut targets = lock(&self.state);
        if let Some(target) = targets.get_mut(&self.key) {
            target.finish(success);
            debug!(target_key = %self.key, success, in_flight = target.in_flight, "execution end recorded");
        }
    }
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.release(false);
    }
}

/// Per-target rate and concurrency limiter.
#[derive(Debug, Clone)]
pub struct BlastRadiusLimiter {
    config: BlastRadiusConfig,
    clock: Arc<dyn Clock>,
    state: SharedState,
}

impl BlastRadiusLimiter {
    pub fn new(config: BlastRadiusConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BlastRadiusConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &BlastRadiusConfig {
        &self.config
    }

    pub fn target_key(&self, incident: &Incident) -> TargetKey {
        self.config.key_policy.key_for(incident)
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.config.window_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Number of targets currently tracked.
    pub fn tracked_targets(&self) -> usize {
        lock(&self.state).len()
    }

    fn checks(&self, key: &TargetKey, usage: TargetUsage) -> ValidationResult {
        let max_attempts = self.config.max_attempts_per_window;
        let max_concurrent = self.config.max_concurrent_per_target;
        let window = self.config.window_seconds;

        let attempts = if usage.attempts_in_window < max_attempts {
            CheckResult::pass(
                "attempts_in_window",
                format!(
                    "{} of {max_attempts} attempt(s) against {key} in the last {window}s",
                    usage.attempts_in_window
                ),
            )
        } else {
            CheckResult::fail(
                "attempts_in_window",
                format!(
                    "{} attempt(s) against {key} in the last {window}s; limit is {max_attempts}",
                    usage.attempts_in_window
                ),
                CheckSeverity::Critical,
            )
        };

        let concurrent = if usage.in_flight < max_concurrent {
            CheckResult::pass(
                "concurrent_executions",
                format!("{} of {max_concurrent} execution(s) in flight against {key}", usage.in_flight),
            )
        } else {
            CheckResult::fail(
                "concurrent_executions",
                format!(
                    "{} execution(s) already in flight against {key}; limit is {max_concurrent}",
                    usage.in_flight
                ),
                CheckSeverity::Critical,
            )
        };

        ValidationResult::from_checks(BLAST_RADIUS, vec![attempts, concurrent])
    }

    /// Check the target's budget without recording anything.
    pub fn validate(&self, incident: &Incident, plan: &RemediationPlan) -> ValidationResult {
        let key = self.target_key(incident);
        let cutoff = self.cutoff(self.clock.now());
        let usage = {
            let mut targets = lock(&self.state);
            match targets.get_mut(&key) {
                Some(target) => {
                    target.prune(cutoff);
                    target.usage()
                }
                None => TargetUsage::default(),
            }
        };
        debug!(target_key = %key, action = %plan.action_type, ?usage, "blast radius checked");
        self.checks(&key, usage)
    }

    /// Atomically validate and, if admitted, record the execution start.
    pub fn try_acquire(&self, incident: &Incident, plan: &RemediationPlan) -> Admission {
        let key = self.target_key(incident);
        let now = self.clock.now();
        let cutoff = self.cutoff(now);

        let mut targets = lock(&self.state);
        evict_idle(&mut targets, cutoff);
        let target = targets.entry(key.clone()).or_default();
        let validation = self.checks(&key, target.usage());
        if !validation.passed {
            debug!(target_key = %key, action = %plan.action_type, "admission denied");
            return Admission::Denied(validation);
        }

        target.attempts.push_back(now);
        target.in_flight += 1;
        debug!(target_key = %key, in_flight = target.in_flight, "execution start recorded");
        drop(targets);

        Admission::Granted {
            validation,
            permit: ExecutionPermit {
                state: Arc::clone(&self.state),
                key,
                finished: false,
            },
        }
    }

    /// Record an execution start without checking limits.
    pub fn record_execution_start(&self, incident: &Incident) -> TargetKey {
        let key = self.target_key(incident);
        let now = self.clock.now();
        let cutoff = self.cutoff(now);
        let mut targets = lock(&self.state);
        evict_idle(&mut targets, cutoff);
        let target = targets.entry(key.clone()).or_default();
        target.attempts.push_back(now);
        target.in_flight += 1;
        key
    }

    /// Record the end matching an earlier [`record_execution_start`](Self::record_execution_start).
    pub fn record_execution_end(&self, incident: &Incident, success: bool) {
        let key = self.target_key(incident);
        let mut targets = lock(&self.state);
        if let Some(target) = targets.get_mut(&key) {
            target.finish(success);
        }
    }

    pub fn snapshot(&self, key: &TargetKey) -> TargetUsage {
        let cutoff = self.cutoff(self.clock.now());
        let mut targets = lock(&self.state);
        targets
            .get_mut(key)
            .map(|target| {
                target.prune(cutoff);
                target.usage()
            })
            .unwrap_or_default()
    }
}
