//! `RemediationService`: the safety-gated orchestration pipeline.
//!
//! ```text
//! pre-validation ─► blast radius ─► execute ─► end bookkeeping
//!                                      │
//!                   rollback ◄─ failed ┴─ succeeded ─► post-validation
//! ```
//!
//! [`RemediationService::execute_remediation`] never panics or errors
//! outward. Rejections, remediator failures, resolution errors and panics
//! all come back as a [`RemediationResult`].

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;

use crate::blast_radius::{Admission, BlastRadiusLimiter};
use crate::config::EngineConfig;
use crate::domain::{
    AnalysisResult, ExecutionLog, Incident, RemediationOutcome, RemediationPlan, RemediationResult, Result,
    ValidationResult, BLAST_RADIUS, POST_VALIDATION, PRE_VALIDATION,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::remediator::{Remediator, RemediatorRegistry};
use crate::rules::{BlacklistRule, RuleSet};
use crate::validators::{CheckContext, ValidatorChain};

const EXECUTION: &str = "execution";
const ROLLBACK: &str = "rollback";
const ORCHESTRATOR: &str = "orchestrator";

/// Per-call switches for [`RemediationService::execute_remediation`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub skip_pre_validation: bool,
    pub skip_blast_radius: bool,
    pub skip_post_validation: bool,
    /// The plan has been approved by a human.
    pub approved: bool,
    pub analysis: Option<AnalysisResult>,
}

impl ExecutionOptions {
    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisResult) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn skip_pre_validation(mut self) -> Self {
        self.skip_pre_validation = true;
        self
    }

    pub fn skip_blast_radius(mut self) -> Self {
        self.skip_blast_radius = true;
        self
    }

    pub fn skip_post_validation(mut self) -> Self {
        self.skip_post_validation = true;
        self
    }
}

/// Dry-run verdict from [`RemediationService::validate_plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanValidation {
    pub passed: bool,
    pub message: String,
    pub validation_details: BTreeMap<String, ValidationResult>,
}

/// State that outlives a failed or panicking pipeline.
#[derive(Debug)]
struct RunContext {
    log: ExecutionLog,
    validation_details: BTreeMap<String, ValidationResult>,
    pre_validation_passed: bool,
}

impl RunContext {
    fn new() -> Self {
        Self {
            log: ExecutionLog::new(),
            validation_details: BTreeMap::new(),
            pre_validation_passed: true,
        }
    }

    fn record(&mut self, stage: &str, validation: &ValidationResult) {
        if validation.passed {
            self.log.info(stage, validation.message.clone());
        } else {
            self.log.error(stage, validation.message.clone());
        }
        self.validation_details
            .insert(stage.to_string(), validation.clone());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Orchestrates validation, blast-radius limiting, execution, rollback and
/// post-validation for one incident at a time.
#[derive(Clone)]
pub struct RemediationService {
    registry: RemediatorRegistry,
    limiter: BlastRadiusLimiter,
    pre_validator: ValidatorChain,
    post_validator: ValidatorChain,
}

impl RemediationService {
    pub fn new(
        registry: RemediatorRegistry,
        limiter: BlastRadiusLimiter,
        pre_validator: ValidatorChain,
        post_validator: ValidatorChain,
    ) -> Self {
        Self {
            registry,
            limiter,
            pre_validator,
            post_validator,
        }
    }

    /// Standard batteries, a blacklist rule and a system-clock limiter.
    pub fn from_config(config: &EngineConfig, registry: RemediatorRegistry) -> Self {
        let rules = RuleSet::new().with_rule(Arc::new(BlacklistRule::new(config.blacklist.clone())));
        Self::new(
            registry.clone(),
            BlastRadiusLimiter::new(config.blast_radius.clone()),
            ValidatorChain::pre_execution(registry, rules, &config.validation),
            ValidatorChain::post_execution(&config.validation),
        )
    }

    pub fn with_limiter(mut self, limiter: BlastRadiusLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &BlastRadiusLimiter {
        &self.limiter
    }

    pub fn registry(&self) -> &RemediatorRegistry {
        &self.registry
    }

    fn check_context<'a>(
        incident: &'a Incident,
        plan: &'a RemediationPlan,
        options: &'a ExecutionOptions,
    ) -> CheckContext<'a> {
        CheckContext::new(incident, plan)
            .approved(options.approved)
            .with_analysis(options.analysis.as_ref())
    }

    /// Run the full pipeline for one incident.
    pub async fn execute_remediation(
        &self,
        incident: &Incident,
        plan: &RemediationPlan,
        options: &ExecutionOptions,
    ) -> RemediationResult {
        let started = Instant::now();
        let incident_id = incident.id.to_string();
        let span = obs::remediation_span(&incident_id, &plan.action_type.to_string());
        let mut run = RunContext::new();

        let outcome = AssertUnwindSafe(self.pipeline(incident, plan, options, &mut run))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                run.log.error(ORCHESTRATOR, err.to_string());
                RemediationResult::from_error("Remediation could not be executed", &err, 0.0, false)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                run.log.error(ORCHESTRATOR, format!("remediation panicked: {message}"));
                RemediationResult::failure(
                    "Remediation aborted by an unexpected panic",
                    format!("remediation panicked: {message}"),
                    0.0,
                    false,
                )
                .with_traceback(format!("panic in remediation pipeline for incident {incident_id}: {message}"))
            }
        };

        result.duration_seconds = started.elapsed().as_secs_f64();
        result.pre_validation_passed &= run.pre_validation_passed;
        result.validation_details.extend(run.validation_details);
        result.execution_logs = run.log.into_entries();

        match result.outcome {
            RemediationOutcome::Rejected => {}
            _ if result.success => METRICS.inc_succeeded(),
            _ => METRICS.inc_failed(),
        }
        span.in_scope(|| {
            obs::emit_remediation_finished(
                &incident_id,
                &result.outcome.to_string(),
                (result.duration_seconds * 1000.0) as u64,
                result.success,
            )
        });
        result
    }

    async fn pipeline(
        &self,
        incident: &Incident,
        plan: &RemediationPlan,
        options: &ExecutionOptions,
        run: &mut RunContext,
    ) -> Result<RemediationResult> {
        let incident_id = incident.id.to_string();
        let action = plan.action_type.to_string();
        let checks = Self::check_context(incident, plan, options);

        if options.skip_pre_validation {
            run.log.warn(PRE_VALIDATION, "pre-validation skipped by caller");
        } else {
            let validation = self.pre_validator.validate(&checks);
            run.record(PRE_VALIDATION, &validation);
            if !validation.passed {
                run.pre_validation_passed = false;
                let reasons = validation.blocking_reasons().join("; ");
                obs::emit_remediation_rejected(&incident_id, PRE_VALIDATION, &reasons);
                METRICS.inc_rejected();
                return Ok(RemediationResult::rejected(format!("Pre-validation failed: {reasons}")));
            }
        }

        let remediator = self.registry.resolve(incident, plan)?;

        let permit = if options.skip_blast_radius {
            run.log.warn(BLAST_RADIUS, "blast-radius check skipped by caller");
            None
        } else {
            match self.limiter.try_acquire(incident, plan) {
                Admission::Denied(validation) => {
                    run.record(BLAST_RADIUS, &validation);
                    let reasons = validation.blocking_reasons().join("; ");
                    obs::emit_remediation_rejected(&incident_id, BLAST_RADIUS, &reasons);
                    METRICS.inc_rejected();
                    return Ok(RemediationResult::rejected(format!(
                        "Blast radius limit exceeded: {reasons}"
                    )));
                }
                Admission::Granted { validation, permit } => {
                    run.record(BLAST_RADIUS, &validation);
                    Some(permit)
                }
            }
        };

        let target = permit
            .as_ref()
            .map(|p| p.key().clone())
            .unwrap_or_else(|| self.limiter.target_key(incident));
        obs::emit_remediation_started(&incident_id, &action, target.as_str());
        METRICS.inc_started();
        run.log.info(EXECUTION, format!("executing {action} against {target}"));

        let mut result = remediator.execute(incident, plan).await;

        if let Some(permit) = permit {
            permit.finish(result.success);
        }
        run.log.extend(std::mem::take(&mut result.execution_logs));
        result
            .metadata
            .insert("remediator_duration_seconds".to_string(), result.duration_seconds.into());
        if result.success {
            run.log.info(EXECUTION, result.message.clone());
        } else {
            run.log.error(
                EXECUTION,
                format!(
                    "{}: {}",
                    result.message,
                    result.error_message.as_deref().unwrap_or("no error detail")
                ),
            );
        }

        if !result.success && result.rollback_required {
            self.attempt_rollback(remediator.as_ref(), incident, plan, &mut result, &mut run.log)
                .await;
        }

        if result.success && !options.skip_post_validation {
            let validation = self.post_validator.validate(&checks.with_result(&result));
            run.record(POST_VALIDATION, &validation);
            if !validation.passed {
                let reasons = validation.blocking_reasons().join("; ");
                result.success = false;
                result.outcome = RemediationOutcome::Failed;
                result.post_validation_passed = false;
                result.message = format!("Post-validation failed after {action}");
                result.error_message = Some(format!("Post-validation failed: {reasons}"));
                if plan.requires_rollback_snapshot {
                    result.rollback_required = true;
                    self.attempt_rollback(remediator.as_ref(), incident, plan, &mut result, &mut run.log)
                        .await;
                }
            }
        } else if options.skip_post_validation {
            run.log.warn(POST_VALIDATION, "post-validation skipped by caller");
        }

        Ok(result)
    }

    /// Roll back through the remediator's capability, if it has one.
    ///
    /// A failed rollback is recorded on the result, never raised.
    async fn attempt_rollback(
        &self,
        remediator: &dyn Remediator,
        incident: &Incident,
        plan: &RemediationPlan,
        result: &mut RemediationResult,
        log: &mut ExecutionLog,
    ) {
        let Some(support) = remediator.rollback_support() else {
            log.info(ROLLBACK, format!("rollback not applicable to {}", plan.action_type));
            result.rollback_performed = false;
            return;
        };

        match support.rollback(incident, plan).await {
            Ok(description) => {
                log.info(ROLLBACK, format!("rollback performed: {description}"));
                result.rollback_performed = true;
                result.outcome = RemediationOutcome::RolledBack;
                result.actions_performed.push(format!("rollback: {description}"));
                METRICS.inc_rollbacks();
            }
            Err(err) => {
                log.error(ROLLBACK, format!("rollback failed: {err}"));
                result.rollback_performed = false;
                result
                    .metadata
                    .insert("rollback_error".to_string(), err.to_string().into());
            }
        }
        obs::emit_rollback_attempted(
            &incident.id.to_string(),
            &plan.action_type.to_string(),
            result.rollback_performed,
        );
    }

    /// Run pre-validation and the blast-radius check without executing or
    /// recording anything.
    pub fn validate_plan(
        &self,
        incident: &Incident,
        plan: &RemediationPlan,
        options: &ExecutionOptions,
    ) -> PlanValidation {
        let mut details = BTreeMap::new();
        if !options.skip_pre_validation {
            let checks = Self::check_context(incident, plan, options);
            details.insert(PRE_VALIDATION.to_string(), self.pre_validator.validate(&checks));
        }
        if !options.skip_blast_radius {
            details.insert(BLAST_RADIUS.to_string(), self.limiter.validate(incident, plan));
        }

        let failed: Vec<&str> = details
            .iter()
            .filter(|(_, v)| !v.passed)
            .map(|(stage, _)| stage.as_str())
            .collect();
        let passed = failed.is_empty();
        let message = if passed {
            format!("plan for {} would be admitted", plan.action_type)
        } else {
            format!("plan for {} would be rejected by: {}", plan.action_type, failed.join(", "))
        };

        PlanValidation {
            passed,
            message,
            validation_details: details,
        }
    }

    /// Run many remediations concurrently, one task each. Results come back
    /// in input order.
    pub async fn execute_batch(
        self: Arc<Self>,
        jobs: Vec<(Incident, RemediationPlan)>,
        options: ExecutionOptions,
    ) -> Vec<RemediationResult> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(incident, plan)| {
                let service = Arc::clone(&self);
                let options = options.clone();
                tokio::spawn(async move { service.execute_remediation(&incident, &plan, &options).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|err| {
                    RemediationResult::failure("Remediation task aborted", err.to_string(), 0.0, false)
                })
            })
            .collect()
    }
}
