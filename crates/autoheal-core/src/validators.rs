//! Pre- and post-execution validation batteries.
//!
//! A [`ValidatorChain`] runs its [`ValidationCheck`]s in order and folds the
//! outcomes into one [`ValidationResult`]. Checks are plain synchronous
//! predicates: anything that needs I/O belongs in the remediator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{
    AnalysisResult, CheckResult, CheckSeverity, Incident, RemediationPlan, RemediationResult, RiskLevel,
    ValidationResult, POST_VALIDATION, PRE_VALIDATION,
};
use crate::remediator::RemediatorRegistry;
use crate::rules::RuleSet;

/// Thresholds applied by the built-in checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Incidents below this confidence pass with a warning.
    pub min_confidence: f64,
    /// Highest risk level executed without a human.
    pub max_auto_risk: RiskLevel,
    /// Allowed multiple of `estimated_duration_seconds` before warning.
    pub duration_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_auto_risk: RiskLevel::Medium,
            duration_tolerance: 2.0,
        }
    }
}

/// Everything a check may look at.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub incident: &'a Incident,
    pub plan: &'a RemediationPlan,
    /// The caller has approved the plan.
    pub approved: bool,
    pub analysis: Option<&'a AnalysisResult>,
    /// Present only for post-execution checks.
    pub result: Option<&'a RemediationResult>,
}

impl<'a> CheckContext<'a> {
    pub fn new(incident: &'a Incident, plan: &'a RemediationPlan) -> Self {
        Self {
            incident,
            plan,
            approved: false,
            analysis: None,
            result: None,
        }
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }

    pub fn with_analysis(mut self, analysis: Option<&'a AnalysisResult>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_result(mut self, result: &'a RemediationResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// One named check.
pub trait ValidationCheck: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult;
}

/// Ordered battery of checks for one stage.
#[derive(Clone)]
pub struct ValidatorChain {
    stage: &'static str,
    checks: Vec<Arc<dyn ValidationCheck>>,
}

impl ValidatorChain {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            checks: Vec::new(),
        }
    }

    /// The standard pre-execution battery.
    pub fn pre_execution(registry: RemediatorRegistry, rules: RuleSet, config: &ValidationConfig) -> Self {
        Self::new(PRE_VALIDATION)
            .with_check(Arc::new(RemediatorAvailable {
                registry: registry.clone(),
            }))
            .with_check(Arc::new(GuardRules { rules }))
            .with_check(Arc::new(Approval))
            .with_check(Arc::new(RiskWithinLimit {
                max: config.max_auto_risk,
            }))
            .with_check(Arc::new(IncidentConfidence {
                min: config.min_confidence,
            }))
            .with_check(Arc::new(Parameters { registry }))
    }

    /// The standard post-execution battery.
    pub fn post_execution(config: &ValidationConfig) -> Self {
        Self::new(POST_VALIDATION)
            .with_check(Arc::new(ExecutionSucceeded))
            .with_check(Arc::new(ActionsRecorded))
            .with_check(Arc::new(DurationWithinEstimate {
                tolerance: config.duration_tolerance,
            }))
    }

    pub fn with_check(mut self, check: Arc<dyn ValidationCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn validate(&self, ctx: &CheckContext<'_>) -> ValidationResult {
        let results = self.checks.iter().map(|check| check.run(ctx)).collect();
        ValidationResult::from_checks(self.stage, results)
    }
}

struct RemediatorAvailable {
    registry: RemediatorRegistry,
}

impl ValidationCheck for RemediatorAvailable {
    fn name(&self) -> &str {
        "remediator_available"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        match self.registry.resolve(ctx.incident, ctx.plan) {
            Ok(_) => CheckResult::pass(
                self.name(),
                format!("remediator registered for {}", ctx.plan.action_type),
            ),
            Err(err) => CheckResult::fail(self.name(), err.to_string(), CheckSeverity::Critical),
        }
    }
}

struct GuardRules {
    rules: RuleSet,
}

impl ValidationCheck for GuardRules {
    fn name(&self) -> &str {
        "guard_rules"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let verdict = self
            .rules
            .evaluate(ctx.incident, &ctx.incident.context, ctx.analysis);
        if verdict.passed {
            return CheckResult::pass(self.name(), format!("{} guard rule(s) passed", self.rules.len()));
        }
        let reason = verdict.failure_reason().unwrap_or("rejected");
        let message = if verdict.should_escalate() {
            format!("rule '{}' rejected: {reason} (escalated for manual review)", verdict.rule)
        } else {
            format!("rule '{}' rejected: {reason}", verdict.rule)
        };
        CheckResult::fail(self.name(), message, CheckSeverity::Critical)
    }
}

struct Approval;

impl ValidationCheck for Approval {
    fn name(&self) -> &str {
        "approval"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        match (ctx.plan.requires_approval, ctx.approved) {
            (false, _) => CheckResult::pass(self.name(), "plan does not require approval"),
            (true, true) => CheckResult::pass(self.name(), "plan approved"),
            (true, false) => CheckResult::fail(
                self.name(),
                "plan requires approval before execution",
                CheckSeverity::Error,
            ),
        }
    }
}

struct RiskWithinLimit {
    max: RiskLevel,
}

impl ValidationCheck for RiskWithinLimit {
    fn name(&self) -> &str {
        "risk_level"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let risk = ctx.plan.risk_level;
        if risk <= self.max {
            CheckResult::pass(self.name(), format!("risk {risk} within automatic limit {}", self.max))
        } else {
            CheckResult::fail(
                self.name(),
                format!("risk {risk} exceeds automatic limit {}", self.max),
                CheckSeverity::Error,
            )
        }
    }
}

struct IncidentConfidence {
    min: f64,
}

impl ValidationCheck for IncidentConfidence {
    fn name(&self) -> &str {
        "incident_confidence"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let confidence = ctx.incident.confidence;
        if confidence >= self.min {
            CheckResult::pass(self.name(), format!("confidence {confidence:.2}"))
        } else {
            CheckResult::fail(
                self.name(),
                format!("confidence {confidence:.2} below {:.2}", self.min),
                CheckSeverity::Warning,
            )
        }
    }
}

struct Parameters {
    registry: RemediatorRegistry,
}

impl ValidationCheck for Parameters {
    fn name(&self) -> &str {
        "parameters"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let Some(remediator) = self.registry.get(ctx.plan.action_type) else {
            return CheckResult::fail(
                self.name(),
                format!("no remediator to validate parameters for {}", ctx.plan.action_type),
                CheckSeverity::Error,
            );
        };
        match remediator.validate_parameters(ctx.incident, ctx.plan) {
            Ok(()) => CheckResult::pass(self.name(), "parameters resolved"),
            Err(err) => CheckResult::fail(self.name(), err.to_string(), CheckSeverity::Error),
        }
    }
}

struct ExecutionSucceeded;

impl ValidationCheck for ExecutionSucceeded {
    fn name(&self) -> &str {
        "execution_succeeded"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        match ctx.result {
            Some(result) if result.success => CheckResult::pass(self.name(), "execution reported success"),
            Some(result) => CheckResult::fail(
                self.name(),
                result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "execution reported failure".to_string()),
                CheckSeverity::Critical,
            ),
            None => CheckResult::fail(self.name(), "no execution result", CheckSeverity::Critical),
        }
    }
}

struct ActionsRecorded;

impl ValidationCheck for ActionsRecorded {
    fn name(&self) -> &str {
        "actions_recorded"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let count = ctx.result.map_or(0, |r| r.actions_performed.len());
        if count > 0 {
            CheckResult::pass(self.name(), format!("{count} action(s) recorded"))
        } else {
            CheckResult::fail(self.name(), "no actions were performed", CheckSeverity::Error)
        }
    }
}

struct DurationWithinEstimate {
    tolerance: f64,
}

impl ValidationCheck for DurationWithinEstimate {
    fn name(&self) -> &str {
        "duration_within_estimate"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let (Some(estimate), Some(result)) = (ctx.plan.estimated_duration_seconds, ctx.result) else {
            return CheckResult::pass(self.name(), "no duration estimate");
        };
        let limit = estimate as f64 * self.tolerance;
        if result.duration_seconds <= limit {
            CheckResult::pass(
                self.name(),
                format!("took {:.1}s (estimate {estimate}s)", result.duration_seconds),
            )
        } else {
            CheckResult::fail(
                self.name(),
                format!(
                    "took {:.1}s, more than {:.1}x the {estimate}s estimate",
                    result.duration_seconds, self.tolerance
                ),
                CheckSeverity::Warning,
            )
        }
    }
}
