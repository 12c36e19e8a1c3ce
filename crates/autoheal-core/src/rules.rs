//! Guard rules that veto remediation for specific targets.
//!
//! A rule returns its verdict, reason included, as a value. Rules hold no
//! per-call state, so one instance can serve concurrent orchestrations.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{AnalysisResult, Incident};

/// Verdict of one rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub rule: String,
    pub passed: bool,
    pub reason: Option<String>,
    /// Rejection should go to a human instead of failing silently.
    pub escalate: bool,
}

impl RuleVerdict {
    pub fn pass(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            passed: true,
            reason: None,
            escalate: false,
        }
    }

    pub fn reject(rule: impl Into<String>, reason: impl Into<String>, escalate: bool) -> Self {
        Self {
            rule: rule.into(),
            passed: false,
            reason: Some(reason.into()),
            escalate,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn should_escalate(&self) -> bool {
        !self.passed && self.escalate
    }
}

/// A guard predicate over an incident.
///
/// `context` is the caller's view of the target (normally
/// `incident.context`); `analysis` is the optional upstream analysis.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        incident: &Incident,
        context: &Map<String, Value>,
        analysis: Option<&AnalysisResult>,
    ) -> RuleVerdict;
}

/// Targets that must never be remediated automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    pub services: BTreeSet<String>,
    pub namespaces: BTreeSet<String>,
    pub repositories: BTreeSet<String>,
    /// Escalate blacklist hits to a human.
    pub escalate: bool,
}

impl BlacklistConfig {
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.services.insert(service.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.insert(namespace.into());
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repositories.insert(repository.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.namespaces.is_empty() && self.repositories.is_empty()
    }
}

/// Rejects incidents whose service, namespace or repository is blacklisted.
///
/// Lookups run in that order and the first hit wins.
#[derive(Debug, Clone, Default)]
pub struct BlacklistRule {
    config: BlacklistConfig,
}

impl BlacklistRule {
    pub const NAME: &'static str = "blacklist";

    pub fn new(config: BlacklistConfig) -> Self {
        Self { config }
    }
}

fn context_value<'a>(context: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| context.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl Rule for BlacklistRule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(
        &self,
        incident: &Incident,
        context: &Map<String, Value>,
        _analysis: Option<&AnalysisResult>,
    ) -> RuleVerdict {
        let lookups: [(&str, Option<&str>, &BTreeSet<String>); 3] = [
            (
                "service",
                context_value(context, &["service", "service_name"]).or(incident.service()),
                &self.config.services,
            ),
            (
                "namespace",
                context_value(context, &["namespace"]).or(incident.namespace()),
                &self.config.namespaces,
            ),
            (
                "repository",
                context_value(context, &["repository", "repo"]).or(incident.repository()),
                &self.config.repositories,
            ),
        ];

        for (field, value, blocked) in lookups {
            if let Some(value) = value {
                if blocked.contains(value) {
                    return RuleVerdict::reject(
                        Self::NAME,
                        format!("{field} '{value}' is blacklisted for automated remediation"),
                        self.config.escalate,
                    );
                }
            }
        }

        RuleVerdict::pass(Self::NAME)
    }
}

/// Ordered rules; evaluation stops at the first rejection.
#[derive(Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: Arc<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule in order; the first rejection is returned.
    pub fn evaluate(
        &self,
        incident: &Incident,
        context: &Map<String, Value>,
        analysis: Option<&AnalysisResult>,
    ) -> RuleVerdict {
        for rule in &self.rules {
            let verdict = rule.evaluate(incident, context, analysis);
            if !verdict.passed {
                return verdict;
            }
        }
        RuleVerdict::pass("rule_set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IncidentSource;

    fn blacklist() -> BlacklistRule {
        BlacklistRule::new(
            BlacklistConfig::default()
                .with_service("payments")
                .with_namespace("kube-system")
                .with_repository("org/infra"),
        )
    }

    fn evaluate(rule: &dyn Rule, incident: &Incident) -> RuleVerdict {
        rule.evaluate(incident, &incident.context, None)
    }

    #[test]
    fn test_unlisted_incident_passes() {
        let incident = Incident::new(IncidentSource::Github, "test_failure")
            .with_context("service", "search")
            .with_context("repository", "org/app");
        let verdict = evaluate(&blacklist(), &incident);
        assert!(verdict.passed);
        assert!(verdict.failure_reason().is_none());
    }

    #[test]
    fn test_service_match_wins_over_later_lookups() {
        let incident = Incident::new(IncidentSource::Kubernetes, "crash_loop")
            .with_context("service", "payments")
            .with_context("namespace", "kube-system");
        let verdict = evaluate(&blacklist(), &incident);
        assert!(!verdict.passed);
        assert!(verdict.failure_reason().unwrap().starts_with("service 'payments'"));
    }

    #[test]
    fn test_namespace_and_repository_matches() {
        let ns = Incident::new(IncidentSource::Kubernetes, "oom")
            .with_context("namespace", "kube-system");
        assert!(evaluate(&blacklist(), &ns)
            .failure_reason()
            .unwrap()
            .contains("namespace"));

        let repo = Incident::new(IncidentSource::Github, "build_failure")
            .with_context("repo", "org/infra");
        assert!(evaluate(&blacklist(), &repo)
            .failure_reason()
            .unwrap()
            .contains("repository 'org/infra'"));
    }

    #[test]
    fn test_explicit_context_overrides_incident() {
        let incident = Incident::new(IncidentSource::Github, "x").with_context("service", "payments");
        let mut context = Map::new();
        context.insert("service".into(), Value::from("search"));
        assert!(blacklist().evaluate(&incident, &context, None).passed);
    }

    #[test]
    fn test_escalation_flag() {
        let mut config = BlacklistConfig::default().with_service("payments");
        config.escalate = true;
        let incident = Incident::new(IncidentSource::Github, "x").with_context("service", "payments");
        let verdict = evaluate(&BlacklistRule::new(config), &incident);
        assert!(verdict.should_escalate());
    }

    #[test]
    fn test_rule_set_stops_at_first_rejection() {
        let set = RuleSet::new()
            .with_rule(Arc::new(blacklist()))
            .with_rule(Arc::new(BlacklistRule::new(
                BlacklistConfig::default().with_service("search"),
            )));
        let incident = Incident::new(IncidentSource::Github, "x").with_context("service", "search");
        let verdict = set.evaluate(&incident, &incident.context, None);
        assert!(!verdict.passed);
        assert_eq!(set.len(), 2);
    }
}
