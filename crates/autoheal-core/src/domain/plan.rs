//! Remediation plans produced by the decision step.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The automated action a plan asks for. One remediator serves each type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    RerunWorkflow,
    RestartPod,
    RollbackDeployment,
    ScaleDeployment,
    ClearCache,
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RerunWorkflow => write!(f, "rerun_workflow"),
            Self::RestartPod => write!(f, "restart_pod"),
            Self::RollbackDeployment => write!(f, "rollback_deployment"),
            Self::ScaleDeployment => write!(f, "scale_deployment"),
            Self::ClearCache => write!(f, "clear_cache"),
            Self::NoOp => write!(f, "no_op"),
        }
    }
}

/// Risk classification of a plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// The chosen action for one incident. Immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub action_type: ActionType,
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Explicit parameter overrides; these win over incident context.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub requires_rollback_snapshot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_seconds: Option<u64>,
    #[serde(default)]
    pub reason: String,
}

impl RemediationPlan {
    pub fn new(action_type: ActionType, reason: impl Into<String>) -> Self {
        Self {
            action_type,
            risk_level: RiskLevel::Low,
            parameters: Map::new(),
            requires_approval: false,
            requires_rollback_snapshot: false,
            estimated_duration_seconds: None,
            reason: reason.into(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_risk_level(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_approval_required(mut self, required: bool) -> Self {
        self.requires_approval = required;
        self
    }

    pub fn with_rollback_snapshot(mut self, required: bool) -> Self {
        self.requires_rollback_snapshot = required;
        self
    }

    pub fn with_estimated_duration(mut self, seconds: u64) -> Self {
        self.estimated_duration_seconds = Some(seconds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_display_matches_serde() {
        for action in [
            ActionType::RerunWorkflow,
            ActionType::RestartPod,
            ActionType::RollbackDeployment,
            ActionType::ScaleDeployment,
            ActionType::ClearCache,
            ActionType::NoOp,
        ] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json.as_str().unwrap(), action.to_string());
        }
    }

    #[test]
    fn test_plan_defaults_from_minimal_json() {
        let plan: RemediationPlan =
            serde_json::from_str(r#"{"action_type":"rerun_workflow"}"#).unwrap();
        assert_eq!(plan.risk_level, RiskLevel::Low);
        assert!(plan.parameters.is_empty());
        assert!(!plan.requires_approval);
    }
}
