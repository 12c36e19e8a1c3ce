//! Remediator contract and the registry mapping action types to executors.

mod workflow_rerun;

pub use workflow_rerun::{RerunDefaults, RerunParameters, WorkflowRerunRemediator, MAX_TIMEOUT_SECONDS};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ActionType, Incident, RemediationError, RemediationPlan, RemediationResult, Result};

/// Executes one kind of remediation action.
///
/// `execute` never fails outward: provider errors, timeouts and invalid
/// parameters come back as a failed [`RemediationResult`] with
/// `error_message` and `error_traceback` populated.
#[async_trait]
pub trait Remediator: Send + Sync {
    fn action_type(&self) -> ActionType;

    fn can_handle(&self, _incident: &Incident, plan: &RemediationPlan) -> bool {
        plan.action_type == self.action_type()
    }

    /// Check that everything `execute` needs can be resolved.
    fn validate_parameters(&self, _incident: &Incident, _plan: &RemediationPlan) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, incident: &Incident, plan: &RemediationPlan) -> RemediationResult;

    /// Rollback capability; `None` means rollback does not apply to this action.
    fn rollback_support(&self) -> Option<&dyn SupportsRollback> {
        None
    }
}

/// Undo (or stop) a previously executed remediation.
#[async_trait]
pub trait SupportsRollback: Send + Sync {
    /// Returns a description of what was rolled back.
    async fn rollback(&self, incident: &Incident, plan: &RemediationPlan) -> Result<String>;
}

/// Remediators keyed by the action type they execute.
#[derive(Clone, Default)]
pub struct RemediatorRegistry {
    remediators: HashMap<ActionType, Arc<dyn Remediator>>,
}

impl RemediatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `remediator`, replacing any previous one for its action type.
    pub fn register(&mut self, remediator: Arc<dyn Remediator>) -> Option<Arc<dyn Remediator>> {
        self.remediators.insert(remediator.action_type(), remediator)
    }

    pub fn with(mut self, remediator: Arc<dyn Remediator>) -> Self {
        self.register(remediator);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn Remediator>> {
        self.remediators.get(&action_type).cloned()
    }

    /// The remediator that will execute `plan` for `incident`.
    pub fn resolve(&self, incident: &Incident, plan: &RemediationPlan) -> Result<Arc<dyn Remediator>> {
        let remediator = self
            .get(plan.action_type)
            .ok_or(RemediationError::NoRemediator(plan.action_type))?;
        if !remediator.can_handle(incident, plan) {
            return Err(RemediationError::Unsupported {
                action_type: plan.action_type,
                incident_id: incident.id,
            });
        }
        Ok(remediator)
    }

    pub fn action_types(&self) -> Vec<ActionType> {
        let mut types: Vec<ActionType> = self.remediators.keys().copied().collect();
        types.sort_by_key(|t| t.to_string());
        types
    }

    pub fn len(&self) -> usize {
        self.remediators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remediators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IncidentSource;

    struct NoOp;

    #[async_trait]
    impl Remediator for NoOp {
        fn action_type(&self) -> ActionType {
            ActionType::NoOp
        }

        fn can_handle(&self, incident: &Incident, plan: &RemediationPlan) -> bool {
            plan.action_type == ActionType::NoOp && incident.source != IncidentSource::Jenkins
        }

        async fn execute(&self, _incident: &Incident, _plan: &RemediationPlan) -> RemediationResult {
            RemediationResult::success("nothing to do", vec!["noop".into()], 0.0)
        }
    }

    #[test]
    fn test_resolve_unregistered_action() {
        let registry = RemediatorRegistry::new();
        let incident = Incident::new(IncidentSource::Manual, "x");
        let plan = RemediationPlan::new(ActionType::RestartPod, "r");
        let err = registry.resolve(&incident, &plan).err().unwrap();
        assert!(matches!(err, RemediationError::NoRemediator(ActionType::RestartPod)));
    }

    #[test]
    fn test_resolve_respects_can_handle() {
        let registry = RemediatorRegistry::new().with(Arc::new(NoOp));
        let plan = RemediationPlan::new(ActionType::NoOp, "r");

        let manual = Incident::new(IncidentSource::Manual, "x");
        assert!(registry.resolve(&manual, &plan).is_ok());

        let jenkins = Incident::new(IncidentSource::Jenkins, "x");
        let err = registry.resolve(&jenkins, &plan).err().unwrap();
        assert!(matches!(err, RemediationError::Unsupported { .. }));
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = RemediatorRegistry::new();
        assert!(registry.register(Arc::new(NoOp)).is_none());
        assert!(registry.register(Arc::new(NoOp)).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.action_types(), vec![ActionType::NoOp]);
    }

    #[tokio::test]
    async fn test_default_rollback_support_is_none() {
        let remediator = NoOp;
        assert!(remediator.rollback_support().is_none());
        let incident = Incident::new(IncidentSource::Manual, "x");
        let plan = RemediationPlan::new(ActionType::NoOp, "r");
        assert!(remediator.execute(&incident, &plan).await.success);
    }
}
