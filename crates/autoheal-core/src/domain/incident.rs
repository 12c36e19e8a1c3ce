//! Incidents as handed over by the detection and analysis pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Where an incident was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSource {
    Github,
    Gitlab,
    Kubernetes,
    Argocd,
    Jenkins,
    Manual,
    Other,
}

impl std::fmt::Display for IncidentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Github => write!(f, "github"),
            Self::Gitlab => write!(f, "gitlab"),
            Self::Kubernetes => write!(f, "kubernetes"),
            Self::Argocd => write!(f, "argocd"),
            Self::Jenkins => write!(f, "jenkins"),
            Self::Manual => write!(f, "manual"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

const SERVICE_KEYS: &[&str] = &["service", "service_name", "app"];
const NAMESPACE_KEYS: &[&str] = &["namespace", "k8s_namespace"];
const REPOSITORY_KEYS: &[&str] = &["repository", "repo", "repository_name", "repo_name"];

/// A detected CI/CD failure event. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub source: IncidentSource,
    pub severity: Severity,
    pub failure_type: String,
    /// Free-form detection context (service, namespace, repository, run ids, ...).
    #[serde(default)]
    pub context: Map<String, Value>,
    /// The original provider event, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
    /// Detection confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

impl Incident {
    pub fn new(source: IncidentSource, failure_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            severity: Severity::Medium,
            failure_type: failure_type.into(),
            context: Map::new(),
            raw_payload: None,
            confidence: 1.0,
            detected_at: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_raw_payload(mut self, payload: Value) -> Self {
        self.raw_payload = Some(payload);
        self
    }

    /// First non-empty string found under any of `keys`, in order.
    pub fn context_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.context.get(*k))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    pub fn service(&self) -> Option<&str> {
        self.context_str(SERVICE_KEYS)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.context_str(NAMESPACE_KEYS)
    }

    pub fn repository(&self) -> Option<&str> {
        self.context_str(REPOSITORY_KEYS)
    }
}

/// Opaque output of the upstream root-cause analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub root_cause: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub details: Value,
}
