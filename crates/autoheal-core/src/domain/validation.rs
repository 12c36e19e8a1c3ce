//! Validation check results shared by pre/post validators and the blast-radius limiter.

use serde::{Deserialize, Serialize};

/// How much a failed check matters.
///
/// Failed `Info`/`Warning` checks are recorded but never block; `Error` and
/// `Critical` failures fail the whole validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl CheckSeverity {
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

/// Outcome of one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub severity: CheckSeverity,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            severity: CheckSeverity::Info,
        }
    }

    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        severity: CheckSeverity,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            severity,
        }
    }

    /// A failure that blocks the validation it belongs to.
    pub fn is_blocking(&self) -> bool {
        !self.passed && self.severity.is_blocking()
    }
}

/// Ordered battery of check results. Never mutated after it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub message: String,
    pub checks: Vec<CheckResult>,
}

impl ValidationResult {
    /// Fold `checks` into a result for the named stage.
    pub fn from_checks(stage: &str, checks: Vec<CheckResult>) -> Self {
        let blocking: Vec<&str> = checks
            .iter()
            .filter(|c| c.is_blocking())
            .map(|c| c.name.as_str())
            .collect();
        let warnings = checks.iter().filter(|c| !c.passed).count() - blocking.len();

        let (passed, message) = if !blocking.is_empty() {
            (
                false,
                format!("{stage} failed: [{}]", blocking.join(", ")),
            )
        } else if warnings > 0 {
            (
                true,
                format!(
                    "{stage} passed with {warnings} warning(s) ({} check(s))",
                    checks.len()
                ),
            )
        } else {
            (
                true,
                format!("{stage} passed ({} check(s))", checks.len()),
            )
        };

        Self {
            passed,
            message,
            checks,
        }
    }

    /// Look up a check by name.
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Messages of the checks that blocked this validation.
    pub fn blocking_reasons(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.is_blocking())
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_passing_checks_pass() {
        let result = ValidationResult::from_checks(
            "pre_validation",
            vec![CheckResult::pass("a", "ok"), CheckResult::pass("b", "ok")],
        );
        assert!(result.passed);
        assert!(result.message.contains("2 check(s)"));
    }

    #[test]
    fn test_warning_does_not_block() {
        let result = ValidationResult::from_checks(
            "pre_validation",
            vec![
                CheckResult::pass("a", "ok"),
                CheckResult::fail("confidence", "low", CheckSeverity::Warning),
            ],
        );
        assert!(result.passed);
        assert!(result.message.contains("1 warning"));
        assert_eq!(result.failed_checks().count(), 1);
        assert!(result.blocking_reasons().is_empty());
    }

    #[test]
    fn test_error_blocks_and_names_the_check() {
        let result = ValidationResult::from_checks(
            "blast_radius",
            vec![
                CheckResult::fail("attempts_in_window", "too many", CheckSeverity::Critical),
                CheckResult::pass("concurrent_executions", "ok"),
            ],
        );
        assert!(!result.passed);
        assert!(result.message.contains("attempts_in_window"));
        assert_eq!(
            result.blocking_reasons(),
            vec!["attempts_in_window: too many".to_string()]
        );
        assert!(result.check("concurrent_executions").unwrap().passed);
    }
}
