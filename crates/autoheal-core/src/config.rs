//! Engine configuration.
//!
//! Loaded from TOML, then optionally overridden from `AUTOHEAL_*`
//! environment variables. Every section falls back to its defaults.
//!
//! ```toml
//! [blast_radius]
//! window_seconds = 600
//! max_attempts_per_window = 10
//!
//! [blacklist]
//! services = ["payments"]
//!
//! [validation]
//! max_auto_risk = "medium"
//!
//! [rerun]
//! timeout_seconds = 900
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::blast_radius::{BlastRadiusConfig, MAX_WINDOW_SECONDS};
use crate::domain::{RemediationError, Result, RiskLevel};
use crate::remediator::{RerunDefaults, MAX_TIMEOUT_SECONDS};
use crate::rules::BlacklistConfig;
use crate::validators::ValidationConfig;

pub const ENV_BLAST_WINDOW_SECS: &str = "AUTOHEAL_BLAST_WINDOW_SECS";
pub const ENV_BLAST_MAX_ATTEMPTS: &str = "AUTOHEAL_BLAST_MAX_ATTEMPTS";
pub const ENV_BLAST_MAX_CONCURRENT: &str = "AUTOHEAL_BLAST_MAX_CONCURRENT";
pub const ENV_BLACKLIST_SERVICES: &str = "AUTOHEAL_BLACKLIST_SERVICES";
pub const ENV_BLACKLIST_NAMESPACES: &str = "AUTOHEAL_BLACKLIST_NAMESPACES";
pub const ENV_BLACKLIST_REPOSITORIES: &str = "AUTOHEAL_BLACKLIST_REPOSITORIES";
pub const ENV_MIN_CONFIDENCE: &str = "AUTOHEAL_MIN_CONFIDENCE";
pub const ENV_MAX_AUTO_RISK: &str = "AUTOHEAL_MAX_AUTO_RISK";

/// Full engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub blast_radius: BlastRadiusConfig,
    pub blacklist: BlacklistConfig,
    pub validation: ValidationConfig,
    pub rerun: RerunDefaults,
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| RemediationError::Config(format!("{key}: cannot parse '{raw}'")))
}

fn parse_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_risk(raw: &str) -> Result<RiskLevel> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" => Ok(RiskLevel::Low),
        "medium" => Ok(RiskLevel::Medium),
        "high" => Ok(RiskLevel::High),
        "critical" => Ok(RiskLevel::Critical),
        other => Err(RemediationError::Config(format!(
            "{ENV_MAX_AUTO_RISK}: unknown risk level '{other}'"
        ))),
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| RemediationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `AUTOHEAL_*` overrides looked up through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_BLAST_WINDOW_SECS) {
            self.blast_radius.window_seconds = parse(ENV_BLAST_WINDOW_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BLAST_MAX_ATTEMPTS) {
            self.blast_radius.max_attempts_per_window = parse(ENV_BLAST_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BLAST_MAX_CONCURRENT) {
            self.blast_radius.max_concurrent_per_target = parse(ENV_BLAST_MAX_CONCURRENT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BLACKLIST_SERVICES) {
            self.blacklist.services.extend(parse_list(&raw));
        }
        if let Some(raw) = lookup(ENV_BLACKLIST_NAMESPACES) {
            self.blacklist.namespaces.extend(parse_list(&raw));
        }
        if let Some(raw) = lookup(ENV_BLACKLIST_REPOSITORIES) {
            self.blacklist.repositories.extend(parse_list(&raw));
        }
        if let Some(raw) = lookup(ENV_MIN_CONFIDENCE) {
            self.validation.min_confidence = parse(ENV_MIN_CONFIDENCE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_AUTO_RISK) {
            self.validation.max_auto_risk = parse_risk(&raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.blast_radius.window_seconds == 0 {
            return Err(RemediationError::Config(
                "blast_radius.window_seconds must be greater than zero".into(),
            ));
        }
        if self.blast_radius.window_seconds > MAX_WINDOW_SECONDS {
            return Err(RemediationError::Config(format!(
                "blast_radius.window_seconds must be at most {MAX_WINDOW_SECONDS}, got {}",
                self.blast_radius.window_seconds
            )));
        }
        if self.rerun.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(RemediationError::Config(format!(
                "rerun.timeout_seconds must be at most {MAX_TIMEOUT_SECONDS}, got {}",
                self.rerun.timeout_seconds
            )));
        }
        if !(0.0..=1.0).contains(&self.validation.min_confidence) {
            return Err(RemediationError::Config(format!(
                "validation.min_confidence must be within [0, 1], got {}",
                self.validation.min_confidence
            )));
        }
        if self.validation.duration_tolerance <= 0.0 {
            return Err(RemediationError::Config(
                "validation.duration_tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}
