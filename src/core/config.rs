use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::errors::{DagError, Result};
use crate::dag_flow::retry::RetryStrategy;

/// Configuration for orchestrator execution behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-attempt timeout used when a node does not configure one
    pub default_timeout_secs: f64,
    /// Upper bound for any per-attempt timeout, configured or default
    pub max_timeout_secs: f64,
    /// Backoff between attempts of the same node
    pub retry_strategy: RetryStrategy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30.0,
            max_timeout_secs: 86_400.0, // 24 hours
            retry_strategy: RetryStrategy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Validates configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.default_timeout_secs.is_finite() && self.default_timeout_secs > 0.0) {
            return Err(DagError::configuration(
                "default_timeout_secs must be greater than 0",
            ));
        }
        if !(self.max_timeout_secs.is_finite() && self.max_timeout_secs > 0.0) {
            return Err(DagError::configuration(
                "max_timeout_secs must be greater than 0",
            ));
        }
        if self.default_timeout_secs > self.max_timeout_secs {
            return Err(DagError::configuration(
                "default_timeout_secs cannot exceed max_timeout_secs",
            ));
        }
        self.retry_strategy.validate()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Resolve a node's configured timeout. Missing, non-positive or
    /// non-finite values fall back to the default; everything is capped at
    /// `max_timeout_secs`.
    pub fn effective_timeout(&self, configured: Option<f64>) -> Duration {
        let secs = match configured {
            Some(secs) if secs.is_finite() && secs > 0.0 => secs,
            _ => self.default_timeout_secs,
        };
        let secs = secs.min(self.max_timeout_secs);
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
