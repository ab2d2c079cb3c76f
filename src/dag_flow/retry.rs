//! Backoff between node attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::errors::{DagError, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Exponential backoff with configurable parameters
    Exponential {
        initial_delay_secs: f64,
        max_delay_secs: f64,
        multiplier: f64,
    },
    /// Exponential backoff with ±10% jitter, capped at `max_delay_secs`
    ExponentialJitter {
        initial_delay_secs: f64,
        max_delay_secs: f64,
        multiplier: f64,
    },
    /// Same delay before every retry
    Fixed { delay_secs: f64 },
    /// No delay between retries
    Immediate,
}

/// Upper bound accepted for any single backoff delay (24 hours)
pub const MAX_DELAY_SECS: f64 = 86_400.0;

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_secs: 0.5,
            max_delay_secs: 3.0,
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// Delay to wait before retry number `retry` (the first retry is 1).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = match self {
            Self::Exponential {
                initial_delay_secs,
                max_delay_secs,
                multiplier,
            } => (initial_delay_secs * multiplier.powi(exponent)).min(*max_delay_secs),
            Self::ExponentialJitter {
                initial_delay_secs,
                max_delay_secs,
                multiplier,
            } => {
                let delay = initial_delay_secs * multiplier.powi(exponent);
                let jitter = fastrand::f64() * 0.2 - 0.1;
                (delay * (1.0 + jitter)).min(*max_delay_secs)
            }
            Self::Fixed { delay_secs } => *delay_secs,
            Self::Immediate => 0.0,
        };

        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs.min(MAX_DELAY_SECS)).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Exponential {
                initial_delay_secs,
                max_delay_secs,
                multiplier,
            }
            | Self::ExponentialJitter {
                initial_delay_secs,
                max_delay_secs,
                multiplier,
            } => {
                if !(initial_delay_secs.is_finite() && *initial_delay_secs >= 0.0) {
                    return Err(DagError::configuration(
                        "retry initial_delay_secs must be a non-negative number",
                    ));
                }
                if !(max_delay_secs.is_finite() && *max_delay_secs >= 0.0) {
                    return Err(DagError::configuration(
                        "retry max_delay_secs must be a non-negative number",
                    ));
                }
                if *max_delay_secs > MAX_DELAY_SECS {
                    return Err(DagError::configuration(format!(
                        "retry max_delay_secs cannot exceed {MAX_DELAY_SECS}"
                    )));
                }
                if initial_delay_secs > max_delay_secs {
                    return Err(DagError::configuration(
                        "retry initial_delay_secs cannot exceed max_delay_secs",
                    ));
                }
                if !(multiplier.is_finite() && *multiplier >= 1.0) {
                    return Err(DagError::configuration(
                        "retry multiplier must be >= 1.0",
                    ));
                }
                Ok(())
            }
            Self::Fixed { delay_secs } => {
                if !(delay_secs.is_finite() && *delay_secs >= 0.0) {
                    return Err(DagError::configuration(
                        "retry delay_secs must be a non-negative number",
                    ));
                }
                if *delay_secs > MAX_DELAY_SECS {
                    return Err(DagError::configuration(format!(
                        "retry delay_secs cannot exceed {MAX_DELAY_SECS}"
                    )));
                }
                Ok(())
            }
            Self::Immediate => Ok(()),
        }
    }
}
