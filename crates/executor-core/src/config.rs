//! Engine configuration.
//!
//! Deserialized from the `[engine]` table of the service config file; every
//! field has a default so a partial table is fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("freeze_multiplier must be a finite number >= 1.0, got {0}")]
    Multiplier(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Failures or timeouts tolerated per task before it fails for good.
    pub max_retries: u32,

    /// How long a dispatched task may go without a report.
    pub dispatch_timeout_secs: u64,

    /// Period of the timeout sweeper.
    pub sweep_interval_secs: u64,

    /// Freeze time after the first failure (0 = requeue right away).
    pub freeze_base_delay_ms: u64,

    pub freeze_multiplier: f64,

    pub freeze_max_delay_secs: u64,

    /// Requeue retried tasks at the head of their stage queue.
    pub retry_ahead: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            dispatch_timeout_secs: 300,
            sweep_interval_secs: 30,
            freeze_base_delay_ms: 0,
            freeze_multiplier: 2.0,
            freeze_max_delay_secs: 600,
            retry_ahead: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "dispatch_timeout_secs",
            });
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Zero {
                field: "sweep_interval_secs",
            });
        }
        if !self.freeze_multiplier.is_finite() || self.freeze_multiplier < 1.0 {
            return Err(ConfigError::Multiplier(self.freeze_multiplier));
        }
        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = EngineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let c: EngineConfig = serde_json::from_str(r#"{ "max_retries": 2 }"#).unwrap();
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.dispatch_timeout_secs, 300);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let c = EngineConfig {
            sweep_interval_secs: 0,
            ..EngineConfig::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigError::Zero {
                field: "sweep_interval_secs"
            })
        );

        let c = EngineConfig {
            freeze_multiplier: 0.5,
            ..EngineConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::Multiplier(0.5)));
    }
}
