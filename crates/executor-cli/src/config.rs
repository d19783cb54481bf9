//! `Executor.toml` loading.
//!
//! ```toml
//! [engine]
//! max_retries = 3
//! dispatch_timeout_secs = 60
//!
//! [demo]
//! stages = ["JobPath", "JobSanity", "InputData", "JobScheduling"]
//! tasks = 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use executor_core::EngineConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG: &str = "Executor.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub engine: EngineConfig,
    pub demo: DemoConfig,
}

/// In-process workers and synthetic load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Stage chain every task walks through, in order.
    pub stages: Vec<String>,
    pub workers_per_stage: usize,
    /// Slots advertised by each worker.
    pub worker_capacity: usize,
    pub tasks: usize,
    /// Probability that a handler run fails (0.0 - 1.0).
    pub failure_rate: f64,
    /// Simulated work per handler run.
    pub handler_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            stages: ["JobPath", "JobSanity", "InputData", "JobScheduling"]
                .map(String::from)
                .to_vec(),
            workers_per_stage: 2,
            worker_capacity: 2,
            tasks: 20,
            failure_rate: 0.1,
            handler_delay_ms: 20,
        }
    }
}

impl ConfigFile {
    pub fn validate(&self) -> Result<()> {
        self.engine.validate().context("invalid [engine] section")?;
        if self.demo.stages.is_empty() {
            bail!("[demo].stages must name at least one stage");
        }
        if self.demo.workers_per_stage == 0 || self.demo.worker_capacity == 0 {
            bail!("[demo].workers_per_stage and [demo].worker_capacity must be > 0");
        }
        if !(0.0..=1.0).contains(&self.demo.failure_rate) {
            bail!(
                "[demo].failure_rate must be within 0.0..=1.0, got {}",
                self.demo.failure_rate
            );
        }
        Ok(())
    }
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading config file at {path:?}"))?;

    let config: ConfigFile =
        toml::from_str(&contents).with_context(|| format!("parsing TOML config from {path:?}"))?;

    Ok(config)
}

/// An explicit path must exist; the default one is optional.
pub fn load(explicit: Option<&Path>) -> Result<ConfigFile> {
    match explicit {
        Some(path) => load_from_path(path),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG);
            if path.exists() {
                load_from_path(path)
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_uses_defaults() {
        let config: ConfigFile = toml::from_str(
            r#"
            [engine]
            max_retries = 1

            [demo]
            tasks = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_retries, 1);
        assert_eq!(config.engine.sweep_interval_secs, 30);
        assert_eq!(config.demo.tasks, 3);
        assert_eq!(config.demo.stages.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_demo_values() {
        let mut config = ConfigFile::default();
        config.demo.failure_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.demo.stages.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load(Some(Path::new("does/not/exist.toml"))).is_err());
    }
}
