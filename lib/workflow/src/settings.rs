//! Engine configuration.
//!
//! Strongly-typed settings loaded via the `config` crate from environment
//! variables, with serde defaults for every tunable.

use serde::Deserialize;
use std::time::Duration;

/// Tunables for the execution engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Upper bound on executed steps per run; exceeding it is fatal.
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,

    /// Bound on manual "run node" test invocations, in seconds.
    #[serde(default = "default_manual_run_timeout_seconds")]
    pub manual_run_timeout_seconds: u64,
}

fn default_step_budget() -> usize {
    100
}

fn default_manual_run_timeout_seconds() -> u64 {
    20
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            manual_run_timeout_seconds: default_manual_run_timeout_seconds(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if present configuration is invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the manual-run timeout as a duration.
    #[must_use]
    pub fn manual_run_timeout(&self) -> Duration {
        Duration::from_secs(self.manual_run_timeout_seconds)
    }
}
