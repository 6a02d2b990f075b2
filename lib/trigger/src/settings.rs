//! Trigger registry configuration.

use serde::Deserialize;
use std::path::Path;

/// Tunables for trigger provisioning.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    /// Public base URL webhook callbacks are synthesized under.
    #[serde(default = "default_webhook_host")]
    pub webhook_host: String,

    /// Base URL of the external job scheduler.
    #[serde(default = "default_scheduler_url")]
    pub scheduler_url: String,

    /// Tag pinning scheduler jobs to one cluster node.
    #[serde(default = "default_scheduler_pin_tag")]
    pub scheduler_pin_tag: String,

    /// Retry count applied by the scheduler to failed callbacks.
    #[serde(default = "default_scheduler_retries")]
    pub scheduler_retries: u32,
}

fn default_webhook_host() -> String {
    "http://localhost:8080".to_string()
}

fn default_scheduler_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_scheduler_pin_tag() -> String {
    "engine".to_string()
}

fn default_scheduler_retries() -> u32 {
    3
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            webhook_host: default_webhook_host(),
            scheduler_url: default_scheduler_url(),
            scheduler_pin_tag: default_scheduler_pin_tag(),
            scheduler_retries: default_scheduler_retries(),
        }
    }
}

impl RegistrySettings {
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

    /// Loads settings from a configuration file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or invalid.
    pub fn from_file(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
