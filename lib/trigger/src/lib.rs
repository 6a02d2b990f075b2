//! Trigger lifecycle management for the flywheel platform.
//!
//! This crate provides:
//!
//! - **Trigger model**: one trigger per workflow start node, with an
//!   explicit enabled/disabled state machine and opaque external-resource
//!   data
//! - **Cron derivation**: high-level schedule shorthands validated and
//!   lowered to 6-field cron expressions
//! - **Scheduler client**: the HTTP job-scheduler boundary with idempotent
//!   deletes
//! - **Provider contracts**: webhook/poll registration against third-party
//!   APIs
//! - **Registry**: enable/disable dispatch keeping external state consistent
//!   with the model
//! - **Lifecycle**: workflow enable/disable orchestration behind the
//!   activation gate

pub mod cron;
pub mod error;
pub mod lifecycle;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod trigger;

pub use cron::{CronTriggerConfig, parse_time_in_day};
pub use error::{CronError, LifecycleError, ProviderError, SchedulerError, TriggerError};
pub use lifecycle::WorkflowLifecycle;
pub use provider::{
    PollProvider, ProviderRegistry, WebhookContext, WebhookProvider, WebhookResources,
    bind_config, callback_url, credential_optional,
};
pub use registry::TriggerRegistry;
pub use scheduler::{HttpExecutorConfig, HttpSchedulerClient, SchedulerApi, SchedulerJob};
pub use settings::RegistrySettings;
pub use trigger::{MemoryTriggerStore, Trigger, TriggerKind, TriggerStatus, TriggerStore};
