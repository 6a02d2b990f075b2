//! The external job-scheduler boundary.
//!
//! Cron triggers are provisioned as HTTP-callback jobs on an external
//! scheduler, addressed by trigger ID. Jobs are pinned to exactly one
//! scheduler node via tags (avoiding duplicate fan-out in a cluster) and
//! retried by the scheduler itself. A 404 on delete means "already absent"
//! and is success, so teardown is idempotent.

use crate::error::SchedulerError;
use crate::settings::RegistrySettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// HTTP callback description inside a scheduler job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpExecutorConfig {
    /// HTTP method of the callback.
    pub method: String,
    /// Callback URL.
    pub url: String,
    /// Headers sent with the callback.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: String,
    /// Status code the scheduler treats as success.
    pub expect_code: u16,
}

/// A job on the external scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerJob {
    /// Job name; the trigger ID.
    pub name: String,
    /// 6-field cron expression.
    pub schedule: String,
    /// Timezone the schedule is evaluated in.
    pub timezone: String,
    /// Executor kind; always "http" here.
    pub executor: String,
    /// The HTTP callback description.
    pub executor_config: HttpExecutorConfig,
    /// Tags pinning execution to one scheduler node.
    pub tags: HashMap<String, String>,
    /// Retry count applied by the scheduler.
    pub retries: u32,
}

impl SchedulerJob {
    /// Builds the job for a cron trigger.
    ///
    /// The callback posts the serialized node input to the trigger's hook
    /// URL; a count suffix on the pin tag makes the scheduler run the job on
    /// exactly one node of the cluster.
    #[must_use]
    pub fn for_trigger(
        trigger_id: &str,
        schedule: String,
        timezone: String,
        callback_url: String,
        payload: &JsonValue,
        settings: &RegistrySettings,
    ) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Self {
            name: trigger_id.to_string(),
            schedule,
            timezone,
            executor: "http".to_string(),
            executor_config: HttpExecutorConfig {
                method: "POST".to_string(),
                url: callback_url,
                headers,
                body: payload.to_string(),
                expect_code: 200,
            },
            tags: HashMap::from([(
                "node".to_string(),
                format!("{}:1", settings.scheduler_pin_tag),
            )]),
            retries: settings.scheduler_retries,
        }
    }
}

/// The scheduler protocol.
#[async_trait]
pub trait SchedulerApi: Send + Sync {
    /// Creates or replaces a job.
    async fn upsert_job(&self, job: &SchedulerJob) -> Result<(), SchedulerError>;

    /// Deletes a job by name; an absent job is success.
    async fn delete_job(&self, name: &str) -> Result<(), SchedulerError>;

    /// Toggles a job's enabled state.
    async fn toggle_job(&self, name: &str) -> Result<(), SchedulerError>;

    /// Runs a job immediately.
    async fn run_job(&self, name: &str) -> Result<(), SchedulerError>;
}

/// HTTP client for the scheduler API.
pub struct HttpSchedulerClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSchedulerClient {
    /// Creates a client against the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn job_url(&self, name: &str) -> String {
        format!("{}/v1/jobs/{name}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<(), SchedulerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SchedulerError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SchedulerApi for HttpSchedulerClient {
    async fn upsert_job(&self, job: &SchedulerJob) -> Result<(), SchedulerError> {
        let response = self
            .client
            .post(format!("{}/v1/jobs", self.base_url))
            .json(job)
            .send()
            .await
            .map_err(|e| SchedulerError::Unreachable {
                reason: e.to_string(),
            })?;
        Self::check(response).await
    }

    async fn delete_job(&self, name: &str) -> Result<(), SchedulerError> {
        let response = self
            .client
            .delete(self.job_url(name))
            .send()
            .await
            .map_err(|e| SchedulerError::Unreachable {
                reason: e.to_string(),
            })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await
    }

    async fn toggle_job(&self, name: &str) -> Result<(), SchedulerError> {
        let response = self
            .client
            .post(format!("{}/toggle", self.job_url(name)))
            .send()
            .await
            .map_err(|e| SchedulerError::Unreachable {
                reason: e.to_string(),
            })?;
        Self::check(response).await
    }

    async fn run_job(&self, name: &str) -> Result<(), SchedulerError> {
        let response = self
            .client
            .post(format!("{}/run", self.job_url(name)))
            .send()
            .await
            .map_err(|e| SchedulerError::Unreachable {
                reason: e.to_string(),
            })?;
        Self::check(response).await
    }
}
