//! The trigger registry: enable/disable lifecycle per trigger kind.
//!
//! Enabling provisions external resources (webhook registrations, scheduler
//! jobs, polling subscriptions); disabling tears them down. External calls
//! are ordered before local persistence: a failed commit leaves the external
//! system in a state a retry can reconcile, and teardown is idempotent so a
//! retried disable never errors on already-absent resources.

use crate::cron::CronTriggerConfig;
use crate::error::{ProviderError, TriggerError};
use crate::provider::{ProviderRegistry, WebhookContext, callback_url, credential_optional};
use crate::scheduler::{SchedulerApi, SchedulerJob};
use crate::settings::RegistrySettings;
use crate::trigger::{Trigger, TriggerKind, TriggerStatus, TriggerStore};
use flywheel_auth::{Authorizer, AuthorizerResolver};
use flywheel_core::TriggerId;
use flywheel_workflow::Node;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{info, warn};

/// Orchestrates trigger provisioning against external systems.
pub struct TriggerRegistry {
    providers: Arc<ProviderRegistry>,
    scheduler: Arc<dyn SchedulerApi>,
    resolver: Arc<dyn AuthorizerResolver>,
    triggers: Arc<dyn TriggerStore>,
    settings: RegistrySettings,
}

impl TriggerRegistry {
    /// Creates a registry over the given collaborators.
    #[must_use]
    pub fn new(
        providers: Arc<ProviderRegistry>,
        scheduler: Arc<dyn SchedulerApi>,
        resolver: Arc<dyn AuthorizerResolver>,
        triggers: Arc<dyn TriggerStore>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            providers,
            scheduler,
            resolver,
            triggers,
            settings,
        }
    }

    /// Enables a trigger, provisioning its external resources.
    ///
    /// Idempotent: enabling an already-enabled trigger is a no-op.
    ///
    /// # Errors
    ///
    /// Configuration errors are rejected before any external call;
    /// external-system errors abort the transition (the local status is not
    /// changed). A webhook provider reporting a rejected credential is
    /// downgraded to a warning and does not block enabling.
    pub async fn enable(&self, trigger_id: TriggerId, node: &Node) -> Result<Trigger, TriggerError> {
        let mut trigger = self.triggers.get(trigger_id).await?;
        if trigger.status == TriggerStatus::Enabled {
            return Ok(trigger);
        }

        match trigger.kind {
            TriggerKind::Webhook => self.enable_webhook(&mut trigger, node).await?,
            TriggerKind::Cron => self.enable_cron(&mut trigger, node).await?,
            TriggerKind::Poll => self.enable_poll(&mut trigger, node).await?,
        }

        trigger.status = TriggerStatus::Enabled;
        trigger.touch();
        self.triggers.update(trigger.clone()).await?;
        info!(trigger = %trigger.id, kind = ?trigger.kind, "trigger enabled");
        Ok(trigger)
    }

    /// Disables a trigger, tearing down its external resources.
    ///
    /// Idempotent: disabling an already-disabled trigger is a no-op, and
    /// already-absent external resources are treated as success.
    ///
    /// # Errors
    ///
    /// External-system errors (other than absence) abort the transition.
    pub async fn disable(
        &self,
        trigger_id: TriggerId,
        node: &Node,
    ) -> Result<Trigger, TriggerError> {
        let mut trigger = self.triggers.get(trigger_id).await?;
        if trigger.status == TriggerStatus::Disabled {
            return Ok(trigger);
        }

        match trigger.kind {
            TriggerKind::Webhook => self.disable_webhook(&trigger, node).await?,
            TriggerKind::Cron => {
                self.scheduler.delete_job(&trigger.id.to_string()).await?;
                trigger.data = Map::new();
            }
            TriggerKind::Poll => {
                trigger.data = Map::new();
            }
        }

        trigger.status = TriggerStatus::Disabled;
        trigger.touch();
        self.triggers.update(trigger.clone()).await?;
        info!(trigger = %trigger.id, kind = ?trigger.kind, "trigger disabled");
        Ok(trigger)
    }

    /// Tears a trigger down and deletes it.
    ///
    /// Used when the start node itself is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error when teardown or deletion fails.
    pub async fn remove(&self, trigger_id: TriggerId, node: &Node) -> Result<(), TriggerError> {
        self.disable(trigger_id, node).await?;
        self.triggers.delete(trigger_id).await
    }

    async fn enable_webhook(
        &self,
        trigger: &mut Trigger,
        node: &Node,
    ) -> Result<(), TriggerError> {
        let provider = self.providers.webhook(node.class.as_str())?;
        let authorizer = self
            .authorizer_for(node, credential_optional(node.class.as_str()))
            .await?;
        let ctx = self.context(trigger, node, provider.callback_prefix(), authorizer);

        match provider.create(&ctx).await {
            Ok(resources) => {
                trigger.data = resources.data;
                trigger.query_id = resources.query_id;
                Ok(())
            }
            Err(ProviderError::TokenUnauthorized) => {
                // Expected to self-heal once the credential is repaired;
                // the trigger is still considered enabled.
                warn!(
                    trigger = %trigger.id,
                    class = %node.class,
                    "webhook registration skipped: credential rejected by remote API"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn disable_webhook(&self, trigger: &Trigger, node: &Node) -> Result<(), TriggerError> {
        let provider = self.providers.webhook(node.class.as_str())?;
        let authorizer = self
            .authorizer_for(node, credential_optional(node.class.as_str()))
            .await?;
        let ctx = self.context(trigger, node, provider.callback_prefix(), authorizer);

        match provider.delete(&ctx).await {
            Ok(()) | Err(ProviderError::ResourceMissing) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn enable_cron(&self, trigger: &mut Trigger, node: &Node) -> Result<(), TriggerError> {
        // Validation happens entirely before the scheduler call.
        let config = CronTriggerConfig::from_input_fields(&node.input_fields)?;
        let expression = config.expression()?;

        let job = SchedulerJob::for_trigger(
            &trigger.id.to_string(),
            expression,
            config.timezone,
            callback_url(&self.settings.webhook_host, None, trigger.id),
            &JsonValue::Object(node.input_fields.clone()),
            &self.settings,
        );
        self.scheduler.upsert_job(&job).await?;

        let mut data = Map::new();
        data.insert("job_name".to_string(), JsonValue::String(job.name));
        trigger.data = data;
        Ok(())
    }

    async fn enable_poll(&self, trigger: &mut Trigger, node: &Node) -> Result<(), TriggerError> {
        let provider = self.providers.poll(node.class.as_str())?;
        // Poll sources always query the remote API; a credential is
        // mandatory.
        let authorizer = self.authorizer_for(node, false).await?;
        let ctx = self.context(trigger, node, None, authorizer);

        let resources = provider.register(&ctx).await?;
        trigger.data = resources.data;
        trigger.query_id = resources.query_id;
        Ok(())
    }

    async fn authorizer_for(
        &self,
        node: &Node,
        optional: bool,
    ) -> Result<Option<Arc<Authorizer>>, TriggerError> {
        match node.credential_id {
            Some(credential_id) => {
                let authorizer = self.resolver.resolve(credential_id).await?;
                Ok(Some(Arc::new(authorizer)))
            }
            None if optional => Ok(None),
            None => Err(TriggerError::CredentialRequired { node_id: node.id }),
        }
    }

    fn context(
        &self,
        trigger: &Trigger,
        node: &Node,
        prefix: Option<&str>,
        authorizer: Option<Arc<Authorizer>>,
    ) -> WebhookContext {
        WebhookContext {
            trigger_id: trigger.id,
            workflow_id: trigger.workflow_id,
            node_id: node.id,
            input_fields: node.input_fields.clone(),
            callback_url: callback_url(&self.settings.webhook_host, prefix, trigger.id),
            authorizer,
            data: trigger.data.clone(),
        }
    }
}
