//! Webhook and poll provider contracts.
//!
//! Trigger-capable adapters implement these boundary traits; the registry
//! resolves them by node class and hands them a context holding the bound
//! configuration, an authorizer, and the callback URL. Providers perform the
//! actual external registration calls.

use crate::error::ProviderError;
use async_trait::async_trait;
use flywheel_auth::Authorizer;
use flywheel_core::{NodeId, TriggerId, WorkflowId};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Classes whose webhook registration needs no credential.
///
/// Everything else must reference one; enabling fails otherwise.
const CREDENTIAL_OPTIONAL_CLASSES: &[&str] = &["incoming_webhook", "form", "inbound_email"];

/// Returns true when the class may register webhooks without a credential.
#[must_use]
pub fn credential_optional(class: &str) -> bool {
    CREDENTIAL_OPTIONAL_CLASSES.contains(&class)
}

/// Builds the callback URL for a trigger.
///
/// Shape: `{webhook_host}/hooks/{trigger_id}`, with an optional
/// provider-specific prefix (`{webhook_host}/salesforce/hooks/{trigger_id}`
/// for the one provider that needs its own ingress path).
#[must_use]
pub fn callback_url(webhook_host: &str, prefix: Option<&str>, trigger_id: TriggerId) -> String {
    let host = webhook_host.trim_end_matches('/');
    match prefix {
        Some(prefix) => format!("{host}/{prefix}/hooks/{trigger_id}"),
        None => format!("{host}/hooks/{trigger_id}"),
    }
}

/// Binds a node's untyped input fields into a provider config structure.
///
/// Unknown keys are ignored; missing required keys fail the bind.
///
/// # Errors
///
/// Returns an error describing the first decode failure.
pub fn bind_config<T: DeserializeOwned>(
    input_fields: &Map<String, JsonValue>,
) -> Result<T, ProviderError> {
    serde_json::from_value(JsonValue::Object(input_fields.clone())).map_err(|e| {
        ProviderError::InvalidConfig {
            reason: e.to_string(),
        }
    })
}

/// Context handed to provider calls.
#[derive(Clone)]
pub struct WebhookContext {
    /// The trigger being provisioned or torn down.
    pub trigger_id: TriggerId,
    /// The owning workflow.
    pub workflow_id: WorkflowId,
    /// The start node.
    pub node_id: NodeId,
    /// The node's raw input fields; providers bind these via [`bind_config`].
    pub input_fields: Map<String, JsonValue>,
    /// Where the third-party API should deliver events.
    pub callback_url: String,
    /// Authorizer for the node's credential, absent only for allow-listed
    /// classes.
    pub authorizer: Option<Arc<Authorizer>>,
    /// The trigger's stored data (resource identifiers from a prior enable).
    pub data: Map<String, JsonValue>,
}

/// External resources created by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookResources {
    /// Resource identifiers; fully replaces the trigger's stored data.
    pub data: Map<String, JsonValue>,
    /// Correlation ID some providers issue for event routing.
    pub query_id: Option<String>,
}

/// Webhook-capable provider: registers and removes callbacks on the remote
/// API.
#[async_trait]
pub trait WebhookProvider: Send + Sync {
    /// The class tag this provider serves.
    fn class(&self) -> &str;

    /// Callback-path prefix override for providers with dedicated ingress.
    fn callback_prefix(&self) -> Option<&str> {
        None
    }

    /// Registers the webhook on the remote API.
    ///
    /// # Errors
    ///
    /// [`ProviderError::TokenUnauthorized`] when the credential is rejected;
    /// any other error aborts the enable.
    async fn create(&self, ctx: &WebhookContext) -> Result<WebhookResources, ProviderError>;

    /// Removes the webhook from the remote API.
    ///
    /// # Errors
    ///
    /// [`ProviderError::ResourceMissing`] when the remote resource is
    /// already gone; the registry treats that as success.
    async fn delete(&self, ctx: &WebhookContext) -> Result<(), ProviderError>;
}

/// Poll-capable provider: registers a polling subscription and serves
/// sample listings.
#[async_trait]
pub trait PollProvider: Send + Sync {
    /// The class tag this provider serves.
    fn class(&self) -> &str;

    /// Performs the initial remote resource registration.
    async fn register(&self, ctx: &WebhookContext) -> Result<WebhookResources, ProviderError>;

    /// Fetches a sample listing from the remote API.
    async fn sample_list(&self, ctx: &WebhookContext) -> Result<Vec<JsonValue>, ProviderError>;
}

/// Registry mapping class tags to trigger-capable providers.
///
/// Populated once at process start.
#[derive(Default)]
pub struct ProviderRegistry {
    webhooks: HashMap<String, Arc<dyn WebhookProvider>>,
    polls: HashMap<String, Arc<dyn PollProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a webhook provider.
    pub fn register_webhook(&mut self, provider: Arc<dyn WebhookProvider>) {
        self.webhooks.insert(provider.class().to_string(), provider);
    }

    /// Registers a poll provider.
    pub fn register_poll(&mut self, provider: Arc<dyn PollProvider>) {
        self.polls.insert(provider.class().to_string(), provider);
    }

    /// Resolves a webhook provider by class.
    ///
    /// # Errors
    ///
    /// Returns an error when no provider is registered for the class.
    pub fn webhook(&self, class: &str) -> Result<Arc<dyn WebhookProvider>, ProviderError> {
        self.webhooks
            .get(class)
            .cloned()
            .ok_or_else(|| ProviderError::NotRegistered {
                class: class.to_string(),
            })
    }

    /// Resolves a poll provider by class.
    ///
    /// # Errors
    ///
    /// Returns an error when no provider is registered for the class.
    pub fn poll(&self, class: &str) -> Result<Arc<dyn PollProvider>, ProviderError> {
        self.polls
            .get(class)
            .cloned()
            .ok_or_else(|| ProviderError::NotRegistered {
                class: class.to_string(),
            })
    }
}
