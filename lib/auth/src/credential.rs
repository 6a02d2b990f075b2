//! Credential model and storage boundary.
//!
//! A credential belongs to exactly one user-or-organization owner. Nodes
//! reference credentials by ID but do not own them; many nodes may share one
//! credential. The `data` field is an opaque sealed envelope (see
//! [`crate::cipher`]) decrypted only inside an authorizer.

use crate::error::CredentialError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flywheel_core::{CredentialId, OrganizationId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// The kind of credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// A static access token supplied by the user.
    AccessToken,
    /// Legacy OAuth 2.0 flow: refresh handled per access-token request.
    Oauth2,
    /// Current OAuth flow: metadata regenerated under a named lock.
    Oauth,
    /// Custom credential format; adapters interpret the payload themselves.
    Custom,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccessToken => "access_token",
            Self::Oauth2 => "oauth2",
            Self::Oauth => "oauth",
            Self::Custom => "custom",
        };
        write!(f, "{name}")
    }
}

/// The owner of a credential: exactly one user or one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialOwner {
    /// Owned by a user.
    User { user_id: UserId },
    /// Owned by an organization.
    Organization { organization_id: OrganizationId },
}

/// A stored credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier.
    pub id: CredentialId,
    /// The user or organization that owns this credential.
    pub owner: CredentialOwner,
    /// Credential name/label.
    pub name: String,
    /// Credential kind.
    pub kind: CredentialKind,
    /// Sealed envelope holding the credential payload.
    pub data: String,
    /// Current token material (OAuth kinds only).
    pub token: Option<JsonValue>,
    /// Provider metadata (OAuth kinds only).
    pub metadata: Option<JsonValue>,
    /// When the credential was created.
    pub created_at: DateTime<Utc>,
    /// When the credential was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the credential was last used.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a new credential with a sealed payload envelope.
    #[must_use]
    pub fn new(
        owner: CredentialOwner,
        name: impl Into<String>,
        kind: CredentialKind,
        data: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CredentialId::new(),
            owner,
            name: name.into(),
            kind,
            data: data.into(),
            token: None,
            metadata: None,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    /// Sets the token material.
    #[must_use]
    pub fn with_token(mut self, token: JsonValue) -> Self {
        self.token = Some(token);
        self
    }

    /// Sets the provider metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Marks the credential as used.
    pub fn mark_used(&mut self) {
        self.last_used_at = Some(Utc::now());
    }

    /// Marks the credential as updated.
    pub fn mark_updated(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Trait for credential storage.
///
/// Implementations must keep the sealed envelope opaque; only authorizers
/// decrypt it.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stores a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    async fn store(&self, credential: Credential) -> Result<CredentialId, CredentialError>;

    /// Retrieves a credential by ID.
    async fn get(&self, id: CredentialId) -> Result<Credential, CredentialError>;

    /// Replaces a credential's sealed envelope and token metadata.
    async fn update_sealed(
        &self,
        id: CredentialId,
        data: String,
        metadata: Option<JsonValue>,
    ) -> Result<(), CredentialError>;

    /// Replaces a credential's provider metadata.
    async fn update_metadata(
        &self,
        id: CredentialId,
        metadata: JsonValue,
    ) -> Result<(), CredentialError>;

    /// Deletes a credential.
    async fn delete(&self, id: CredentialId) -> Result<(), CredentialError>;
}

/// In-memory credential store for tests and local development.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<CredentialId, Credential>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn store(&self, credential: Credential) -> Result<CredentialId, CredentialError> {
        let id = credential.id;
        self.credentials
            .lock()
            .expect("credential store lock")
            .insert(id, credential);
        Ok(id)
    }

    async fn get(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        self.credentials
            .lock()
            .expect("credential store lock")
            .get(&id)
            .cloned()
            .ok_or(CredentialError::NotFound { id })
    }

    async fn update_sealed(
        &self,
        id: CredentialId,
        data: String,
        metadata: Option<JsonValue>,
    ) -> Result<(), CredentialError> {
        let mut credentials = self.credentials.lock().expect("credential store lock");
        let credential = credentials
            .get_mut(&id)
            .ok_or(CredentialError::NotFound { id })?;
        credential.data = data;
        credential.metadata = metadata;
        credential.mark_updated();
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: CredentialId,
        metadata: JsonValue,
    ) -> Result<(), CredentialError> {
        let mut credentials = self.credentials.lock().expect("credential store lock");
        let credential = credentials
            .get_mut(&id)
            .ok_or(CredentialError::NotFound { id })?;
        credential.metadata = Some(metadata);
        credential.mark_updated();
        Ok(())
    }

    async fn delete(&self, id: CredentialId) -> Result<(), CredentialError> {
        self.credentials
            .lock()
            .expect("credential store lock")
            .remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_owner() -> CredentialOwner {
        CredentialOwner::User {
            user_id: UserId::new(),
        }
    }

    #[test]
    fn credential_creation() {
        let cred = Credential::new(user_owner(), "Gitlab Token", CredentialKind::Oauth, "sealed");

        assert_eq!(cred.name, "Gitlab Token");
        assert_eq!(cred.kind, CredentialKind::Oauth);
        assert!(cred.last_used_at.is_none());
    }

    #[test]
    fn credential_kind_display() {
        assert_eq!(CredentialKind::AccessToken.to_string(), "access_token");
        assert_eq!(CredentialKind::Oauth2.to_string(), "oauth2");
        assert_eq!(CredentialKind::Custom.to_string(), "custom");
    }

    #[test]
    fn credential_serde_roundtrip() {
        let cred = Credential::new(
            CredentialOwner::Organization {
                organization_id: OrganizationId::new(),
            },
            "Shared Slack",
            CredentialKind::AccessToken,
            "sealed",
        )
        .with_metadata(serde_json::json!({"team": "ops"}));

        let json = serde_json::to_string(&cred).expect("serialize");
        let parsed: Credential = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(cred.id, parsed.id);
        assert_eq!(cred.metadata, parsed.metadata);
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        let cred = Credential::new(user_owner(), "Test", CredentialKind::Custom, "sealed");
        let id = store.store(cred).await.expect("store");

        let fetched = store.get(id).await.expect("get");
        assert_eq!(fetched.name, "Test");

        store
            .update_metadata(id, serde_json::json!({"instance_url": "https://x"}))
            .await
            .expect("update");
        let fetched = store.get(id).await.expect("get");
        assert!(fetched.metadata.is_some());
    }

    #[tokio::test]
    async fn memory_store_missing_credential() {
        let store = MemoryCredentialStore::new();
        let result = store.get(CredentialId::new()).await;
        assert!(matches!(result, Err(CredentialError::NotFound { .. })));
    }
}
