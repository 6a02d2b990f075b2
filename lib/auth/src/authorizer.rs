//! The polymorphic credential-access abstraction.
//!
//! An [`Authorizer`] is built from a credential and behaves according to the
//! credential's kind. Both trigger provisioning and node execution resolve
//! authorizers the same way; plaintext credential material exists only inside
//! the authorizer instance.

use crate::cipher::{Cipher, open_json, seal_json};
use crate::credential::{Credential, CredentialKind, CredentialStore};
use crate::error::AuthError;
use crate::lock::LockManager;
use crate::token::{OauthToken, TokenPersist, TokenSource};
use async_trait::async_trait;
use chrono::Utc;
use flywheel_core::CredentialId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// How long a refresh waits on the per-credential lock before giving up.
pub const REFRESH_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Dependencies available when constructing an authorizer.
///
/// Kinds require different subsets; construction fails with
/// [`AuthError::MissingDependency`] when a required one is absent.
#[derive(Clone)]
pub struct AuthorizerContext {
    /// The encryption boundary for sealed envelopes.
    pub cipher: Arc<dyn Cipher>,
    /// Provider-side refresh call (legacy OAuth2 kind).
    pub token_source: Option<Arc<dyn TokenSource>>,
    /// Write-through persistence for refreshed material (OAuth kinds).
    pub persist: Option<Arc<dyn TokenPersist>>,
    /// Named lock manager (current OAuth kind).
    pub locks: Option<Arc<dyn LockManager>>,
}

impl AuthorizerContext {
    /// Creates a context with only the cipher set.
    #[must_use]
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        Self {
            cipher,
            token_source: None,
            persist: None,
            locks: None,
        }
    }

    /// Sets the token source.
    #[must_use]
    pub fn with_token_source(mut self, token_source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(token_source);
        self
    }

    /// Sets the persistence callback.
    #[must_use]
    pub fn with_persist(mut self, persist: Arc<dyn TokenPersist>) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Sets the lock manager.
    #[must_use]
    pub fn with_locks(mut self, locks: Arc<dyn LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }
}

/// Decrypted payload for the static access-token kind.
#[derive(Debug, Deserialize, serde::Serialize)]
struct AccessTokenPayload {
    token: String,
}

/// Static access-token authorizer: returns the stored token as-is.
pub struct AccessTokenAuthorizer {
    token: String,
    payload: JsonValue,
}

/// Legacy OAuth2 authorizer: refreshes on every access-token request,
/// persisting only when the access token actually changed.
pub struct Oauth2Authorizer {
    credential_id: CredentialId,
    cipher: Arc<dyn Cipher>,
    token_source: Arc<dyn TokenSource>,
    persist: Arc<dyn TokenPersist>,
    current: AsyncMutex<OauthToken>,
    original_metadata: Option<JsonValue>,
}

/// Current OAuth authorizer: metadata regeneration under a named lock.
pub struct OauthAuthorizer {
    credential_id: CredentialId,
    token: OauthToken,
    metadata: AsyncMutex<Option<JsonValue>>,
    locks: Arc<dyn LockManager>,
    persist: Arc<dyn TokenPersist>,
}

/// Custom-credential authorizer: payload pass-through, no token access.
pub struct CustomAuthorizer {
    payload: JsonValue,
}

/// The polymorphic authorizer, keyed on credential kind.
pub enum Authorizer {
    /// Static access token.
    AccessToken(AccessTokenAuthorizer),
    /// Legacy OAuth2 refresh-per-request.
    Oauth2(Oauth2Authorizer),
    /// Current OAuth with locked metadata regeneration.
    Oauth(OauthAuthorizer),
    /// Custom credential format.
    Custom(CustomAuthorizer),
}

impl Authorizer {
    /// Builds an authorizer for the credential, decrypting its envelope.
    ///
    /// # Errors
    ///
    /// Returns an error when decryption fails, the payload is malformed, or a
    /// dependency the credential kind requires is missing from `ctx`.
    pub fn new(credential: &Credential, ctx: &AuthorizerContext) -> Result<Self, AuthError> {
        match credential.kind {
            CredentialKind::AccessToken => {
                let payload: JsonValue = open_json(ctx.cipher.as_ref(), &credential.data)?;
                let typed: AccessTokenPayload = serde_json::from_value(payload.clone())
                    .map_err(|e| AuthError::MalformedCredential {
                        reason: e.to_string(),
                    })?;
                Ok(Self::AccessToken(AccessTokenAuthorizer {
                    token: typed.token,
                    payload,
                }))
            }
            CredentialKind::Oauth2 => {
                let token: OauthToken = open_json(ctx.cipher.as_ref(), &credential.data)?;
                let token_source =
                    ctx.token_source
                        .clone()
                        .ok_or(AuthError::MissingDependency {
                            dependency: "token_source",
                        })?;
                let persist = ctx.persist.clone().ok_or(AuthError::MissingDependency {
                    dependency: "persist",
                })?;
                Ok(Self::Oauth2(Oauth2Authorizer {
                    credential_id: credential.id,
                    cipher: Arc::clone(&ctx.cipher),
                    token_source,
                    persist,
                    current: AsyncMutex::new(token),
                    original_metadata: credential.metadata.clone(),
                }))
            }
            CredentialKind::Oauth => {
                let token: OauthToken = open_json(ctx.cipher.as_ref(), &credential.data)?;
                let locks = ctx.locks.clone().ok_or(AuthError::MissingDependency {
                    dependency: "locks",
                })?;
                let persist = ctx.persist.clone().ok_or(AuthError::MissingDependency {
                    dependency: "persist",
                })?;
                Ok(Self::Oauth(OauthAuthorizer {
                    credential_id: credential.id,
                    token,
                    metadata: AsyncMutex::new(credential.metadata.clone()),
                    locks,
                    persist,
                }))
            }
            CredentialKind::Custom => {
                let payload: JsonValue = open_json(ctx.cipher.as_ref(), &credential.data)?;
                Ok(Self::Custom(CustomAuthorizer { payload }))
            }
        }
    }

    /// Returns the credential kind this authorizer was built from.
    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::AccessToken(_) => CredentialKind::AccessToken,
            Self::Oauth2(_) => CredentialKind::Oauth2,
            Self::Oauth(_) => CredentialKind::Oauth,
            Self::Custom(_) => CredentialKind::Custom,
        }
    }

    /// Returns a valid access token for API calls.
    ///
    /// # Errors
    ///
    /// The custom kind fails with [`AuthError::Unsupported`]; callers branch
    /// on kind before invoking this path. OAuth kinds surface refresh and
    /// persistence failures.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        match self {
            Self::AccessToken(inner) => Ok(inner.token.clone()),
            Self::Oauth2(inner) => inner.access_token().await,
            Self::Oauth(inner) => Ok(inner.token.access_token.clone()),
            Self::Custom(_) => Err(AuthError::Unsupported {
                kind: CredentialKind::Custom,
            }),
        }
    }

    /// Decodes credential metadata into the requested type.
    ///
    /// For the static and custom kinds this is a pass-through of the
    /// decrypted payload; for OAuth kinds it decodes the provider metadata.
    ///
    /// # Errors
    ///
    /// Returns an error when no metadata is present or the shape mismatches.
    pub async fn decode_meta<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        let value = match self {
            Self::AccessToken(inner) => inner.payload.clone(),
            Self::Custom(inner) => inner.payload.clone(),
            Self::Oauth2(inner) => {
                inner
                    .original_metadata
                    .clone()
                    .ok_or(AuthError::MalformedCredential {
                        reason: "credential has no metadata".to_string(),
                    })?
            }
            Self::Oauth(inner) => {
                inner
                    .metadata
                    .lock()
                    .await
                    .clone()
                    .ok_or(AuthError::MalformedCredential {
                        reason: "credential has no metadata".to_string(),
                    })?
            }
        };
        serde_json::from_value(value).map_err(|e| AuthError::MalformedCredential {
            reason: e.to_string(),
        })
    }

    /// Decodes the current token material into the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error for kinds without token material.
    pub async fn token_metadata<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        let value = match self {
            Self::Oauth2(inner) => {
                let current = inner.current.lock().await;
                serde_json::to_value(&*current)
            }
            Self::Oauth(inner) => serde_json::to_value(&inner.token),
            Self::AccessToken(_) | Self::Custom(_) => {
                return Err(AuthError::Unsupported { kind: self.kind() });
            }
        }
        .map_err(|e| AuthError::MalformedCredential {
            reason: e.to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| AuthError::MalformedCredential {
            reason: e.to_string(),
        })
    }

    /// Regenerates credential metadata through `regenerate` and persists it.
    ///
    /// Runs under a named lock keyed by credential ID with a fixed timeout so
    /// concurrent requests needing a refresh collapse into a single one.
    ///
    /// # Errors
    ///
    /// Only the current OAuth kind supports this; other kinds fail with
    /// [`AuthError::Unsupported`]. Lock timeouts, regeneration failures, and
    /// persistence failures all surface.
    pub async fn update_credential_meta<F, Fut>(&self, regenerate: F) -> Result<JsonValue, AuthError>
    where
        F: FnOnce(Option<JsonValue>) -> Fut + Send,
        Fut: Future<Output = Result<JsonValue, AuthError>> + Send,
    {
        let Self::Oauth(inner) = self else {
            return Err(AuthError::Unsupported { kind: self.kind() });
        };

        let key = format!("credential:{}", inner.credential_id);
        let _guard = inner.locks.acquire(&key, REFRESH_LOCK_TIMEOUT).await?;

        let mut metadata = inner.metadata.lock().await;
        let regenerated = regenerate(metadata.clone()).await?;
        inner
            .persist
            .persist_metadata(inner.credential_id, regenerated.clone())
            .await?;
        *metadata = Some(regenerated.clone());
        Ok(regenerated)
    }
}

/// Resolves an authorizer for a credential ID.
///
/// Both node execution and trigger provisioning resolve authorizers through
/// this boundary; implementations own store lookup and context wiring.
#[async_trait]
pub trait AuthorizerResolver: Send + Sync {
    /// Builds an authorizer for the given credential.
    ///
    /// # Errors
    ///
    /// Returns an error when the credential is missing or cannot be decoded.
    async fn resolve(&self, credential_id: CredentialId) -> Result<Authorizer, AuthError>;
}

/// Standard resolver: fetches the credential from a store and builds the
/// authorizer with a shared context.
pub struct AuthorizerFactory {
    store: Arc<dyn CredentialStore>,
    ctx: AuthorizerContext,
}

impl AuthorizerFactory {
    /// Creates a factory over the given store and context.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, ctx: AuthorizerContext) -> Self {
        Self { store, ctx }
    }
}

#[async_trait]
impl AuthorizerResolver for AuthorizerFactory {
    async fn resolve(&self, credential_id: CredentialId) -> Result<Authorizer, AuthError> {
        let credential = self.store.get(credential_id).await?;
        Authorizer::new(&credential, &self.ctx)
    }
}

impl Oauth2Authorizer {
    /// Requests a fresh token and persists it only when it changed.
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut current = self.current.lock().await;
        let fresh = self
            .token_source
            .refresh(&current)
            .await?
            .with_defaulted_expiry(Utc::now());

        if fresh.access_token != current.access_token {
            debug!(credential = %self.credential_id, "access token changed; persisting re-sealed envelope");
            let sealed = seal_json(self.cipher.as_ref(), &fresh)?;
            self.persist
                .persist_token(self.credential_id, sealed, self.original_metadata.clone())
                .await?;
            *current = fresh.clone();
        }

        Ok(fresh.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::PassthroughCipher;
    use crate::credential::{CredentialOwner, MemoryCredentialStore};
    use crate::error::CredentialError;
    use crate::lock::MemoryLockManager;
    use async_trait::async_trait;
    use flywheel_core::UserId;
    use std::sync::Mutex;

    struct StaticTokenSource {
        next: OauthToken,
    }

    #[async_trait]
    impl TokenSource for StaticTokenSource {
        async fn refresh(&self, _current: &OauthToken) -> Result<OauthToken, AuthError> {
            Ok(self.next.clone())
        }
    }

    #[derive(Default)]
    struct RecordingPersist {
        tokens: Mutex<Vec<(CredentialId, String, Option<JsonValue>)>>,
        metadata: Mutex<Vec<(CredentialId, JsonValue)>>,
    }

    #[async_trait]
    impl TokenPersist for RecordingPersist {
        async fn persist_token(
            &self,
            id: CredentialId,
            sealed: String,
            metadata: Option<JsonValue>,
        ) -> Result<(), CredentialError> {
            self.tokens
                .lock()
                .expect("tokens lock")
                .push((id, sealed, metadata));
            Ok(())
        }

        async fn persist_metadata(
            &self,
            id: CredentialId,
            metadata: JsonValue,
        ) -> Result<(), CredentialError> {
            self.metadata
                .lock()
                .expect("metadata lock")
                .push((id, metadata));
            Ok(())
        }
    }

    fn owner() -> CredentialOwner {
        CredentialOwner::User {
            user_id: UserId::new(),
        }
    }

    fn sealed<T: serde::Serialize>(value: &T) -> String {
        seal_json(&PassthroughCipher, value).expect("seal")
    }

    fn base_ctx() -> AuthorizerContext {
        AuthorizerContext::new(Arc::new(PassthroughCipher))
    }

    #[tokio::test]
    async fn access_token_kind_returns_stored_token() {
        let credential = Credential::new(
            owner(),
            "Static",
            CredentialKind::AccessToken,
            sealed(&serde_json::json!({"token": "tok_123"})),
        );

        let authorizer = Authorizer::new(&credential, &base_ctx()).expect("build");
        let token = authorizer.access_token().await.expect("token");
        assert_eq!(token, "tok_123");
    }

    #[tokio::test]
    async fn access_token_kind_meta_is_payload_passthrough() {
        let credential = Credential::new(
            owner(),
            "Static",
            CredentialKind::AccessToken,
            sealed(&serde_json::json!({"token": "tok_123"})),
        );

        let authorizer = Authorizer::new(&credential, &base_ctx()).expect("build");
        let meta: JsonValue = authorizer.decode_meta().await.expect("meta");
        assert_eq!(meta["token"], "tok_123");
    }

    #[tokio::test]
    async fn custom_kind_rejects_access_token() {
        let credential = Credential::new(
            owner(),
            "Custom",
            CredentialKind::Custom,
            sealed(&serde_json::json!({"apex_key": "k"})),
        );

        let authorizer = Authorizer::new(&credential, &base_ctx()).expect("build");
        let result = authorizer.access_token().await;
        assert!(matches!(result, Err(AuthError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn oauth2_persists_only_when_token_changed() {
        let stored = OauthToken::new("old_access").with_refresh_token("refresh");
        let credential = Credential::new(owner(), "Legacy", CredentialKind::Oauth2, sealed(&stored))
            .with_metadata(serde_json::json!({"instance_url": "https://example"}));

        let persist = Arc::new(RecordingPersist::default());
        let ctx = base_ctx()
            .with_token_source(Arc::new(StaticTokenSource {
                next: OauthToken::new("new_access").with_refresh_token("refresh"),
            }))
            .with_persist(Arc::clone(&persist) as Arc<dyn TokenPersist>);

        let authorizer = Authorizer::new(&credential, &ctx).expect("build");

        let token = authorizer.access_token().await.expect("token");
        assert_eq!(token, "new_access");

        // Change was persisted once, preserving the original metadata.
        let persisted = persist.tokens.lock().expect("tokens lock");
        assert_eq!(persisted.len(), 1);
        let (id, sealed_envelope, metadata) = &persisted[0];
        assert_eq!(*id, credential.id);
        assert_eq!(
            metadata.as_ref().expect("metadata")["instance_url"],
            "https://example"
        );

        // Zero-expiry tokens were defaulted, not treated as expired.
        let reopened: OauthToken =
            open_json(&PassthroughCipher, sealed_envelope).expect("open persisted");
        assert!(reopened.expiry.is_some());
        drop(persisted);

        // A second request returning the same token persists nothing new.
        let _ = authorizer.access_token().await.expect("token again");
        assert_eq!(persist.tokens.lock().expect("tokens lock").len(), 1);
    }

    #[tokio::test]
    async fn oauth2_requires_token_source_and_persist() {
        let stored = OauthToken::new("a");
        let credential = Credential::new(owner(), "Legacy", CredentialKind::Oauth2, sealed(&stored));

        let result = Authorizer::new(&credential, &base_ctx());
        assert!(matches!(
            result,
            Err(AuthError::MissingDependency { dependency: "token_source" })
        ));
    }

    #[tokio::test]
    async fn oauth_update_credential_meta_persists_and_returns() {
        let stored = OauthToken::new("acc");
        let credential = Credential::new(owner(), "Current", CredentialKind::Oauth, sealed(&stored))
            .with_metadata(serde_json::json!({"generation": 1}));

        let persist = Arc::new(RecordingPersist::default());
        let ctx = base_ctx()
            .with_locks(Arc::new(MemoryLockManager::new()))
            .with_persist(Arc::clone(&persist) as Arc<dyn TokenPersist>);

        let authorizer = Authorizer::new(&credential, &ctx).expect("build");

        let updated = authorizer
            .update_credential_meta(|current| async move {
                let generation = current
                    .as_ref()
                    .and_then(|m| m["generation"].as_i64())
                    .unwrap_or(0);
                Ok(serde_json::json!({"generation": generation + 1}))
            })
            .await
            .expect("update");

        assert_eq!(updated["generation"], 2);
        assert_eq!(persist.metadata.lock().expect("metadata lock").len(), 1);

        // The refreshed metadata is visible to subsequent decodes.
        let meta: JsonValue = authorizer.decode_meta().await.expect("meta");
        assert_eq!(meta["generation"], 2);
    }

    #[tokio::test]
    async fn update_credential_meta_rejected_for_other_kinds() {
        let credential = Credential::new(
            owner(),
            "Static",
            CredentialKind::AccessToken,
            sealed(&serde_json::json!({"token": "t"})),
        );
        let authorizer = Authorizer::new(&credential, &base_ctx()).expect("build");

        let result = authorizer
            .update_credential_meta(|_| async { Ok(serde_json::json!({})) })
            .await;
        assert!(matches!(result, Err(AuthError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn malformed_envelope_surfaces_cipher_error() {
        let mut credential = Credential::new(
            owner(),
            "Broken",
            CredentialKind::AccessToken,
            sealed(&serde_json::json!({"token": "t"})),
        );
        credential.data = "%%% not base64 %%%".to_string();

        let result = Authorizer::new(&credential, &base_ctx());
        assert!(matches!(result, Err(AuthError::Cipher(_))));
    }

    #[tokio::test]
    async fn persist_writes_through_credential_store() {
        // The credential store doubles as the persistence callback in
        // production wiring; exercise that combination here.
        struct StorePersist(Arc<MemoryCredentialStore>);

        #[async_trait]
        impl TokenPersist for StorePersist {
            async fn persist_token(
                &self,
                id: CredentialId,
                sealed: String,
                metadata: Option<JsonValue>,
            ) -> Result<(), CredentialError> {
                self.0.update_sealed(id, sealed, metadata).await
            }

            async fn persist_metadata(
                &self,
                id: CredentialId,
                metadata: JsonValue,
            ) -> Result<(), CredentialError> {
                self.0.update_metadata(id, metadata).await
            }
        }

        let store = Arc::new(MemoryCredentialStore::new());
        let stored_token = OauthToken::new("old").with_refresh_token("r");
        let credential = Credential::new(
            owner(),
            "Legacy",
            CredentialKind::Oauth2,
            sealed(&stored_token),
        );
        let id = store.store(credential.clone()).await.expect("store");

        let ctx = base_ctx()
            .with_token_source(Arc::new(StaticTokenSource {
                next: OauthToken::new("new").with_refresh_token("r"),
            }))
            .with_persist(Arc::new(StorePersist(Arc::clone(&store))));

        let authorizer = Authorizer::new(&credential, &ctx).expect("build");
        let _ = authorizer.access_token().await.expect("token");

        let reloaded = store.get(id).await.expect("get");
        let reopened: OauthToken =
            open_json(&PassthroughCipher, &reloaded.data).expect("open updated envelope");
        assert_eq!(reopened.access_token, "new");
    }
}
