//! OAuth token material and the refresh/persist boundary traits.

use crate::error::{AuthError, CredentialError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use flywheel_core::CredentialId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// How long a token with no provider-reported expiry is considered valid.
///
/// Some providers (Salesforce among them) return tokens with a zero expiry;
/// those must not be treated as already expired.
pub const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 2;

/// An OAuth access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OauthToken {
    /// The bearer access token.
    pub access_token: String,
    /// The refresh token, when the provider issued one.
    pub refresh_token: Option<String>,
    /// Token type, usually "Bearer".
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// When the access token expires; `None` when the provider omitted it.
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OauthToken {
    /// Creates a token with only an access token set.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expiry: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Returns a copy whose missing expiry is defaulted to
    /// [`DEFAULT_TOKEN_LIFETIME_HOURS`] from `now`.
    #[must_use]
    pub fn with_defaulted_expiry(mut self, now: DateTime<Utc>) -> Self {
        if self.expiry.is_none() {
            self.expiry = Some(now + Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS));
        }
        self
    }

    /// Returns true if the token is expired at `now`.
    ///
    /// A token with no expiry is not considered expired; callers wanting the
    /// defaulting behavior apply [`Self::with_defaulted_expiry`] first.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

/// Boundary trait for the provider-side refresh call.
///
/// Provider adapters implement this; they own endpoint and client
/// configuration. Given the current token pair, return a fresh token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Exchanges the current token pair for a fresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the refresh.
    async fn refresh(&self, current: &OauthToken) -> Result<OauthToken, AuthError>;
}

/// Boundary trait for persisting refreshed credential material.
///
/// Implementations write through to credential storage. The authorizer calls
/// these after a successful refresh, passing the re-sealed envelope and the
/// metadata to preserve.
#[async_trait]
pub trait TokenPersist: Send + Sync {
    /// Stores a re-encrypted token envelope, preserving the given metadata.
    async fn persist_token(
        &self,
        id: CredentialId,
        sealed: String,
        metadata: Option<JsonValue>,
    ) -> Result<(), CredentialError>;

    /// Stores regenerated credential metadata.
    async fn persist_metadata(
        &self,
        id: CredentialId,
        metadata: JsonValue,
    ) -> Result<(), CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_expiry_is_defaulted_to_two_hours() {
        let now = Utc::now();
        let token = OauthToken::new("abc").with_defaulted_expiry(now);

        let expiry = token.expiry.expect("expiry set");
        assert_eq!(expiry, now + Duration::hours(2));
    }

    #[test]
    fn present_expiry_is_preserved() {
        let now = Utc::now();
        let original = now + Duration::minutes(30);
        let token = OauthToken::new("abc")
            .with_expiry(original)
            .with_defaulted_expiry(now);

        assert_eq!(token.expiry, Some(original));
    }

    #[test]
    fn expired_token_detection() {
        let now = Utc::now();
        let expired = OauthToken::new("abc").with_expiry(now - Duration::minutes(1));
        let valid = OauthToken::new("abc").with_expiry(now + Duration::minutes(1));
        let no_expiry = OauthToken::new("abc");

        assert!(expired.is_expired(now));
        assert!(!valid.is_expired(now));
        assert!(!no_expiry.is_expired(now));
    }

    #[test]
    fn token_serde_roundtrip() {
        let token = OauthToken::new("access")
            .with_refresh_token("refresh")
            .with_expiry(Utc::now());

        let json = serde_json::to_string(&token).expect("serialize");
        let parsed: OauthToken = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(token, parsed);
    }

    #[test]
    fn token_type_defaults_on_deserialize() {
        let parsed: OauthToken =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":null,"expiry":null}"#)
                .expect("deserialize");
        assert_eq!(parsed.token_type, "Bearer");
    }
}
