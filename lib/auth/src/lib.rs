//! Credential and authorization abstractions for the flywheel platform.
//!
//! This crate provides:
//!
//! - **Cipher boundary**: encrypted credential envelopes; plaintext material
//!   only ever exists inside an authorizer's lifetime
//! - **Credential model**: four credential kinds with a storage boundary trait
//! - **Authorizer**: one polymorphic interface over the four kinds, with
//!   single-flight OAuth token refresh
//! - **Lock manager**: named, time-boxed mutual exclusion for refresh

pub mod authorizer;
pub mod cipher;
pub mod credential;
pub mod error;
pub mod lock;
pub mod token;

pub use authorizer::{Authorizer, AuthorizerContext, AuthorizerFactory, AuthorizerResolver};
pub use cipher::{Cipher, PassthroughCipher, open_json, seal_json};
pub use credential::{
    Credential, CredentialKind, CredentialOwner, CredentialStore, MemoryCredentialStore,
};
pub use error::{AuthError, CipherError, CredentialError, LockError};
pub use lock::{LockGuard, LockManager, MemoryLockManager};
pub use token::{OauthToken, TokenPersist, TokenSource};
