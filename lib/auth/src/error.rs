//! Error types for the auth crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `CipherError`: Errors from the encryption boundary
//! - `CredentialError`: Errors from credential storage/retrieval
//! - `LockError`: Errors from the named lock manager
//! - `AuthError`: Authorizer construction and token access failures

use crate::credential::CredentialKind;
use flywheel_core::CredentialId;
use std::fmt;
use std::time::Duration;

/// Errors from the cipher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Encryption failed.
    EncryptFailed { reason: String },
    /// Decryption failed.
    DecryptFailed { reason: String },
    /// The envelope transport encoding is invalid.
    InvalidEncoding { reason: String },
    /// The decrypted payload is not valid JSON of the expected shape.
    MalformedPayload { reason: String },
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncryptFailed { reason } => write!(f, "encryption failed: {reason}"),
            Self::DecryptFailed { reason } => write!(f, "decryption failed: {reason}"),
            Self::InvalidEncoding { reason } => {
                write!(f, "invalid envelope encoding: {reason}")
            }
            Self::MalformedPayload { reason } => {
                write!(f, "malformed credential payload: {reason}")
            }
        }
    }
}

impl std::error::Error for CipherError {}

/// Errors from credential operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Credential not found.
    NotFound { id: CredentialId },
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "credential not found: {id}"),
            Self::StorageFailed { reason } => {
                write!(f, "credential storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

/// Errors from the named lock manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock could not be acquired within the timeout.
    Timeout { key: String, timeout: Duration },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { key, timeout } => {
                write!(f, "lock '{key}' not acquired within {timeout:?}")
            }
        }
    }
}

impl std::error::Error for LockError {}

/// Errors from authorizer construction and token access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The credential kind does not support this operation.
    Unsupported { kind: CredentialKind },
    /// A dependency required by this credential kind was not supplied.
    MissingDependency { dependency: &'static str },
    /// Cipher boundary failure.
    Cipher(CipherError),
    /// Credential storage failure.
    Credential(CredentialError),
    /// Lock acquisition failure.
    Lock(LockError),
    /// The credential record is missing material this kind requires.
    MalformedCredential { reason: String },
    /// The remote token refresh call failed.
    RefreshFailed { reason: String },
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { kind } => {
                write!(f, "credential kind {kind} is not supported for this operation")
            }
            Self::MissingDependency { dependency } => {
                write!(f, "authorizer dependency missing: {dependency}")
            }
            Self::Cipher(e) => write!(f, "cipher error: {e}"),
            Self::Credential(e) => write!(f, "credential error: {e}"),
            Self::Lock(e) => write!(f, "lock error: {e}"),
            Self::MalformedCredential { reason } => {
                write!(f, "malformed credential: {reason}")
            }
            Self::RefreshFailed { reason } => write!(f, "token refresh failed: {reason}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<CipherError> for AuthError {
    fn from(e: CipherError) -> Self {
        Self::Cipher(e)
    }
}

impl From<CredentialError> for AuthError {
    fn from(e: CredentialError) -> Self {
        Self::Credential(e)
    }
}

impl From<LockError> for AuthError {
    fn from(e: LockError) -> Self {
        Self::Lock(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_error_display() {
        let err = CipherError::DecryptFailed {
            reason: "bad key".to_string(),
        };
        assert!(err.to_string().contains("decryption failed"));
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn credential_error_display() {
        let id = CredentialId::new();
        let err = CredentialError::NotFound { id };
        assert!(err.to_string().contains("credential not found"));
    }

    #[test]
    fn lock_error_display() {
        let err = LockError::Timeout {
            key: "credential:abc".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("credential:abc"));
    }

    #[test]
    fn auth_error_unsupported_display() {
        let err = AuthError::Unsupported {
            kind: CredentialKind::Custom,
        };
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn auth_error_from_cipher() {
        let err: AuthError = CipherError::EncryptFailed {
            reason: "x".to_string(),
        }
        .into();
        assert!(matches!(err, AuthError::Cipher(_)));
    }
}
