//! The encryption boundary for credential material.
//!
//! Credential data is stored as an opaque sealed envelope: JSON, encrypted by
//! a [`Cipher`] implementation, then base64-encoded for transport and storage.
//! The core never sees plaintext credential material outside an authorizer's
//! lifetime.

use crate::error::CipherError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Symmetric encryption boundary.
///
/// Implementations encrypt and decrypt raw bytes. Key management is the
/// implementation's concern; callers only handle sealed envelopes.
pub trait Cipher: Send + Sync {
    /// Encrypts plaintext bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Decrypts ciphertext bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if decryption fails.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Serializes a value to JSON, encrypts it, and base64-encodes the result.
///
/// # Errors
///
/// Returns an error if serialization or encryption fails.
pub fn seal_json<T: Serialize>(cipher: &dyn Cipher, value: &T) -> Result<String, CipherError> {
    let plaintext = serde_json::to_vec(value).map_err(|e| CipherError::MalformedPayload {
        reason: e.to_string(),
    })?;
    let ciphertext = cipher.encrypt(&plaintext)?;
    Ok(BASE64.encode(ciphertext))
}

/// Base64-decodes a sealed envelope, decrypts it, and deserializes the JSON.
///
/// # Errors
///
/// Returns an error if decoding, decryption, or deserialization fails.
pub fn open_json<T: DeserializeOwned>(cipher: &dyn Cipher, sealed: &str) -> Result<T, CipherError> {
    let ciphertext = BASE64
        .decode(sealed)
        .map_err(|e| CipherError::InvalidEncoding {
            reason: e.to_string(),
        })?;
    let plaintext = cipher.decrypt(&ciphertext)?;
    serde_json::from_slice(&plaintext).map_err(|e| CipherError::MalformedPayload {
        reason: e.to_string(),
    })
}

/// A cipher that performs no encryption.
///
/// For tests and local development only; production deployments supply a real
/// implementation behind the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCipher;

impl Cipher for PassthroughCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        Ok(ciphertext.to_vec())
    }
}
