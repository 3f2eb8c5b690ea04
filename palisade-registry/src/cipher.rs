//! Credential encryption seam
//!
//! The platform encrypts credentials and auth headers before they reach the
//! registry store. The algorithm itself is outside this crate: hosts inject
//! a [`CredentialCipher`], typically backed by the platform KMS.
//!
//! [`InMemoryCipher`] exists for tests and local development only. It is a
//! keyed XOR obfuscator, not an encryption scheme, and must never guard
//! production credentials.

use crate::model::EncryptedPayload;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error as ThisError;

/// Errors a cipher implementation may report.
#[derive(Debug, ThisError)]
pub enum CipherError {
    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encrypt(String),
    /// Decryption failed, including malformed ciphertext/nonce encoding
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Opaque encrypt/decrypt capability for credentials at rest.
pub trait CredentialCipher: Send + Sync {
    /// Encrypt a plaintext payload.
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload, CipherError>;

    /// Decrypt a stored payload back to its plaintext.
    fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, CipherError>;
}

/// Reversible development cipher. Not an encryption scheme.
pub struct InMemoryCipher {
    key: Vec<u8>,
}

impl InMemoryCipher {
    /// Create a cipher from a key.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn keystream_byte(&self, nonce: &[u8], index: usize) -> u8 {
        let key_byte = self.key[index % self.key.len()];
        let nonce_byte = nonce[index % nonce.len()];
        key_byte ^ nonce_byte
    }

    fn apply(&self, nonce: &[u8], data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, byte)| byte ^ self.keystream_byte(nonce, i))
            .collect()
    }
}

impl Default for InMemoryCipher {
    fn default() -> Self {
        Self::new(b"palisade-dev-cipher".to_vec())
    }
}

impl CredentialCipher for InMemoryCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedPayload, CipherError> {
        if self.key.is_empty() {
            return Err(CipherError::Encrypt("empty cipher key".into()));
        }
        let nonce = ulid::Ulid::new().to_bytes();
        let ciphertext = self.apply(&nonce, plaintext);
        Ok(EncryptedPayload {
            ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce),
        })
    }

    fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, CipherError> {
        if self.key.is_empty() {
            return Err(CipherError::Decrypt("empty cipher key".into()));
        }
        let nonce = BASE64
            .decode(&payload.nonce)
            .map_err(|e| CipherError::Decrypt(format!("bad nonce encoding: {e}")))?;
        if nonce.is_empty() {
            return Err(CipherError::Decrypt("empty nonce".into()));
        }
        let ciphertext = BASE64
            .decode(&payload.ciphertext)
            .map_err(|e| CipherError::Decrypt(format!("bad ciphertext encoding: {e}")))?;
        Ok(self.apply(&nonce, &ciphertext))
    }
}
