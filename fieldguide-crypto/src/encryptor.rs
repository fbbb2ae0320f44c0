//! Machine-scoped encryption interface.
//!
//! Consumers (the license token store) depend on `Arc<dyn MachineEncryptor>`
//! and never see raw keys. [`MachineCipher`] is the production
//! implementation; tests can use [`PassthroughEncryptor`] to inspect or
//! hand-edit stored plaintext.

use crate::cipher;
use crate::error::{CryptoError, CryptoResult};
use crate::secret::SecretStore;
use tracing::warn;

/// Encrypts text so that only this machine (and user profile) can read it.
pub trait MachineEncryptor: Send + Sync {
    /// Seals `plaintext` and returns an opaque, printable ciphertext.
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    /// Opens a ciphertext produced by [`MachineEncryptor::encrypt`].
    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String>;
}

/// ChaCha20-Poly1305 keyed by a secret from a [`SecretStore`].
///
/// The `context` string is authenticated as associated data, so blobs
/// sealed for one purpose do not open under another.
pub struct MachineCipher<S> {
    store: S,
    context: String,
}

impl<S: SecretStore> MachineCipher<S> {
    /// Creates a cipher over `store` for the given purpose.
    pub fn new(store: S, context: impl Into<String>) -> Self {
        Self {
            store,
            context: context.into(),
        }
    }

    /// Returns the underlying secret store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SecretStore> MachineEncryptor for MachineCipher<S> {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let key = self.store.load_or_create()?;
        cipher::encrypt_string(&key, plaintext, self.context.as_bytes())
    }

    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        // Never provision on read: a fresh secret could not open old data.
        let Some(key) = self.store.load()? else {
            warn!("machine secret missing while decrypting");
            return Err(CryptoError::SecretMissing);
        };
        cipher::decrypt_string(&key, ciphertext, self.context.as_bytes())
    }
}

/// No-op encryptor for tests. Data passes through unchanged.
pub struct PassthroughEncryptor;

impl MachineEncryptor for PassthroughEncryptor {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        Ok(ciphertext.to_string())
    }
}
