//! Machine-scoped encryption for FieldGuide local state.
//!
//! Everything the app persists about its license is sealed with
//! ChaCha20-Poly1305 under a 256-bit secret that never leaves the machine.
//! Where that secret lives is pluggable:
//!
//! - [`FileSecretStore`]: a locally generated secret in an owner-only file
//! - `KeychainSecretStore` (feature `os-keychain`): the OS keychain
//!
//! Consumers depend on `Arc<dyn MachineEncryptor>` and never see key bytes.

mod cipher;
mod encryptor;
mod error;
mod key;
mod secret;

pub use cipher::{decrypt, decrypt_string, encrypt, encrypt_string, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use encryptor::{MachineCipher, MachineEncryptor, PassthroughEncryptor};
pub use error::{CryptoError, CryptoResult};
pub use key::{generate_random_key, MachineKey, KEY_SIZE};
pub use secret::{FileSecretStore, SecretStore};

#[cfg(feature = "os-keychain")]
pub use secret::KeychainSecretStore;
