//! Authenticated encryption using ChaCha20-Poly1305.
//!
//! Every call takes associated data so a ciphertext sealed for one purpose
//! (say, the activation token) cannot be replayed as another.

use crate::error::{CryptoError, CryptoResult};
use crate::key::MachineKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Leading byte of the encoded envelope.
const ENVELOPE_VERSION: u8 = 1;

/// Encrypted data with metadata needed for decryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// The encrypted ciphertext (includes auth tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Returns the total size of the encrypted data.
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    /// Returns true if the ciphertext is empty.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Encodes as `base64(version || nonce || ciphertext)`.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(1 + self.len());
        bytes.push(ENVELOPE_VERSION);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Decodes an envelope produced by [`EncryptedData::to_base64`].
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;

        let Some((&version, rest)) = bytes.split_first() else {
            return Err(CryptoError::Decryption("empty envelope".to_string()));
        };
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::Decryption(format!(
                "unsupported envelope version {version}"
            )));
        }
        if rest.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption("data too short".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&rest[..NONCE_SIZE]);
        let ciphertext = rest[NONCE_SIZE..].to_vec();

        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypts `plaintext` bound to `aad` with a fresh random nonce.
pub fn encrypt(key: &MachineKey, plaintext: &[u8], aad: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts data sealed by [`encrypt`]. Fails if the key, the associated
/// data, the nonce or the ciphertext differ from what was sealed.
pub fn decrypt(key: &MachineKey, encrypted: &EncryptedData, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: encrypted.ciphertext.as_ref(),
                aad,
            },
        )
        .map_err(|_| {
            CryptoError::Decryption("decryption failed (wrong key or tampered data)".to_string())
        })
}

/// Encrypts a string and returns the base64 envelope.
pub fn encrypt_string(key: &MachineKey, plaintext: &str, aad: &[u8]) -> CryptoResult<String> {
    let encrypted = encrypt(key, plaintext.as_bytes(), aad)?;
    Ok(encrypted.to_base64())
}

/// Decrypts a base64 envelope back into a string.
pub fn decrypt_string(key: &MachineKey, encoded: &str, aad: &[u8]) -> CryptoResult<String> {
    let encrypted = EncryptedData::from_base64(encoded)?;
    let plaintext = decrypt(key, &encrypted, aad)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
}
