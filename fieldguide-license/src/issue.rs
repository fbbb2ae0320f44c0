//! Product key issuance.
//!
//! Issuing a key signs its payload with the vendor's Ed25519 key and
//! produces two artifacts: the key string handed to the customer, and the
//! signature that must be added to the [`SignatureTable`] shipped with the
//! next build.
//!
//! [`SignatureTable`]: crate::SignatureTable

use crate::codec;
use crate::error::LicenseResult;
use crate::hash::StandardHasher;
use crate::key::KeyPayload;
use crate::signature::signature_reference;
use ed25519_dalek::{Signer, SigningKey};

/// A freshly issued key.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    /// The grouped key string for the customer.
    pub key: String,
    /// The 8-symbol reference embedded in the key.
    pub reference: String,
    /// The Ed25519 signature over the payload.
    pub signature: Vec<u8>,
}

/// Signs and encodes product keys.
pub struct KeyIssuer {
    signing_key: SigningKey,
}

impl KeyIssuer {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Builds an issuer from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(seed))
    }

    /// The public key validators must embed.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Issues a key for `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized (expiration out
    /// of range).
    pub fn issue(&self, payload: &KeyPayload) -> LicenseResult<IssuedKey> {
        let bytes = payload.to_bytes()?;
        let signature = self.signing_key.sign(&bytes).to_bytes().to_vec();
        let reference = signature_reference(&StandardHasher, &signature);
        let key = codec::encode(&bytes, &reference)?;

        Ok(IssuedKey {
            key,
            reference,
            signature,
        })
    }
}
