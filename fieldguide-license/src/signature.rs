//! Signature resolution and verification.
//!
//! A product key is too short to carry an Ed25519 signature, so it carries
//! an 8-symbol reference instead. Every issued signature is recorded in a
//! [`SignatureTable`] manifest at issuance time and compiled into the
//! application; validation looks the reference up and verifies the
//! signature it finds against the embedded public key. A key whose
//! signature was never issued therefore cannot validate, whatever its
//! reference says.

use crate::codec::reference_from_digest;
use crate::error::{LicenseError, LicenseResult};
use crate::hash::HashProvider;
use crate::key::PAYLOAD_LEN;
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::collections::BTreeMap;

/// Embedded Ed25519 public key for production license verification (32 bytes).
const LICENSE_PUBLIC_KEY: [u8; 32] = [
    144, 68, 147, 153, 203, 99, 178, 65, 58, 124, 198, 215, 199, 217, 73, 134, 140, 147, 184,
    130, 150, 201, 153, 179, 251, 201, 34, 108, 3, 222, 123, 138,
];

/// Signature manifest compiled into the binary.
const EMBEDDED_SIGNATURES: &str = include_str!("../data/signatures.json");

/// Verifies an issuer signature over a key payload.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true if `signature` is a valid signature of `payload`.
    fn verify(&self, payload: &[u8; PAYLOAD_LEN], signature: &[u8]) -> bool;
}

/// Ed25519 verification against a fixed public key.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Builds a verifier for the embedded production public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded key is not a valid curve point.
    pub fn embedded() -> LicenseResult<Self> {
        Self::from_bytes(&LICENSE_PUBLIC_KEY)
    }

    /// Builds a verifier for a custom public key.
    /// Used for testing with a generated key pair.
    pub fn from_bytes(public_key: &[u8; 32]) -> LicenseResult<Self> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|_| LicenseError::InvalidKeyMaterial("invalid public key".to_string()))?;
        Ok(Self { key })
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, payload: &[u8; PAYLOAD_LEN], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.key.verify(payload, &signature).is_ok()
    }
}

/// Resolves a key's reference to the signature issued with it.
pub trait SignatureRegistry: Send + Sync {
    /// Returns the issued signature for `reference`, if any.
    fn resolve(&self, reference: &str) -> Option<Vec<u8>>;
}

/// Computes the reference for an issued signature from its SHA-256.
#[must_use]
pub fn signature_reference(hasher: &dyn HashProvider, signature: &[u8]) -> String {
    reference_from_digest(&hasher.sha256(signature))
}

/// In-memory reference → signature table, serialized as a JSON object of
/// base64 signatures keyed by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureTable {
    entries: BTreeMap<String, Vec<u8>>,
}

impl SignatureTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the manifest compiled into this build.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded manifest is malformed.
    pub fn embedded() -> LicenseResult<Self> {
        Self::from_json(EMBEDDED_SIGNATURES)
    }

    /// Parses a manifest.
    pub fn from_json(json: &str) -> LicenseResult<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| LicenseError::InvalidSignatureTable(e.to_string()))?;

        let entries = raw
            .into_iter()
            .map(|(reference, sig_b64)| {
                STANDARD
                    .decode(sig_b64.as_bytes())
                    .map(|sig| (reference.clone(), sig))
                    .map_err(|e| {
                        LicenseError::InvalidSignatureTable(format!("entry {reference}: {e}"))
                    })
            })
            .collect::<LicenseResult<BTreeMap<_, _>>>()?;

        Ok(Self { entries })
    }

    /// Serializes the table as a manifest.
    pub fn to_json(&self) -> LicenseResult<String> {
        let raw: BTreeMap<&str, String> = self
            .entries
            .iter()
            .map(|(reference, sig)| (reference.as_str(), STANDARD.encode(sig)))
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Records an issued signature. Returns false if the reference was
    /// already taken by a different signature (the table is unchanged).
    pub fn insert(&mut self, reference: impl Into<String>, signature: Vec<u8>) -> bool {
        match self.entries.entry(reference.into()) {
            std::collections::btree_map::Entry::Occupied(existing) => {
                *existing.get() == signature
            }
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(signature);
                true
            }
        }
    }

    /// Number of recorded signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SignatureRegistry for SignatureTable {
    fn resolve(&self, reference: &str) -> Option<Vec<u8>> {
        self.entries.get(reference).cloned()
    }
}
