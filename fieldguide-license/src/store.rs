//! Encrypted, machine-bound storage of the activation token.

use crate::config::{LicenseConfig, TOKEN_CONTEXT};
use crate::device::DeviceIdentity;
use crate::error::{LicenseError, LicenseResult};
use crate::hash::HashProvider;
use crate::token::ActivationToken;
use chrono::{DateTime, Utc};
use fieldguide_crypto::{CryptoError, MachineCipher, MachineEncryptor};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persists one activation token per profile.
///
/// The file holds the token's JSON sealed by a [`MachineEncryptor`]. Loading
/// fails closed: a token that cannot be opened, parsed or authenticated, or
/// that was issued on another machine, is deleted and reported as an error
/// rather than being mistaken for "not activated".
pub struct TokenManager {
    path: PathBuf,
    encryptor: Arc<dyn MachineEncryptor>,
    device: Arc<dyn DeviceIdentity>,
    hasher: Arc<dyn HashProvider>,
}

impl TokenManager {
    pub fn new(
        path: impl AsRef<Path>,
        encryptor: Arc<dyn MachineEncryptor>,
        device: Arc<dyn DeviceIdentity>,
        hasher: Arc<dyn HashProvider>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            encryptor,
            device,
            hasher,
        }
    }

    /// Builds a manager over the configured token path, sealing with the
    /// machine secret (OS keychain with `os-keychain`, otherwise a file).
    pub fn from_config(
        config: &LicenseConfig,
        device: Arc<dyn DeviceIdentity>,
        hasher: Arc<dyn HashProvider>,
    ) -> Self {
        #[cfg(feature = "os-keychain")]
        let store = fieldguide_crypto::KeychainSecretStore::new(
            config.keychain_service.clone(),
            "machine-secret",
        );
        #[cfg(not(feature = "os-keychain"))]
        let store = fieldguide_crypto::FileSecretStore::new(config.secret_path());

        let encryptor = Arc::new(MachineCipher::new(store, TOKEN_CONTEXT));
        Self::new(config.token_path(), encryptor, device, hasher)
    }

    /// Returns the token file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seals and atomically writes `token`, replacing any previous one.
    pub fn save(&self, token: &ActivationToken) -> LicenseResult<()> {
        let json = serde_json::to_string(token)?;
        let sealed = self.encryptor.encrypt(&json)?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| LicenseError::Storage(e.to_string()))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| LicenseError::Storage(e.to_string()))?;
        tmp.write_all(sealed.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| LicenseError::Storage(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| LicenseError::Storage(e.error.to_string()))?;

        info!(key_hash = %short_hash(token.product_key_hash()), "activation token saved");
        Ok(())
    }

    /// Loads the stored token.
    ///
    /// Returns `Ok(None)` if there is no token or it has expired.
    ///
    /// # Errors
    ///
    /// - [`LicenseError::CorruptedToken`] if the file cannot be decrypted,
    ///   parsed, or its tamper digest does not match
    /// - [`LicenseError::MachineMismatch`] if it was issued on another machine
    /// - [`LicenseError::Storage`] if the file cannot be read
    /// - [`LicenseError::Crypto`] if the machine secret exists but cannot be
    ///   read (locked keychain, I/O fault)
    ///
    /// In the first two cases the file is deleted before returning; in the
    /// others it is left in place.
    pub fn load(&self) -> LicenseResult<Option<ActivationToken>> {
        self.load_at(Utc::now())
    }

    /// [`TokenManager::load`] with an explicit "now" for expiry.
    pub fn load_at(&self, now: DateTime<Utc>) -> LicenseResult<Option<ActivationToken>> {
        let sealed = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LicenseError::Storage(e.to_string())),
        };

        let json = self.encryptor.decrypt(&sealed).map_err(|e| match e {
            // The secret could not be reached; the token itself may be fine.
            CryptoError::SecretStore(_) | CryptoError::Encryption(_) => {
                warn!(error = %e, "machine secret unavailable; keeping activation token");
                LicenseError::Crypto(e)
            }
            CryptoError::Decryption(_)
            | CryptoError::SecretMissing
            | CryptoError::InvalidKeyLength { .. } => self.corrupted(e.to_string()),
        })?;
        let token: ActivationToken =
            serde_json::from_str(&json).map_err(|e| self.corrupted(e.to_string()))?;
        if !token.verify_signature(self.hasher.as_ref()) {
            return Err(self.corrupted("tamper digest mismatch".to_string()));
        }

        let current = self.device.machine_id();
        if token.machine_id() != current {
            warn!("activation token was issued on another machine; discarding");
            self.discard();
            return Err(LicenseError::MachineMismatch {
                expected: current,
                found: token.machine_id().to_string(),
            });
        }

        if token.is_expired_at(now) {
            debug!("stored activation token has expired");
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Removes the stored token. Succeeds if there is none.
    pub fn delete(&self) -> LicenseResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("activation token deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LicenseError::Storage(e.to_string())),
        }
    }

    /// True if a valid, unexpired token for this machine is stored. Any
    /// load error counts as "not activated".
    #[must_use]
    pub fn is_activated(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }

    fn corrupted(&self, reason: String) -> LicenseError {
        warn!(%reason, "activation token is corrupted; discarding");
        self.discard();
        LicenseError::CorruptedToken(reason)
    }

    fn discard(&self) {
        if let Err(e) = self.delete() {
            warn!(error = %e, "failed to remove unusable activation token");
        }
    }
}

/// Leading characters of a key hash, enough to correlate log lines.
pub(crate) fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
