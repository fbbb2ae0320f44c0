//! Storage backends for the machine secret.
//!
//! The secret is generated locally on first use and never leaves the
//! machine. A backend only has to persist 32 bytes; the encoding is base64.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{generate_random_key, MachineKey};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A place to keep the machine secret.
pub trait SecretStore: Send + Sync {
    /// Returns the stored secret, or `None` if none has been provisioned.
    fn load(&self) -> CryptoResult<Option<MachineKey>>;

    /// Persists `key`, replacing any previous secret.
    fn store(&self, key: &MachineKey) -> CryptoResult<()>;

    /// Removes the secret. Succeeds if there was nothing to remove.
    fn clear(&self) -> CryptoResult<()>;

    /// Returns the stored secret, provisioning a fresh one on first use.
    fn load_or_create(&self) -> CryptoResult<MachineKey> {
        if let Some(key) = self.load()? {
            return Ok(key);
        }
        let key = generate_random_key();
        self.store(&key)?;
        info!("provisioned new machine secret");
        Ok(key)
    }
}

/// Keeps the secret in a file readable only by the current user.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretStore for FileSecretStore {
    fn load(&self) -> CryptoResult<Option<MachineKey>> {
        let encoded = match std::fs::read_to_string(&self.path) {
            Ok(s) => zeroize::Zeroizing::new(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CryptoError::SecretStore(e.to_string())),
        };
        MachineKey::from_base64(&encoded).map(Some)
    }

    fn store(&self, key: &MachineKey) -> CryptoResult<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| CryptoError::SecretStore(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| CryptoError::SecretStore(e.to_string()))?;
        restrict_to_owner(tmp.path())?;
        tmp.write_all(key.to_base64().as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| CryptoError::SecretStore(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| CryptoError::SecretStore(e.error.to_string()))?;

        debug!(path = %self.path.display(), "wrote machine secret");
        Ok(())
    }

    fn clear(&self) -> CryptoResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CryptoError::SecretStore(e.to_string())),
        }
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> CryptoResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| CryptoError::SecretStore(e.to_string()))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> CryptoResult<()> {
    // Per-user app data directories are already ACL-restricted on Windows.
    Ok(())
}

/// Keeps the secret in the OS keychain (Keychain, Credential Manager,
/// Secret Service).
#[cfg(feature = "os-keychain")]
#[derive(Debug, Clone)]
pub struct KeychainSecretStore {
    service: String,
    account: String,
}

#[cfg(feature = "os-keychain")]
impl KeychainSecretStore {
    /// Creates a store for the given keychain service and account names.
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> CryptoResult<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account).map_err(keychain_error)
    }
}

#[cfg(feature = "os-keychain")]
impl SecretStore for KeychainSecretStore {
    fn load(&self) -> CryptoResult<Option<MachineKey>> {
        match self.entry()?.get_password() {
            Ok(encoded) => MachineKey::from_base64(&zeroize::Zeroizing::new(encoded)).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keychain_error(e)),
        }
    }

    fn store(&self, key: &MachineKey) -> CryptoResult<()> {
        self.entry()?
            .set_password(&key.to_base64())
            .map_err(keychain_error)
    }

    fn clear(&self) -> CryptoResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keychain_error(e)),
        }
    }
}

#[cfg(feature = "os-keychain")]
fn keychain_error(err: keyring::Error) -> CryptoError {
    match err {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            CryptoError::SecretStore("keychain not available on this system".to_string())
        }
        other => CryptoError::SecretStore(other.to_string()),
    }
}
