//! Where licensing state lives on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "FIELDGUIDE_DATA_DIR";

/// Associated-data label for sealed activation tokens.
pub const TOKEN_CONTEXT: &str = "fieldguide.activation-token.v1";

/// Licensing storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Per-profile application data directory.
    pub data_dir: PathBuf,
    /// Encrypted activation token file name.
    pub token_file: String,
    /// Machine secret file name (file-backed secret store).
    pub secret_file: String,
    /// Keychain service name (keychain-backed secret store).
    pub keychain_service: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            token_file: "activation.token".to_string(),
            secret_file: "machine.secret".to_string(),
            keychain_service: "com.fieldguide.license".to_string(),
        }
    }
}

impl LicenseConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(&self.token_file)
    }

    #[must_use]
    pub fn secret_path(&self) -> PathBuf {
        self.data_dir.join(&self.secret_file)
    }
}

/// `$FIELDGUIDE_DATA_DIR`, else the platform local data directory.
fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));

    #[cfg(target_os = "linux")]
    {
        base.join("fieldguide")
    }

    #[cfg(not(target_os = "linux"))]
    {
        base.join("FieldGuide")
    }
}
