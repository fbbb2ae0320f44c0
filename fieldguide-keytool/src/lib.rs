//! Building blocks for the `fieldguide-keytool` binary.
//!
//! Issuance runs on the vendor side: it needs the Ed25519 signing seed and
//! writes the signature manifest that ships inside the next application
//! build. The activation commands run on a customer machine and go through
//! the same `fieldguide-license` services the application uses.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use fieldguide_license::{
    Ed25519Verifier, Feature, IssuedKey, KeyIssuer, ProductKey, SignatureRegistry,
    SignatureTable, SignatureVerifier,
};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Reads a 32-byte Ed25519 seed written by [`generate_signing_key`].
pub fn load_signing_key(path: &Path) -> Result<KeyIssuer> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read signing key {}", path.display()))?;
    let seed: [u8; 32] = bytes.as_slice().try_into().with_context(|| {
        format!(
            "Signing key {} must be exactly 32 bytes, found {}",
            path.display(),
            bytes.len()
        )
    })?;
    Ok(KeyIssuer::from_seed(&seed))
}

/// Generates a fresh signing seed at `path`. Refuses to overwrite.
pub fn generate_signing_key(path: &Path) -> Result<KeyIssuer> {
    if path.exists() {
        bail!("Refusing to overwrite existing signing key {}", path.display());
    }
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    write_private(path, &seed).context("Failed to write signing key")?;
    info!("Generated signing key at {:?}", path);
    Ok(KeyIssuer::from_seed(&seed))
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}

/// The public key as a Rust array literal, ready to embed.
#[must_use]
pub fn public_key_literal(public_key: &[u8; 32]) -> String {
    let body = public_key
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{body}]")
}

/// Parses `YYYY-MM-DD` as midnight UTC.
pub fn parse_expiry(date: &str) -> Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date {date:?}, expected YYYY-MM-DD"))?;
    Ok(day.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Folds feature names (case-insensitive) into a flag byte.
pub fn parse_features<S: AsRef<str>>(names: &[S]) -> Result<u8> {
    let features = names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            Feature::from_name(name).with_context(|| {
                let known: Vec<&str> = Feature::ALL.iter().map(|f| f.name()).collect();
                format!("Unknown feature {name:?} (known: {})", known.join(", "))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Feature::to_flags(&features))
}

/// Loads a manifest, or an empty table if the file does not exist yet.
pub fn load_manifest(path: &Path) -> Result<SignatureTable> {
    if !path.exists() {
        return Ok(SignatureTable::new());
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    SignatureTable::from_json(&json)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

/// Adds an issued signature to the manifest at `path`, creating it if
/// needed. Returns the number of entries afterwards.
pub fn record_signature(path: &Path, issued: &IssuedKey) -> Result<usize> {
    let mut table = load_manifest(path)?;
    if !table.insert(issued.reference.clone(), issued.signature.clone()) {
        bail!(
            "Reference {} is already taken by another signature; re-issue with a different payload",
            issued.reference
        );
    }
    write_atomic(path, (table.to_json()? + "\n").as_bytes())
        .with_context(|| format!("Failed to write manifest {}", path.display()))?;
    Ok(table.len())
}

/// Replaces `path` in one step, so a crash leaves the old contents intact.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Parses a hex-encoded 32-byte public key.
pub fn parse_public_key(hex_key: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_key.trim()).context("Public key is not valid hex")?;
    bytes
        .as_slice()
        .try_into()
        .with_context(|| format!("Public key must be 32 bytes, found {}", bytes.len()))
}

/// The verifier and signature registry to validate against: the embedded
/// production material unless overridden.
pub fn load_trust(
    manifest: Option<&Path>,
    public_key: Option<&str>,
) -> Result<(Arc<dyn SignatureVerifier>, Arc<dyn SignatureRegistry>)> {
    let verifier = match public_key {
        Some(hex_key) => Ed25519Verifier::from_bytes(&parse_public_key(hex_key)?)?,
        None => Ed25519Verifier::embedded()?,
    };
    let registry = match manifest {
        Some(path) => load_manifest(path)?,
        None => SignatureTable::embedded()?,
    };
    Ok((Arc::new(verifier), Arc::new(registry)))
}

/// What `inspect` prints about a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyReport {
    pub valid: bool,
    pub error: Option<String>,
    pub license_type: Option<String>,
    pub expiration_date: Option<String>,
    pub customer_id: Option<u32>,
    pub features: Vec<String>,
}

impl From<&ProductKey> for KeyReport {
    fn from(key: &ProductKey) -> Self {
        let decoded = key.payload().is_some();
        Self {
            valid: key.is_valid(),
            error: key.validation_error().map(|e| e.message().to_string()),
            license_type: key.license_type().map(|t| t.name().to_string()),
            expiration_date: match (decoded, key.expiration_date()) {
                (false, _) => None,
                (true, None) => Some("never".to_string()),
                (true, Some(at)) => Some(at.format("%Y-%m-%d").to_string()),
            },
            customer_id: key.license_type().map(|_| key.customer_id()),
            features: key.features().iter().map(|f| f.name().to_string()).collect(),
        }
    }
}
