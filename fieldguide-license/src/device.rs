//! Device identity for license binding.
//!
//! Generates a stable identifier for this machine. Activation tokens record
//! it and refuse to load anywhere else.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::env;

/// Source of the current machine's identifier.
pub trait DeviceIdentity: Send + Sync {
    /// A stable identifier for this machine. Must not change with the
    /// logged-in user or session.
    fn machine_id(&self) -> String;
}

/// Hardware fingerprint derived from OS-level machine identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    id: String,
}

impl DeviceFingerprint {
    /// Generates a fingerprint for the current device.
    ///
    /// Combines OS, architecture and the platform machine ID. Survives
    /// reboots, user switches and renames; changes if the OS is reinstalled.
    /// Where the platform has no machine ID the hostname stands in for it,
    /// and renaming such a machine invalidates its activation.
    #[must_use]
    pub fn generate() -> Self {
        let combined = collect_hardware_ids().join("|");
        let hash = Sha256::digest(combined.as_bytes());
        Self {
            id: BASE64.encode(&hash[..16]),
        }
    }

    /// Returns the fingerprint ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The current machine, fingerprinted on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDeviceIdentity;

impl DeviceIdentity for SystemDeviceIdentity {
    fn machine_id(&self) -> String {
        DeviceFingerprint::generate().id
    }
}

/// A fixed identifier, for tests and for hosts that supply their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDeviceIdentity(pub String);

impl DeviceIdentity for StaticDeviceIdentity {
    fn machine_id(&self) -> String {
        self.0.clone()
    }
}

fn collect_hardware_ids() -> Vec<String> {
    hardware_ids(get_machine_id(), get_hostname)
}

/// The hostname is only consulted when there is no machine ID.
fn hardware_ids(machine_id: Option<String>, hostname: impl FnOnce() -> String) -> Vec<String> {
    vec![
        env::consts::OS.to_string(),
        env::consts::ARCH.to_string(),
        machine_id.unwrap_or_else(hostname),
    ]
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Gets the machine ID (platform-specific unique identifier).
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("MachineGuid"))
                    .and_then(|l| l.split_whitespace().last())
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
