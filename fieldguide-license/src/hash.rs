//! Hashing and checksums.

use crc::{Crc, CRC_16_IBM_3740};
use sha2::{Digest, Sha256};

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Computes the key checksum over `data`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Hash and checksum primitives used by validation and token sealing.
pub trait HashProvider: Send + Sync {
    /// SHA-256 digest of `data`.
    fn sha256(&self, data: &[u8]) -> [u8; 32];

    /// CRC16 of `data`.
    fn crc16(&self, data: &[u8]) -> u16;

    /// Returns true if the CRC16 of `data` equals `expected`.
    fn verify_crc16(&self, data: &[u8], expected: u16) -> bool {
        self.crc16(data) == expected
    }

    /// Lowercase hex SHA-256 of `data`.
    fn sha256_hex(&self, data: &[u8]) -> String {
        hex::encode(self.sha256(data))
    }
}

/// SHA-256 from `sha2`, CRC-16/CCITT-FALSE from `crc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardHasher;

impl HashProvider for StandardHasher {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn crc16(&self, data: &[u8]) -> u16 {
        crc16(data)
    }
}
