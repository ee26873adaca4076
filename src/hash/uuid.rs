//! UUID factories.

use std::fmt;

use rand::RngCore;

use crate::hash::md5;

/// The amount of bytes in a UUID
pub const UUID_SIZE: usize = 16;

/// A UUID in the Java-compatible format.
///
/// The name UUID (version 3) hashes the name bytes directly, without a
/// namespace prefix, so its output is byte-identical to Java's
/// `UUID.nameUUIDFromBytes(byte[])`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid([u8; UUID_SIZE]);

impl Uuid {
    /// Recreate a previously created UUID from its bytes
    pub fn from_bytes(bytes: [u8; UUID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a version 3 UUID from the MD5 hash of `name`
    pub fn from_name(name: &str) -> Self {
        let mut bytes = *md5::digest(name.as_bytes()).bytes();

        bytes[6] &= 0x0f; // Clear version
        bytes[6] |= 0x30; // Set version to 3 (name UUID)
        bytes[8] &= 0x3f; // Clear variant
        bytes[8] |= 0x80; // Set variant to IETF

        Self(bytes)
    }

    /// Create a pseudorandom version 4 UUID
    pub fn random() -> Self {
        let mut bytes = [0u8; UUID_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);

        bytes[6] &= 0x0f; // Clear version
        bytes[6] |= 0x40; // Set version to 4 (random UUID)
        bytes[8] &= 0x3f; // Clear variant
        bytes[8] |= 0x80; // Set variant to IETF

        Self(bytes)
    }

    /// The UUID bytes
    pub fn as_bytes(&self) -> &[u8; UUID_SIZE] {
        &self.0
    }

    /// The UUID version nibble
    pub fn version(&self) -> u8 {
        self.0[6] >> 4
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if matches!(index, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
