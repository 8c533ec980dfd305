//! # Keccak-256 Hashing
//!
//! All consensus digests (block hashes, vote digests, proposer selection
//! entropy, RANDAO seeds) are Keccak-256 so every honest node derives the
//! same bytes from the same inputs.

use sha3::{Digest, Keccak256};

/// Keccak-256 output (256-bit).
pub type Hash = [u8; 32];

/// Incremental Keccak-256 hasher with typed field helpers.
pub struct Keccak256Hasher {
    inner: Keccak256,
}

impl Keccak256Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Keccak256::new(),
        }
    }

    /// Absorb raw bytes.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Absorb a `u64` in little-endian order.
    pub fn update_u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(value.to_le_bytes());
        self
    }

    /// Absorb a single byte tag.
    pub fn update_u8(&mut self, value: u8) -> &mut Self {
        self.inner.update([value]);
        self
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> Hash {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.inner.finalize());
        out
    }
}

impl Default for Keccak256Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot Keccak-256.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
