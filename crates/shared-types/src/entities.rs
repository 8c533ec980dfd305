//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `ValidatorId`, `PublicKey`
//! - **Time**: `Layer`, `SlotId`
//! - **Hashing**: `Hash`

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte hash (Keccak-256).
pub type Hash = [u8; 32];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// The all-zero hash, used as the parent of genesis.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Validator identity (32 bytes, the validator's public key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ValidatorId(pub [u8; 32]);

impl ValidatorId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for ValidatorId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorId({})", self.short())
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The two independently-timed consensus layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    /// Short-slot block production.
    Commerce,
    /// Long-slot finality checkpoints.
    Security,
}

impl Layer {
    pub const ALL: [Layer; 2] = [Layer::Commerce, Layer::Security];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Commerce => "commerce",
            Layer::Security => "security",
        }
    }

    /// Single-byte tag used in hashes and storage keys.
    pub fn tag(&self) -> u8 {
        match self {
            Layer::Commerce => 0x01,
            Layer::Security => 0x02,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slot of one layer, identified by (layer, epoch, index).
///
/// `number` is the absolute slot number; `epoch * slots_per_epoch + index == number`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId {
    pub layer: Layer,
    pub epoch: u64,
    pub index: u64,
    pub number: u64,
}

impl SlotId {
    /// Build a slot id from an absolute slot number.
    pub fn from_number(layer: Layer, number: u64, slots_per_epoch: u64) -> Self {
        let per_epoch = slots_per_epoch.max(1);
        Self {
            layer,
            epoch: number / per_epoch,
            index: number % per_epoch,
            number,
        }
    }

    /// Slot zero of a layer (genesis).
    pub fn genesis(layer: Layer) -> Self {
        Self {
            layer,
            epoch: 0,
            index: 0,
            number: 0,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} (epoch {}, index {})",
            self.layer, self.number, self.epoch, self.index
        )
    }
}
