//! # RANDAO Randomness
//!
//! Per-epoch proposer-selection seed.
//!
//! 1. Each proposer signs the validator-set epoch number (its reveal) and
//!    carries the signature in its block
//! 2. When a checkpoint finalizes, `mix ^= keccak(reveal)` for every block it
//!    made final, in chain order
//! 3. `next_seed = keccak(mix || next_epoch)`
//!
//! Only finalized blocks contribute, so every honest node derives the same
//! seed for the next epoch.

use shared_crypto::{keccak256, Keccak256Hasher};
use shared_types::Hash;

const REVEAL_DOMAIN: &[u8] = b"omne/randao-reveal";
const GENESIS_SEED_DOMAIN: &[u8] = b"omne/genesis-seed";

/// RANDAO accumulator for one validator-set epoch.
#[derive(Clone, Debug)]
pub struct RandaoAccumulator {
    /// Epoch whose seed is in effect
    epoch: u64,
    /// Seed in effect for `epoch`
    seed: Hash,
    /// Accumulated RANDAO mix
    mix: Hash,
    /// Number of contributions this epoch
    contributions: u64,
}

impl RandaoAccumulator {
    /// Create new accumulator for an epoch.
    pub fn new(epoch: u64, seed: Hash) -> Self {
        Self {
            epoch,
            seed,
            mix: seed,
            contributions: 0,
        }
    }

    /// Mix in a RANDAO reveal (signature over the epoch digest).
    pub fn mix_in(&mut self, reveal: &[u8]) {
        self.mix = xor_hashes(&self.mix, &keccak256(reveal));
        self.contributions += 1;
    }

    pub fn seed(&self) -> Hash {
        self.seed
    }

    pub fn mix(&self) -> Hash {
        self.mix
    }

    pub fn contributions(&self) -> u64 {
        self.contributions
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Advance to the next epoch; returns the new seed.
    pub fn advance_epoch(&mut self) -> Hash {
        self.epoch += 1;
        self.seed = hash_to_seed(&self.mix, self.epoch);
        self.mix = self.seed;
        self.contributions = 0;
        self.seed
    }
}

/// Digest a proposer signs as its RANDAO reveal for `epoch`.
pub fn reveal_digest(epoch: u64) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    hasher.update(REVEAL_DOMAIN).update_u64(epoch);
    hasher.finalize()
}

/// Seed of validator-set epoch zero.
pub fn genesis_seed(genesis_hash: &Hash, network_id: u64) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    hasher
        .update(GENESIS_SEED_DOMAIN)
        .update(genesis_hash)
        .update_u64(network_id);
    hasher.finalize()
}

fn xor_hashes(a: &Hash, b: &Hash) -> Hash {
    let mut result = [0u8; 32];
    for (out, (x, y)) in result.iter_mut().zip(a.iter().zip(b.iter())) {
        *out = x ^ y;
    }
    result
}

fn hash_to_seed(mix: &Hash, epoch: u64) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    hasher.update(mix).update_u64(epoch);
    hasher.finalize()
}
