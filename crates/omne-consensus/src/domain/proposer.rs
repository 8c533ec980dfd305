//! Stake-weighted proposer selection
//!
//! `entropy = keccak(seed || layer_tag || slot_le)`; the first 16 bytes as a
//! big-endian `u128`, reduced modulo the eligible stake, pick a point on the
//! cumulative stake line. Integer arithmetic only, so every node agrees.

use super::ValidatorSet;
use crate::error::{ConsensusError, ConsensusResult};
use shared_crypto::Keccak256Hasher;
use shared_types::{Hash, Layer, ValidatorId};

/// Select the proposer of `slot` on `layer`.
///
/// Zero-stake validators are never selected. An empty set or zero total
/// stake yields `NoEligibleValidators`, and the slot is skipped.
pub fn select_proposer(
    layer: Layer,
    slot: u64,
    validators: &ValidatorSet,
    seed: &Hash,
) -> ConsensusResult<ValidatorId> {
    let mut cumulative: Vec<(u128, ValidatorId)> = Vec::with_capacity(validators.len());
    let mut total: u128 = 0;
    for info in validators.iter().filter(|v| v.stake > 0) {
        total = total.saturating_add(info.stake);
        cumulative.push((total, info.id));
    }

    if total == 0 {
        return Err(ConsensusError::NoEligibleValidators { layer, slot });
    }

    let point = selection_entropy(layer, slot, seed) % total;
    let idx = cumulative.partition_point(|&(upper, _)| upper <= point);

    cumulative
        .get(idx)
        .map(|&(_, id)| id)
        .ok_or(ConsensusError::NoEligibleValidators { layer, slot })
}

fn selection_entropy(layer: Layer, slot: u64, seed: &Hash) -> u128 {
    let mut hasher = Keccak256Hasher::new();
    hasher.update(seed).update_u8(layer.tag()).update_u64(slot);
    let digest = hasher.finalize();
    let mut high = [0u8; 16];
    high.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(high)
}
