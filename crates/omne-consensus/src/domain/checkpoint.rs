//! Finality checkpoint entity
//!
//! A security block plus the commerce blocks it covers. State progression:
//! Pending → Final. Final is irreversible.

use super::Block;
use serde::{Deserialize, Serialize};
use shared_types::{Hash, SlotId};

/// Unique identifier for a checkpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId {
    pub epoch: u64,
    pub block_hash: Hash,
}

/// Checkpoint finality state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckpointState {
    /// Awaiting attestations
    #[default]
    Pending,
    /// Quorum reached; irreversible
    Final,
}

/// A security-layer checkpoint awaiting or having reached quorum.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinalityCheckpoint {
    /// Security epoch of the checkpoint slot
    pub epoch: u64,
    pub slot: SlotId,
    pub block_hash: Hash,
    /// Commerce blocks made final with this checkpoint, in chain order
    pub covered: Vec<Hash>,
    pub state: CheckpointState,
    pub attested_weight: u128,
    pub total_weight: u128,
}

impl FinalityCheckpoint {
    /// Create a pending checkpoint for a security block.
    pub fn new(block: &Block, total_weight: u128) -> Self {
        Self {
            epoch: block.slot.epoch,
            slot: block.slot,
            block_hash: block.hash(),
            covered: block.checkpointed.clone(),
            state: CheckpointState::Pending,
            attested_weight: 0,
            total_weight,
        }
    }

    pub fn id(&self) -> CheckpointId {
        CheckpointId {
            epoch: self.epoch,
            block_hash: self.block_hash,
        }
    }

    pub fn is_final(&self) -> bool {
        self.state == CheckpointState::Final
    }

    /// Record the aggregated weight reported by the attestation pool.
    ///
    /// Weight never decreases.
    pub fn record_weight(&mut self, weight: u128) {
        self.attested_weight = self.attested_weight.max(weight);
    }

    /// Mark final. Returns true only on the Pending → Final transition.
    pub fn finalize(&mut self) -> bool {
        if self.state == CheckpointState::Pending {
            self.state = CheckpointState::Final;
            true
        } else {
            false
        }
    }

    /// Last commerce block this checkpoint makes final.
    pub fn last_covered(&self) -> Option<&Hash> {
        self.covered.last()
    }

    /// Attested weight as a percentage of total, for logs and metrics.
    pub fn participation_percent(&self) -> f64 {
        if self.total_weight == 0 {
            return 0.0;
        }
        (self.attested_weight as f64 / self.total_weight as f64) * 100.0
    }
}

/// Persisted record of the latest finalized checkpoint.
///
/// Restores both finality barriers and the validator-set epoch on restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedCheckpointRef {
    pub epoch: u64,
    pub security_slot: SlotId,
    pub security_hash: Hash,
    /// Last finalized commerce block (may predate this checkpoint)
    pub commerce_slot: SlotId,
    pub commerce_hash: Hash,
    /// Validator-set epoch in effect after this checkpoint
    pub validator_epoch: u64,
    /// Proposer-selection seed for `validator_epoch`
    pub seed: Hash,
}
