//! Security layer engine: long-slot finality checkpoints.
//!
//! A checkpoint covers the commerce chain segment from the last finalized
//! commerce block (exclusive) to the commerce provisional head (inclusive).
//! Attestations carry `source = last final checkpoint epoch` and
//! `target = checkpoint epoch`. Quorum makes the checkpoint and everything
//! it covers final.

use super::{EngineCore, EpochView, SlotDuty, SlotOutcome};
use crate::config::ConsensusConfig;
use crate::domain::{
    Attestation, Block, BlockTree, ChainPoint, EpochRange, FinalityCheckpoint,
};
use crate::error::{ConsensusError, ConsensusResult};
use shared_crypto::Keccak256Hasher;
use shared_types::{Hash, Layer, SlotId, ValidatorId};
use std::collections::HashMap;
use tracing::debug;

const CHECKPOINT_DOMAIN: &[u8] = b"omne/checkpoint";

/// Payload commitment of a checkpoint: hash of the covered commerce hashes.
pub fn checkpoint_commitment(covered: &[Hash]) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    hasher
        .update(CHECKPOINT_DOMAIN)
        .update_u64(covered.len() as u64);
    for hash in covered {
        hasher.update(hash);
    }
    hasher.finalize()
}

pub struct SecurityLayerEngine {
    core: EngineCore,
    chain: BlockTree,
    checkpoints: HashMap<Hash, FinalityCheckpoint>,
    last_final_epoch: u64,
}

impl SecurityLayerEngine {
    /// `root` is genesis or the last finalized security block.
    pub fn new(
        view: EpochView,
        self_id: Option<ValidatorId>,
        root: ChainPoint,
        last_final_epoch: u64,
        config: &ConsensusConfig,
    ) -> Self {
        Self {
            core: EngineCore::new(
                Layer::Security,
                view,
                self_id,
                config.security_slots_per_epoch,
                config.max_slot_lag,
            ),
            chain: BlockTree::new(Layer::Security, root),
            checkpoints: HashMap::new(),
            last_final_epoch,
        }
    }

    pub fn core(&self) -> &EngineCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut EngineCore {
        &mut self.core
    }

    pub fn chain(&self) -> &BlockTree {
        &self.chain
    }

    pub fn begin_slot(&mut self, slot: SlotId) -> ConsensusResult<SlotDuty> {
        self.core.begin_slot(slot)
    }

    pub fn end_slot(&mut self) -> Option<SlotOutcome> {
        self.core.end_slot()
    }

    pub fn last_final_epoch(&self) -> u64 {
        self.last_final_epoch
    }

    pub fn checkpoint(&self, block: &Hash) -> Option<&FinalityCheckpoint> {
        self.checkpoints.get(block)
    }

    pub fn pending_checkpoints(&self) -> usize {
        self.checkpoints.len()
    }

    /// Unsigned checkpoint for `slot` covering the commerce chain from its
    /// finalized block to its provisional head. May cover nothing.
    pub fn build_checkpoint(
        &self,
        slot: SlotId,
        proposer: ValidatorId,
        commerce: &BlockTree,
    ) -> Block {
        let covered = commerce
            .segment(&commerce.finalized().hash, &commerce.provisional_head().hash)
            .unwrap_or_default();
        Block::unsigned(
            slot,
            self.chain.head().hash,
            proposer,
            checkpoint_commitment(&covered),
            covered,
        )
    }

    /// Structural checks of a checkpoint proposal against both chains.
    pub fn validate_proposal(&self, block: &Block, commerce: &BlockTree) -> ConsensusResult<()> {
        if block.layer != Layer::Security || block.slot.layer != Layer::Security {
            return Err(ConsensusError::invalid("not a security block"));
        }
        self.core.check_slot_window(block.slot)?;

        let expected = self.core.expected_proposer(block.slot.number)?;
        if expected != block.proposer {
            return Err(ConsensusError::WrongProposer {
                layer: Layer::Security,
                slot: block.slot.number,
                expected,
                actual: block.proposer,
            });
        }

        self.chain.check_extends(&block.parent, block.slot)?;

        if block.payload_commitment != checkpoint_commitment(&block.checkpointed) {
            return Err(ConsensusError::invalid(
                "checkpoint commitment does not match covered blocks",
            ));
        }
        Self::validate_covered(&block.checkpointed, commerce)
    }

    /// Covered hashes must be known and form a contiguous parent chain that
    /// starts right after the finalized commerce block.
    fn validate_covered(covered: &[Hash], commerce: &BlockTree) -> ConsensusResult<()> {
        let mut expected_parent = commerce.finalized().hash;
        for hash in covered {
            let block = commerce
                .block(hash)
                .ok_or(ConsensusError::UnknownBlock { block: *hash })?;
            if block.parent != expected_parent {
                return Err(ConsensusError::invalid(format!(
                    "checkpoint segment breaks at {}",
                    hex::encode(&hash[..4])
                )));
            }
            expected_parent = *hash;
        }
        Ok(())
    }

    /// Add a validated checkpoint. Returns false if it was already known.
    pub fn accept_proposal(&mut self, block: Block, total_weight: u128) -> ConsensusResult<bool> {
        let slot = block.slot;
        let hash = block.hash();
        let checkpoint = FinalityCheckpoint::new(&block, total_weight);
        let inserted = self.chain.insert(block)?;
        if inserted {
            self.checkpoints.insert(hash, checkpoint);
            self.core.note_proposal(slot, hash);
        }
        Ok(inserted)
    }

    /// Range this node attaches to its attestation of `block`.
    pub fn attestation_range(&self, block: &Block) -> EpochRange {
        EpochRange::new(self.last_final_epoch, block.slot.epoch)
    }

    /// Structural checks of a security attestation.
    pub fn validate_attestation(&self, attestation: &Attestation) -> ConsensusResult<()> {
        if attestation.layer != Layer::Security {
            return Err(ConsensusError::invalid("not a security attestation"));
        }
        let range = attestation
            .checkpoint_range
            .ok_or_else(|| ConsensusError::invalid("security attestation without range"))?;
        if range.source_epoch > range.target_epoch {
            return Err(ConsensusError::invalid(format!(
                "source epoch after target epoch in {}",
                range
            )));
        }
        self.core.check_slot_window(attestation.slot)?;

        let checkpoint = self
            .checkpoints
            .get(&attestation.block_ref)
            .ok_or(ConsensusError::UnknownBlock {
                block: attestation.block_ref,
            })?;
        if checkpoint.slot != attestation.slot || checkpoint.epoch != range.target_epoch {
            return Err(ConsensusError::invalid(format!(
                "attestation {} / slot {} does not match checkpoint epoch {} slot {}",
                range, attestation.slot.number, checkpoint.epoch, checkpoint.slot.number
            )));
        }
        Ok(())
    }

    /// Quorum reached for a checkpoint.
    ///
    /// Returns the checkpoint if this call made it final.
    pub fn on_quorum(
        &mut self,
        block: &Hash,
        weight: u128,
    ) -> ConsensusResult<Option<FinalityCheckpoint>> {
        if !self.chain.contains(block) {
            // Pruned by an earlier finalization
            self.checkpoints.remove(block);
            return Ok(None);
        }
        let Some(checkpoint) = self.checkpoints.get_mut(block) else {
            return Ok(None);
        };
        checkpoint.record_weight(weight);
        if !checkpoint.finalize() {
            return Ok(None);
        }
        let checkpoint = checkpoint.clone();

        self.chain.mark_provisional(block);
        self.chain.finalize(block)?;
        self.core.note_quorum(checkpoint.slot, block);
        self.last_final_epoch = self.last_final_epoch.max(checkpoint.epoch);

        let chain = &self.chain;
        let before = self.checkpoints.len();
        self.checkpoints
            .retain(|hash, cp| cp.slot.number > checkpoint.slot.number && chain.contains(hash));
        debug!(
            "[consensus] security checkpoint {} final, dropped {} stale checkpoints",
            checkpoint.slot.number,
            before - self.checkpoints.len()
        );

        Ok(Some(checkpoint))
    }

    /// Trim the covered lists of pending checkpoints to blocks above the
    /// commerce finality barrier.
    ///
    /// Called after the commerce barrier moved; blocks at or below it are
    /// already final and have been pruned from `commerce`.
    pub fn rebase_pending(&mut self, commerce: &BlockTree) -> usize {
        let barrier = commerce.finalized().hash;
        let mut trimmed = 0;
        for checkpoint in self.checkpoints.values_mut() {
            let before = checkpoint.covered.len();
            checkpoint
                .covered
                .retain(|hash| *hash != barrier && commerce.is_descendant(hash, &barrier));
            trimmed += before - checkpoint.covered.len();
        }
        trimmed
    }

    pub fn head(&self) -> ChainPoint {
        self.chain.head()
    }

    pub fn provisional_head(&self) -> ChainPoint {
        self.chain.provisional_head()
    }

    pub fn finalized(&self) -> ChainPoint {
        self.chain.finalized()
    }
}
