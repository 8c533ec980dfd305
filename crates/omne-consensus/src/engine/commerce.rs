//! Commerce layer engine: short-slot block production.
//!
//! Every slot the selected proposer extends the head; everyone else waits
//! for that block and attests it. Quorum in the slot advances the
//! provisional head. Finality only arrives through a security checkpoint.

use super::{EngineCore, EpochView, SlotDuty, SlotOutcome};
use crate::config::ConsensusConfig;
use crate::domain::{Attestation, Block, BlockTree, ChainPoint};
use crate::error::{ConsensusError, ConsensusResult};
use shared_types::{Hash, Layer, SlotId, ValidatorId};

pub struct CommerceLayerEngine {
    core: EngineCore,
    chain: BlockTree,
}

impl CommerceLayerEngine {
    /// `root` is genesis or the last finalized commerce block.
    pub fn new(
        view: EpochView,
        self_id: Option<ValidatorId>,
        root: ChainPoint,
        config: &ConsensusConfig,
    ) -> Self {
        Self {
            core: EngineCore::new(
                Layer::Commerce,
                view,
                self_id,
                config.commerce_slots_per_epoch,
                config.max_slot_lag,
            ),
            chain: BlockTree::new(Layer::Commerce, root),
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

    /// Unsigned block for `slot` on top of the current head.
    pub fn build_proposal(&self, slot: SlotId, proposer: ValidatorId, payload: Hash) -> Block {
        Block::unsigned(slot, self.chain.head().hash, proposer, payload, Vec::new())
    }

    /// Structural checks of a commerce proposal (signatures are checked by
    /// the coordinator).
    pub fn validate_proposal(&self, block: &Block) -> ConsensusResult<()> {
        if block.layer != Layer::Commerce || block.slot.layer != Layer::Commerce {
            return Err(ConsensusError::invalid("not a commerce block"));
        }
        if !block.checkpointed.is_empty() {
            return Err(ConsensusError::invalid(
                "commerce block must not checkpoint anything",
            ));
        }
        self.core.check_slot_window(block.slot)?;

        let expected = self.core.expected_proposer(block.slot.number)?;
        if expected != block.proposer {
            return Err(ConsensusError::WrongProposer {
                layer: Layer::Commerce,
                slot: block.slot.number,
                expected,
                actual: block.proposer,
            });
        }

        self.chain.check_extends(&block.parent, block.slot)
    }

    /// Add a validated block. Returns false if it was already known.
    pub fn accept_proposal(&mut self, block: Block) -> ConsensusResult<bool> {
        let slot = block.slot;
        let hash = block.hash();
        let inserted = self.chain.insert(block)?;
        if inserted {
            self.core.note_proposal(slot, hash);
        }
        Ok(inserted)
    }

    /// Structural checks of a commerce attestation.
    pub fn validate_attestation(&self, attestation: &Attestation) -> ConsensusResult<()> {
        if attestation.layer != Layer::Commerce {
            return Err(ConsensusError::invalid("not a commerce attestation"));
        }
        if attestation.checkpoint_range.is_some() {
            return Err(ConsensusError::invalid(
                "commerce attestation must not carry a checkpoint range",
            ));
        }
        self.core.check_slot_window(attestation.slot)?;

        match self.chain.slot_of(&attestation.block_ref) {
            None => Err(ConsensusError::UnknownBlock {
                block: attestation.block_ref,
            }),
            Some(slot) if slot != attestation.slot => Err(ConsensusError::invalid(format!(
                "attestation for slot {} references block of slot {}",
                attestation.slot.number, slot.number
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Quorum reached for `block`. Returns true if the provisional head moved.
    pub fn on_quorum(&mut self, block: &Hash, slot: SlotId) -> bool {
        let advanced = self.chain.mark_provisional(block);
        self.core.note_quorum(slot, block);
        advanced
    }

    /// Move the finality barrier to a commerce block made final by a checkpoint.
    pub fn apply_finality(&mut self, block: &Hash) -> ConsensusResult<()> {
        self.chain.finalize(block)
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
