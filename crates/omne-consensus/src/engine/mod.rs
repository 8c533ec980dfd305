//! # Layer Engines
//!
//! One state machine per layer. Both share `EngineCore` for slot
//! bookkeeping; the layer-specific parts (what a proposal contains and how
//! it is validated) live in `commerce` and `security`.
//!
//! ```text
//! Idle → AwaitingSlot → (Proposing | Attesting) → AwaitingQuorum → SlotComplete → AwaitingSlot
//!                                    any ──safety failure──→ Halted
//!                                    any ──shutdown──→ Stopped
//! ```
//!
//! Engines never sign or send anything themselves; the coordinator does,
//! after slashing protection.

pub mod clock;
pub mod commerce;
pub mod security;

pub use clock::SlotClock;
pub use commerce::CommerceLayerEngine;
pub use security::{checkpoint_commitment, SecurityLayerEngine};

use crate::domain::{select_proposer, ValidatorSet};
use crate::error::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use shared_types::{Hash, Layer, SlotId, ValidatorId};
use std::sync::Arc;

/// Engine state machine phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnginePhase {
    Idle,
    AwaitingSlot,
    Proposing,
    Attesting,
    AwaitingQuorum,
    SlotComplete,
    Halted,
    Stopped,
}

/// Read-only validator-set view handed to an engine by the coordinator.
#[derive(Clone, Debug)]
pub struct EpochView {
    pub epoch: u64,
    pub validators: Arc<ValidatorSet>,
    pub seed: Hash,
}

/// What this node has to do in a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotDuty {
    /// This node is the proposer
    Propose,
    /// Wait for `proposer`'s block
    Await { proposer: ValidatorId },
    /// Nobody can propose
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoProposal,
    NoQuorum,
    NoEligibleValidators,
}

/// How a slot ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    Completed { slot: SlotId, block: Hash },
    Skipped { slot: SlotId, reason: SkipReason },
}

impl SlotOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, SlotOutcome::Skipped { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub proposed: u64,
    pub attested: u64,
    pub completed: u64,
    pub skipped: u64,
}

#[derive(Clone, Debug)]
struct SlotProgress {
    slot: SlotId,
    proposer: Option<ValidatorId>,
    proposal: Option<Hash>,
    attested: bool,
    quorum: bool,
}

/// Slot bookkeeping shared by both layer engines.
pub struct EngineCore {
    layer: Layer,
    phase: EnginePhase,
    view: EpochView,
    self_id: Option<ValidatorId>,
    current: Option<SlotProgress>,
    stats: EngineStats,
    halt_reason: Option<String>,
    slots_per_epoch: u64,
    max_slot_lag: u64,
}

impl EngineCore {
    pub fn new(
        layer: Layer,
        view: EpochView,
        self_id: Option<ValidatorId>,
        slots_per_epoch: u64,
        max_slot_lag: u64,
    ) -> Self {
        Self {
            layer,
            phase: EnginePhase::Idle,
            view,
            self_id,
            current: None,
            stats: EngineStats::default(),
            halt_reason: None,
            slots_per_epoch,
            max_slot_lag,
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn view(&self) -> &EpochView {
        &self.view
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn current_slot(&self) -> Option<SlotId> {
        self.current.as_ref().map(|c| c.slot)
    }

    pub fn current_proposer(&self) -> Option<ValidatorId> {
        self.current.as_ref().and_then(|c| c.proposer)
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, EnginePhase::Halted | EnginePhase::Stopped)
    }

    pub fn ensure_active(&self) -> ConsensusResult<()> {
        match self.phase {
            EnginePhase::Halted => Err(ConsensusError::LayerHalted(self.layer)),
            EnginePhase::Stopped => Err(ConsensusError::ShuttingDown),
            _ => Ok(()),
        }
    }

    /// Install the view of a new validator-set epoch.
    pub fn refresh_view(&mut self, view: EpochView) {
        self.view = view;
    }

    /// Proposer selected for `slot` under the current view.
    pub fn expected_proposer(&self, slot: u64) -> ConsensusResult<ValidatorId> {
        select_proposer(self.layer, slot, &self.view.validators, &self.view.seed)
    }

    /// True if this node holds stake in the current view.
    pub fn is_validator(&self) -> bool {
        self.self_id
            .map(|id| self.view.validators.contains(&id))
            .unwrap_or(false)
    }

    /// Reject slots from the future, slots more than `max_slot_lag`
    /// behind, and slot ids whose epoch/index disagree with the number.
    pub fn check_slot_window(&self, slot: SlotId) -> ConsensusResult<()> {
        if slot.layer != self.layer {
            return Err(ConsensusError::invalid(format!(
                "{} slot sent to {} engine",
                slot.layer, self.layer
            )));
        }
        if SlotId::from_number(self.layer, slot.number, self.slots_per_epoch) != slot {
            return Err(ConsensusError::invalid(format!(
                "slot id {} is inconsistent with {} slots per epoch",
                slot, self.slots_per_epoch
            )));
        }
        let current = self.current_slot().map(|s| s.number);
        match current {
            Some(c) if slot.number <= c && c - slot.number <= self.max_slot_lag => Ok(()),
            _ => Err(ConsensusError::SlotOutOfRange {
                layer: self.layer,
                slot: slot.number,
                current,
                max_lag: self.max_slot_lag,
            }),
        }
    }

    /// Start a slot and report this node's duty.
    pub fn begin_slot(&mut self, slot: SlotId) -> ConsensusResult<SlotDuty> {
        self.ensure_active()?;
        let mut progress = SlotProgress {
            slot,
            proposer: None,
            proposal: None,
            attested: false,
            quorum: false,
        };

        let duty = match self.expected_proposer(slot.number) {
            Ok(proposer) => {
                progress.proposer = Some(proposer);
                if Some(proposer) == self.self_id {
                    self.phase = EnginePhase::Proposing;
                    SlotDuty::Propose
                } else {
                    self.phase = EnginePhase::Attesting;
                    SlotDuty::Await { proposer }
                }
            }
            Err(ConsensusError::NoEligibleValidators { .. }) => {
                self.phase = EnginePhase::AwaitingSlot;
                SlotDuty::Skip
            }
            Err(e) => return Err(e),
        };

        self.current = Some(progress);
        Ok(duty)
    }

    /// Close the current slot.
    pub fn end_slot(&mut self) -> Option<SlotOutcome> {
        let progress = self.current.take()?;
        let outcome = match (progress.proposer, progress.proposal, progress.quorum) {
            (_, Some(block), true) => SlotOutcome::Completed {
                slot: progress.slot,
                block,
            },
            (_, Some(_), false) => SlotOutcome::Skipped {
                slot: progress.slot,
                reason: SkipReason::NoQuorum,
            },
            (None, None, _) => SlotOutcome::Skipped {
                slot: progress.slot,
                reason: SkipReason::NoEligibleValidators,
            },
            (Some(_), None, _) => SlotOutcome::Skipped {
                slot: progress.slot,
                reason: SkipReason::NoProposal,
            },
        };

        match outcome {
            SlotOutcome::Completed { .. } => self.stats.completed += 1,
            SlotOutcome::Skipped { .. } => self.stats.skipped += 1,
        }
        if self.is_active() {
            self.phase = EnginePhase::AwaitingSlot;
        }
        Some(outcome)
    }

    /// Record the accepted proposal of `slot`, if it is the current slot.
    pub fn note_proposal(&mut self, slot: SlotId, block: Hash) {
        let Some(progress) = self.current.as_mut() else {
            return;
        };
        if progress.slot != slot || progress.proposal.is_some() {
            return;
        }
        progress.proposal = Some(block);
        if matches!(self.phase, EnginePhase::Proposing | EnginePhase::Attesting) {
            self.phase = EnginePhase::AwaitingQuorum;
        }
    }

    /// True if this node should attest `block` now.
    pub fn should_attest(&self, slot: SlotId, block: &Hash) -> bool {
        if !self.is_active() || !self.is_validator() {
            return false;
        }
        self.current
            .as_ref()
            .map(|c| c.slot == slot && c.proposal.as_ref() == Some(block) && !c.attested)
            .unwrap_or(false)
    }

    pub fn mark_proposed(&mut self) {
        self.stats.proposed += 1;
    }

    pub fn mark_attested(&mut self, slot: SlotId) {
        if let Some(progress) = self.current.as_mut() {
            if progress.slot == slot {
                progress.attested = true;
            }
        }
        self.stats.attested += 1;
    }

    /// Record quorum for `block` in `slot`.
    pub fn note_quorum(&mut self, slot: SlotId, block: &Hash) {
        let active = self.is_active();
        let Some(progress) = self.current.as_mut() else {
            return;
        };
        if progress.slot == slot && progress.proposal.as_ref() == Some(block) {
            progress.quorum = true;
            if active {
                self.phase = EnginePhase::SlotComplete;
            }
        }
    }

    /// A proposal of the current slot is still collecting attestations.
    pub fn has_in_flight_round(&self) -> bool {
        self.is_active()
            && self
                .current
                .as_ref()
                .map(|c| c.proposal.is_some() && !c.quorum)
                .unwrap_or(false)
    }

    /// Stop producing; only a restart clears a halt.
    pub fn halt(&mut self, reason: impl Into<String>) {
        if self.phase != EnginePhase::Stopped {
            self.phase = EnginePhase::Halted;
            self.halt_reason = Some(reason.into());
        }
    }

    pub fn stop(&mut self) {
        self.phase = EnginePhase::Stopped;
    }
}
