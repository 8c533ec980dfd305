//! # Attestation Pool
//!
//! Collects attestations per (layer, slot), keeps the first vote of each
//! validator, and aggregates stake per referenced block.
//!
//! Stake weight comes from the validator-set view of the layer at the time
//! the slot's pool was opened, so a rotation never re-weights votes already
//! counted.

use super::{Attestation, ValidatorSet};
use crate::config::QuorumThreshold;
use crate::error::{ConsensusError, ConsensusResult};
use bitvec::prelude::*;
use shared_types::{Hash, Layer, ValidatorId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Result of adding an attestation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttestationOutcome {
    /// First vote of this validator in this slot; counted
    Accepted,
    /// Same vote delivered again
    DuplicateIgnored,
    /// Slot already discarded (retention window or final checkpoint)
    Superseded,
    /// Validator already voted for a different block; the retained vote is
    /// returned as evidence
    Conflict { existing: Box<Attestation> },
}

/// Aggregated stake behind one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateWeight {
    pub weight: u128,
    pub total: u128,
    pub quorum: bool,
    pub participants: usize,
}

struct SlotPool {
    validators: Arc<ValidatorSet>,
    votes: HashMap<ValidatorId, Attestation>,
    weights: HashMap<Hash, u128>,
    participation: HashMap<Hash, BitVec<u8, Msb0>>,
}

impl SlotPool {
    fn new(validators: Arc<ValidatorSet>) -> Self {
        Self {
            validators,
            votes: HashMap::new(),
            weights: HashMap::new(),
            participation: HashMap::new(),
        }
    }
}

/// Attestation pool for both layers.
pub struct AttestationPool {
    quorum: QuorumThreshold,
    views: HashMap<Layer, Arc<ValidatorSet>>,
    pools: BTreeMap<(Layer, u64), SlotPool>,
    /// Slots strictly below the watermark have been discarded
    watermarks: HashMap<Layer, u64>,
}

impl AttestationPool {
    pub fn new(quorum: QuorumThreshold, validators: Arc<ValidatorSet>) -> Self {
        let views = Layer::ALL
            .iter()
            .map(|&layer| (layer, Arc::clone(&validators)))
            .collect();
        Self {
            quorum,
            views,
            pools: BTreeMap::new(),
            watermarks: HashMap::new(),
        }
    }

    /// Install the validator-set view used for slots opened from now on.
    pub fn set_validators(&mut self, layer: Layer, validators: Arc<ValidatorSet>) {
        self.views.insert(layer, validators);
    }

    pub fn watermark(&self, layer: Layer) -> u64 {
        self.watermarks.get(&layer).copied().unwrap_or(0)
    }

    /// Add an attestation.
    ///
    /// Unknown validators are rejected. Conflicting votes are never counted.
    pub fn add(&mut self, attestation: Attestation) -> ConsensusResult<AttestationOutcome> {
        let layer = attestation.layer;
        let slot = attestation.slot.number;

        if slot < self.watermark(layer) {
            return Ok(AttestationOutcome::Superseded);
        }

        let view = match self.views.get(&layer) {
            Some(view) => Arc::clone(view),
            None => return Err(ConsensusError::UnknownValidator(attestation.validator)),
        };
        let pool = self
            .pools
            .entry((layer, slot))
            .or_insert_with(|| SlotPool::new(view));

        let (index, stake) = match pool.validators.index_of(&attestation.validator) {
            Some(index) => (index, pool.validators.stake_of(&attestation.validator)),
            None => return Err(ConsensusError::UnknownValidator(attestation.validator)),
        };

        if let Some(existing) = pool.votes.get(&attestation.validator) {
            if existing.block_ref == attestation.block_ref {
                return Ok(AttestationOutcome::DuplicateIgnored);
            }
            return Ok(AttestationOutcome::Conflict {
                existing: Box::new(existing.clone()),
            });
        }

        let block_ref = attestation.block_ref;
        let validator_count = pool.validators.len();
        let weight = pool.weights.entry(block_ref).or_insert(0);
        *weight = weight.saturating_add(stake);
        let bits = pool
            .participation
            .entry(block_ref)
            .or_insert_with(|| bitvec![u8, Msb0; 0; validator_count]);
        bits.set(index, true);
        pool.votes.insert(attestation.validator, attestation);

        Ok(AttestationOutcome::Accepted)
    }

    /// Aggregate weight behind `block_ref` in a slot.
    pub fn aggregate(&self, layer: Layer, slot: u64, block_ref: &Hash) -> AggregateWeight {
        match self.pools.get(&(layer, slot)) {
            Some(pool) => {
                let weight = pool.weights.get(block_ref).copied().unwrap_or(0);
                let total = pool.validators.total_stake();
                AggregateWeight {
                    weight,
                    total,
                    quorum: self.quorum.is_reached(weight, total),
                    participants: pool
                        .participation
                        .get(block_ref)
                        .map(|bits| bits.count_ones())
                        .unwrap_or(0),
                }
            }
            None => AggregateWeight {
                weight: 0,
                total: self
                    .views
                    .get(&layer)
                    .map(|v| v.total_stake())
                    .unwrap_or(0),
                quorum: false,
                participants: 0,
            },
        }
    }

    /// Attestations retained for a block, in validator-set order.
    pub fn attestations_for(&self, layer: Layer, slot: u64, block_ref: &Hash) -> Vec<Attestation> {
        let Some(pool) = self.pools.get(&(layer, slot)) else {
            return Vec::new();
        };
        let mut votes: Vec<(usize, Attestation)> = pool
            .votes
            .values()
            .filter(|a| &a.block_ref == block_ref)
            .filter_map(|a| pool.validators.index_of(&a.validator).map(|i| (i, a.clone())))
            .collect();
        votes.sort_by_key(|(i, _)| *i);
        votes.into_iter().map(|(_, a)| a).collect()
    }

    /// Discard every pool of `layer` with slot `< slot`.
    pub fn discard_before(&mut self, layer: Layer, slot: u64) -> usize {
        if slot <= self.watermark(layer) {
            return 0;
        }
        let before = self.pools.len();
        self.pools.retain(|&(l, s), _| l != layer || s >= slot);
        self.watermarks.insert(layer, slot);
        before - self.pools.len()
    }

    /// Discard every pool of `layer` with slot `<= slot`.
    pub fn discard_through(&mut self, layer: Layer, slot: u64) -> usize {
        self.discard_before(layer, slot.saturating_add(1))
    }

    /// Open slot pools for a layer.
    pub fn pending_slots(&self, layer: Layer) -> usize {
        self.pools.keys().filter(|(l, _)| *l == layer).count()
    }

    pub fn len(&self) -> usize {
        self.pools.values().map(|p| p.votes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
