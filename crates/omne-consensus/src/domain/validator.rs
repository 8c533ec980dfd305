//! Validator domain entities

use serde::{Deserialize, Serialize};
use shared_types::{PublicKey, ValidatorId};
use std::collections::HashMap;

/// Validator set with stake information.
///
/// Immutable for the lifetime of a validator-set epoch; engines share it
/// behind an `Arc`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorSet {
    epoch: u64,
    validators: Vec<ValidatorInfo>,
    total_stake: u128,
    /// Quick lookup by validator ID
    #[serde(skip)]
    lookup: HashMap<ValidatorId, usize>,
}

impl ValidatorSet {
    /// Create a new validator set.
    ///
    /// Order is preserved; a repeated identity keeps its first entry.
    pub fn new(epoch: u64, validators: Vec<ValidatorInfo>) -> Self {
        let mut unique = Vec::with_capacity(validators.len());
        let mut lookup = HashMap::with_capacity(validators.len());
        for info in validators {
            if lookup.contains_key(&info.id) {
                continue;
            }
            lookup.insert(info.id, unique.len());
            unique.push(info);
        }
        let total_stake = unique
            .iter()
            .fold(0u128, |acc: u128, v| acc.saturating_add(v.stake));
        Self {
            epoch,
            validators: unique,
            total_stake,
            lookup,
        }
    }

    /// Same members, stamped with another epoch.
    pub fn with_epoch(&self, epoch: u64) -> Self {
        Self::new(epoch, self.validators.clone())
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Total stake, the quorum denominator.
    pub fn total_stake(&self) -> u128 {
        self.total_stake
    }

    pub fn contains(&self, validator_id: &ValidatorId) -> bool {
        self.lookup.contains_key(validator_id)
    }

    /// Get validator info by ID
    pub fn get(&self, validator_id: &ValidatorId) -> Option<&ValidatorInfo> {
        self.lookup
            .get(validator_id)
            .and_then(|&idx| self.validators.get(idx))
    }

    /// Position in set order, used for participation bitmaps.
    pub fn index_of(&self, validator_id: &ValidatorId) -> Option<usize> {
        self.lookup.get(validator_id).copied()
    }

    /// Stake of a member, zero for non-members.
    pub fn stake_of(&self, validator_id: &ValidatorId) -> u128 {
        self.get(validator_id).map(|v| v.stake).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatorInfo> {
        self.validators.iter()
    }

    /// Rebuild the lookup table (after deserialization)
    pub fn rebuild_lookup(&mut self) {
        self.lookup = self
            .validators
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id, i))
            .collect();
    }
}

/// Individual validator information
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub id: ValidatorId,
    pub stake: u128,
    pub public_key: PublicKey,
}

impl ValidatorInfo {
    pub fn new(id: ValidatorId, stake: u128, public_key: PublicKey) -> Self {
        Self {
            id,
            stake,
            public_key,
        }
    }
}
