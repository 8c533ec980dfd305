//! Static validator-set and payload sources.

use crate::domain::{ValidatorInfo, ValidatorSet};
use crate::ports::{PayloadSource, PortError, ValidatorSetProvider};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_crypto::Keccak256Hasher;
use shared_types::{Hash, SlotId};
use std::collections::HashSet;
use std::sync::Arc;

/// Serves the same members for every epoch.
///
/// `fail_epoch` makes lookups of one epoch fail, for exercising the halt
/// path when the set cannot be determined.
#[derive(Clone)]
pub struct StaticValidatorSetProvider {
    validators: Vec<ValidatorInfo>,
    failing: Arc<RwLock<HashSet<u64>>>,
}

impl StaticValidatorSetProvider {
    pub fn new(validators: Vec<ValidatorInfo>) -> Self {
        Self {
            validators,
            failing: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn fail_epoch(&self, epoch: u64) {
        self.failing.write().insert(epoch);
    }
}

#[async_trait]
impl ValidatorSetProvider for StaticValidatorSetProvider {
    async fn validator_set_at_epoch(&self, epoch: u64) -> Result<ValidatorSet, PortError> {
        if self.failing.read().contains(&epoch) {
            return Err(PortError::ValidatorSource(format!(
                "no validator set for epoch {}",
                epoch
            )));
        }
        Ok(ValidatorSet::new(epoch, self.validators.clone()))
    }
}

/// Payload commitment derived from the slot alone.
///
/// Stands in for a block-body builder when running the consensus core on
/// its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotPayloadSource;

impl PayloadSource for SlotPayloadSource {
    fn payload_commitment(&self, slot: SlotId) -> Result<Hash, PortError> {
        let mut hasher = Keccak256Hasher::new();
        hasher
            .update(b"omne/empty-payload")
            .update_u8(slot.layer.tag())
            .update_u64(slot.number);
        Ok(hasher.finalize())
    }
}
