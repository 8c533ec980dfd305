//! Error types for the consensus core
//!
//! Inbound validation failures are reported back as a rejected
//! disposition and never stop the coordinator loop. `StorageUnavailable`
//! and `ValidatorSetUnavailable` are safety halts for the affected layer.

use crate::domain::SlashableOffense;
use shared_types::{Hash, KVStoreError, Layer, ValidatorId};
use thiserror::Error;

/// Consensus errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// Structurally invalid message
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// Proposal references a parent this node has never accepted
    #[error("Unknown parent block: {}", hex::encode(.parent))]
    UnknownParent { parent: Hash },

    /// Attestation references a block this node has never accepted
    #[error("Unknown block referenced by attestation: {}", hex::encode(.block))]
    UnknownBlock { block: Hash },

    /// Proposal would revert finalized history
    #[error("Block conflicts with finalized history at {layer} slot {finalized_slot}")]
    ConflictsWithFinality { layer: Layer, finalized_slot: u64 },

    /// Proposal signed by a validator that was not selected for the slot
    #[error("Wrong proposer for {layer} slot {slot}: expected {expected:?}, got {actual:?}")]
    WrongProposer {
        layer: Layer,
        slot: u64,
        expected: ValidatorId,
        actual: ValidatorId,
    },

    /// Slot is in the future or too far behind the current slot
    #[error("{layer} slot {slot} outside accepted window (current {current:?}, max lag {max_lag})")]
    SlotOutOfRange {
        layer: Layer,
        slot: u64,
        current: Option<u64>,
        max_lag: u64,
    },

    /// Sender is not in the active validator set
    #[error("Unknown validator: {0:?}")]
    UnknownValidator(ValidatorId),

    /// Signature or RANDAO reveal does not verify
    #[error("Invalid signature from validator {0:?}")]
    InvalidSignature(ValidatorId),

    /// Double vote or surround vote
    #[error("Slashable offense: {0}")]
    Slashable(Box<SlashableOffense>),

    /// Nobody with stake can propose
    #[error("No eligible validators for {layer} slot {slot}")]
    NoEligibleValidators { layer: Layer, slot: u64 },

    /// Slashing-protection storage could not be read or written
    #[error("Slashing protection storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Validator set source failed
    #[error("Validator set unavailable for epoch {epoch}: {reason}")]
    ValidatorSetUnavailable { epoch: u64, reason: String },

    /// Message stamped for another network
    #[error("Network mismatch: expected {expected}, got {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    /// Message stamped for another validator-set epoch
    #[error("Epoch mismatch: expected {expected}, got {actual}")]
    EpochMismatch { expected: u64, actual: u64 },

    /// Layer engine halted after a safety failure
    #[error("{0} layer is halted")]
    LayerHalted(Layer),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Encoding/decoding of persisted records failed
    #[error("Codec error: {0}")]
    Codec(String),

    /// Coordinator no longer accepts new work
    #[error("Consensus is shutting down")]
    ShuttingDown,
}

impl ConsensusError {
    /// True for errors that must halt the affected layer.
    pub fn is_safety_halt(&self) -> bool {
        matches!(
            self,
            ConsensusError::StorageUnavailable(_) | ConsensusError::ValidatorSetUnavailable { .. }
        )
    }

    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ConsensusError::InvalidMessage { .. } => "invalid_message",
            ConsensusError::UnknownParent { .. } => "unknown_parent",
            ConsensusError::UnknownBlock { .. } => "unknown_block",
            ConsensusError::ConflictsWithFinality { .. } => "conflicts_with_finality",
            ConsensusError::WrongProposer { .. } => "wrong_proposer",
            ConsensusError::SlotOutOfRange { .. } => "slot_out_of_range",
            ConsensusError::UnknownValidator(_) => "unknown_validator",
            ConsensusError::InvalidSignature(_) => "invalid_signature",
            ConsensusError::Slashable(_) => "slashable",
            ConsensusError::NoEligibleValidators { .. } => "no_eligible_validators",
            ConsensusError::StorageUnavailable(_) => "storage_unavailable",
            ConsensusError::ValidatorSetUnavailable { .. } => "validator_set_unavailable",
            ConsensusError::NetworkMismatch { .. } => "network_mismatch",
            ConsensusError::EpochMismatch { .. } => "epoch_mismatch",
            ConsensusError::LayerHalted(_) => "layer_halted",
            ConsensusError::InvalidConfig(_) => "invalid_config",
            ConsensusError::Codec(_) => "codec",
            ConsensusError::ShuttingDown => "shutting_down",
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ConsensusError::InvalidMessage {
            reason: reason.into(),
        }
    }
}

impl From<KVStoreError> for ConsensusError {
    fn from(e: KVStoreError) -> Self {
        ConsensusError::StorageUnavailable(e.to_string())
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(e: bincode::Error) -> Self {
        ConsensusError::Codec(e.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
