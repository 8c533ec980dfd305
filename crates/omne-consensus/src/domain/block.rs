//! Blocks, attestations and the messages that carry them

use serde::{Deserialize, Serialize};
use shared_crypto::Keccak256Hasher;
use shared_types::{Hash, Layer, SlotId, ValidatorId};
use std::fmt;

const BLOCK_DOMAIN: &[u8] = b"omne/block";
const ATTESTATION_DOMAIN: &[u8] = b"omne/attestation";

/// Opaque signature bytes produced by the key port.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

/// A block of either layer.
///
/// Security blocks list the commerce block hashes they checkpoint in
/// `checkpointed`; commerce blocks leave it empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub layer: Layer,
    pub slot: SlotId,
    pub parent: Hash,
    pub proposer: ValidatorId,
    pub payload_commitment: Hash,
    pub checkpointed: Vec<Hash>,
    /// Proposer's signature over the validator-set epoch digest
    pub randao_reveal: Signature,
    /// Proposer's signature over `hash()`
    pub signature: Signature,
}

impl Block {
    /// Unsigned block; the coordinator fills in the reveal and signature.
    pub fn unsigned(
        slot: SlotId,
        parent: Hash,
        proposer: ValidatorId,
        payload_commitment: Hash,
        checkpointed: Vec<Hash>,
    ) -> Self {
        Self {
            layer: slot.layer,
            slot,
            parent,
            proposer,
            payload_commitment,
            checkpointed,
            randao_reveal: Signature::default(),
            signature: Signature::default(),
        }
    }

    /// Block hash, also the digest the proposer signs.
    ///
    /// Covers every field except the two signatures.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256Hasher::new();
        hasher
            .update(BLOCK_DOMAIN)
            .update_u8(self.layer.tag())
            .update_u64(self.slot.epoch)
            .update_u64(self.slot.index)
            .update_u64(self.slot.number)
            .update(&self.parent)
            .update(self.proposer.as_bytes())
            .update(&self.payload_commitment)
            .update_u64(self.checkpointed.len() as u64);
        for covered in &self.checkpointed {
            hasher.update(covered);
        }
        hasher.finalize()
    }
}

/// Source/target epochs of a security vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochRange {
    pub source_epoch: u64,
    pub target_epoch: u64,
}

impl EpochRange {
    pub fn new(source_epoch: u64, target_epoch: u64) -> Self {
        Self {
            source_epoch,
            target_epoch,
        }
    }

    /// Strict containment: `self.source < other.source` and `other.target < self.target`.
    pub fn surrounds(&self, other: &EpochRange) -> bool {
        self.source_epoch < other.source_epoch && other.target_epoch < self.target_epoch
    }
}

impl fmt::Display for EpochRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.source_epoch, self.target_epoch)
    }
}

/// A validator's vote for a block in a slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub layer: Layer,
    pub slot: SlotId,
    pub block_ref: Hash,
    pub validator: ValidatorId,
    /// `Some` for security attestations
    pub checkpoint_range: Option<EpochRange>,
    pub signature: Signature,
}

impl Attestation {
    pub fn unsigned(
        slot: SlotId,
        block_ref: Hash,
        validator: ValidatorId,
        checkpoint_range: Option<EpochRange>,
    ) -> Self {
        Self {
            layer: slot.layer,
            slot,
            block_ref,
            validator,
            checkpoint_range,
            signature: Signature::default(),
        }
    }

    /// Digest the validator signs; covers every field except the signature.
    pub fn digest(&self) -> Hash {
        let mut hasher = Keccak256Hasher::new();
        hasher
            .update(ATTESTATION_DOMAIN)
            .update_u8(self.layer.tag())
            .update_u64(self.slot.epoch)
            .update_u64(self.slot.index)
            .update_u64(self.slot.number)
            .update(&self.block_ref)
            .update(self.validator.as_bytes());
        match self.checkpoint_range {
            Some(range) => {
                hasher
                    .update_u8(1)
                    .update_u64(range.source_epoch)
                    .update_u64(range.target_epoch);
            }
            None => {
                hasher.update_u8(0);
            }
        }
        hasher.finalize()
    }
}

/// Consensus payload carried on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Proposal(Block),
    Attestation(Attestation),
}

impl ConsensusMessage {
    pub fn layer(&self) -> Layer {
        match self {
            ConsensusMessage::Proposal(block) => block.layer,
            ConsensusMessage::Attestation(att) => att.layer,
        }
    }

    pub fn slot(&self) -> SlotId {
        match self {
            ConsensusMessage::Proposal(block) => block.slot,
            ConsensusMessage::Attestation(att) => att.slot,
        }
    }

    /// Validator that signed the message.
    pub fn sender(&self) -> ValidatorId {
        match self {
            ConsensusMessage::Proposal(block) => block.proposer,
            ConsensusMessage::Attestation(att) => att.validator,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConsensusMessage::Proposal(_) => "proposal",
            ConsensusMessage::Attestation(_) => "attestation",
        }
    }
}

/// Inbound message as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMessage {
    pub network_id: u64,
    /// Validator-set epoch the sender was in
    pub epoch: u64,
    pub message: ConsensusMessage,
}

/// Outbound message handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub network_id: u64,
    pub epoch: u64,
    pub message: ConsensusMessage,
}

impl OutboundMessage {
    /// What a peer receives for this broadcast.
    pub fn to_inbound(&self) -> NetworkMessage {
        NetworkMessage {
            network_id: self.network_id,
            epoch: self.epoch,
            message: self.message.clone(),
        }
    }
}
