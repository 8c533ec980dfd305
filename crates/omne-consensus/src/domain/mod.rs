//! Domain layer: pure consensus rules, no I/O.

pub mod attestation_pool;
pub mod block;
pub mod chain;
pub mod checkpoint;
pub mod pending;
pub mod proposer;
pub mod randao;
pub mod slashing;
pub mod validator;

pub use attestation_pool::{AggregateWeight, AttestationOutcome, AttestationPool};
pub use block::{
    Attestation, Block, ConsensusMessage, EpochRange, NetworkMessage, OutboundMessage, Signature,
};
pub use chain::{BlockTree, ChainPoint};
pub use checkpoint::{CheckpointId, CheckpointState, FinalityCheckpoint, FinalizedCheckpointRef};
pub use pending::{Dependency, PendingMessages};
pub use proposer::select_proposer;
pub use randao::{genesis_seed, reveal_digest, RandaoAccumulator};
pub use slashing::{
    MessageKind, SignedVote, SlashableOffense, SlashingHistory, VoteCheck, VoteKey,
};
pub use validator::{ValidatorInfo, ValidatorSet};
