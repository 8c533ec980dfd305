//! # omne-consensus
//!
//! Dual-layer consensus core of the Omne validator.
//!
//! ## Architecture
//!
//! Two independently-timed layers share one validator set:
//!
//! - **Commerce layer**: short slots. The selected proposer extends the
//!   chain; a 2/3 stake quorum of attestations makes a block provisional.
//! - **Security layer**: long slots. Each checkpoint covers the commerce
//!   chain up to its provisional head; quorum makes the checkpoint and
//!   everything it covers irreversibly final.
//!
//! ```text
//!   SlotTicker(commerce) ─┐                       ┌─→ CommerceLayerEngine
//!   SlotTicker(security) ─┼─→ ConsensusCoordinator ┼─→ SecurityLayerEngine
//!   NetworkMessage ───────┘     (single writer)   ├─→ AttestationPool
//!                                                 └─→ SlashingProtector ─→ KeyValueStore
//! ```
//!
//! ### Proposer Selection
//!
//! Stake-weighted and deterministic: every node derives the same proposer
//! from the validator set, the epoch seed and the slot number. Seeds are
//! rotated from a RANDAO mix of finalized proposers' reveals.
//!
//! ### Slashing Protection
//!
//! No vote is signed or accepted before it has been checked for double and
//! surround votes and durably recorded.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use omne_consensus::{ConsensusConfig, ConsensusCoordinator, CoordinatorDependencies};
//!
//! let coordinator = ConsensusCoordinator::start(ConsensusConfig::devnet(), deps).await?;
//! let status = coordinator.status_handle();
//! tokio::spawn(coordinator.run(inbound_rx, shutdown_rx));
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use config::{ConsensusConfig, QuorumThreshold};
pub use domain::{
    select_proposer, Attestation, AttestationOutcome, AttestationPool, Block, BlockTree,
    ConsensusMessage, EpochRange, FinalityCheckpoint, FinalizedCheckpointRef, NetworkMessage,
    OutboundMessage, RandaoAccumulator, SlashableOffense, ValidatorInfo, ValidatorSet,
};
pub use engine::{
    CommerceLayerEngine, EnginePhase, SecurityLayerEngine, SkipReason, SlotClock, SlotOutcome,
};
pub use error::{ConsensusError, ConsensusResult};
pub use ports::{
    ConsensusApi, KeyValueStore, MessageDisposition, NetworkGateway, PayloadSource,
    SignatureVerifier, StatusHandle, StatusSnapshot, ValidatorKey, ValidatorSetProvider,
};
pub use service::{ConsensusCoordinator, ConsensusStore, CoordinatorDependencies};
