//! Inbound ports (driving side)
//!
//! What the node runtime, the transport and the RPC server may ask of the
//! consensus core.

use crate::domain::{FinalizedCheckpointRef, NetworkMessage};
use crate::engine::{EnginePhase, EngineStats, SlotOutcome};
use crate::error::{ConsensusError, ConsensusResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{Hash, Layer, NodeHealth, SlotId};
use tokio::sync::watch;

/// Result of handling one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageDisposition {
    Accepted,
    /// Already seen, or for a slot already discarded
    Duplicate,
    /// Held until its block or validator epoch arrives, then replayed
    Pending,
    Rejected(ConsensusError),
}

impl MessageDisposition {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MessageDisposition::Accepted)
    }

    pub fn rejection(&self) -> Option<&ConsensusError> {
        match self {
            MessageDisposition::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-layer part of the status snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerStatus {
    pub layer: Layer,
    pub phase: EnginePhase,
    pub current_slot: Option<SlotId>,
    pub head: Hash,
    pub head_slot: u64,
    pub provisional_head: Hash,
    pub provisional_slot: u64,
    pub finalized: Hash,
    pub finalized_slot: u64,
    pub stats: EngineStats,
}

/// Read-only view published after every state change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub network_id: u64,
    pub validator_epoch: u64,
    pub is_validator: bool,
    pub commerce: LayerStatus,
    pub security: LayerStatus,
    pub last_finalized: Option<FinalizedCheckpointRef>,
    pub slashing_offenses: usize,
    pub messages_accepted: u64,
    pub messages_rejected: u64,
    /// Inbound messages held for a missing block or the next epoch
    pub pending_messages: usize,
    pub health: NodeHealth,
}

impl StatusSnapshot {
    pub fn layer(&self, layer: Layer) -> &LayerStatus {
        match layer {
            Layer::Commerce => &self.commerce,
            Layer::Security => &self.security,
        }
    }
}

/// Handle given to the RPC/status collaborator.
#[derive(Clone, Debug)]
pub struct StatusHandle {
    rx: watch::Receiver<StatusSnapshot>,
}

impl StatusHandle {
    pub fn new(rx: watch::Receiver<StatusSnapshot>) -> Self {
        Self { rx }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot. Errors once the coordinator is gone.
    pub async fn changed(&mut self) -> Result<StatusSnapshot, watch::error::RecvError> {
        self.rx.changed().await?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

/// Operations the runtime drives the coordinator with.
#[async_trait]
pub trait ConsensusApi: Send {
    /// A slot boundary was crossed on `layer`.
    async fn on_slot_boundary(
        &mut self,
        layer: Layer,
        slot_number: u64,
    ) -> ConsensusResult<Option<SlotOutcome>>;

    /// Process a message from a peer. Never fails the caller.
    async fn handle_message(&mut self, message: NetworkMessage) -> MessageDisposition;

    fn status(&self) -> StatusSnapshot;
}
