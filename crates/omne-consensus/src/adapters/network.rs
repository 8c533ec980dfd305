//! Transport adapters for the `NetworkGateway` port.

use crate::domain::OutboundMessage;
use crate::ports::{NetworkGateway, PortError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Enqueues broadcasts on an unbounded channel drained by the transport task.
///
/// Never blocks the coordinator.
pub struct ChannelNetwork {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelNetwork {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NetworkGateway for ChannelNetwork {
    fn broadcast(&self, message: OutboundMessage) -> Result<(), PortError> {
        self.tx
            .send(message)
            .map_err(|_| PortError::Broadcast("outbound queue closed".to_string()))
    }
}

/// Records broadcasts in memory; clones share the record.
#[derive(Clone, Default)]
pub struct RecordingNetwork {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything broadcast so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Take and clear the record.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl NetworkGateway for RecordingNetwork {
    fn broadcast(&self, message: OutboundMessage) -> Result<(), PortError> {
        self.sent.lock().push(message);
        Ok(())
    }
}
