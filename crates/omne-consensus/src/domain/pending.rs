//! # Pending Messages
//!
//! Holds inbound messages that arrived ahead of what they depend on: a
//! proposal whose parent is unknown, an attestation for a block not yet
//! seen, or a message tagged with the next validator epoch. Entries are
//! released when the dependency shows up and replayed in arrival order.
//!
//! The buffer is bounded by entry count and by the slot window; entries
//! that fall out of the window are discarded.

use super::NetworkMessage;
use shared_types::{Hash, Layer};
use std::collections::VecDeque;

/// What a parked message is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dependency {
    /// A block (or checkpoint) with this hash
    Block(Hash),
    /// The validator set of this epoch
    Epoch(u64),
}

#[derive(Debug)]
struct Parked {
    dependency: Dependency,
    message: NetworkMessage,
}

impl Parked {
    fn layer(&self) -> Layer {
        self.message.message.layer()
    }

    fn slot_number(&self) -> u64 {
        self.message.message.slot().number
    }
}

/// Bounded buffer of messages waiting on a block or an epoch.
pub struct PendingMessages {
    capacity: usize,
    waiting: Vec<Parked>,
    ready: VecDeque<NetworkMessage>,
}

impl PendingMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            waiting: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    /// Messages held, waiting or ready.
    pub fn len(&self) -> usize {
        self.waiting.len() + self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Park `message` until `dependency` is met.
    ///
    /// Returns false if the buffer is full. An identical message already
    /// held is not stored twice but still counts as parked.
    pub fn park(&mut self, dependency: Dependency, message: NetworkMessage) -> bool {
        let held = self.waiting.iter().any(|p| p.message == message)
            || self.ready.iter().any(|m| *m == message);
        if held {
            return true;
        }
        if self.len() >= self.capacity {
            return false;
        }
        self.waiting.push(Parked {
            dependency,
            message,
        });
        true
    }

    /// Release everything waiting on `block`. Returns how many were released.
    pub fn release_block(&mut self, block: &Hash) -> usize {
        self.release(|dependency| matches!(dependency, Dependency::Block(hash) if hash == block))
    }

    /// Release everything waiting on `epoch` or an earlier one.
    pub fn release_epoch(&mut self, epoch: u64) -> usize {
        self.release(|dependency| matches!(dependency, Dependency::Epoch(e) if *e <= epoch))
    }

    fn release(&mut self, met: impl Fn(&Dependency) -> bool) -> usize {
        let mut released = 0;
        let mut kept = Vec::with_capacity(self.waiting.len());
        for parked in self.waiting.drain(..) {
            if met(&parked.dependency) {
                self.ready.push_back(parked.message);
                released += 1;
            } else {
                kept.push(parked);
            }
        }
        self.waiting = kept;
        released
    }

    /// Next released message, oldest first.
    pub fn pop_ready(&mut self) -> Option<NetworkMessage> {
        self.ready.pop_front()
    }

    /// Drop `layer` messages for slots below `floor`. Returns how many.
    pub fn discard_before(&mut self, layer: Layer, floor: u64) -> usize {
        let before = self.len();
        self.waiting.retain(|p| p.layer() != layer || p.slot_number() >= floor);
        self.ready.retain(|m| m.message.layer() != layer || m.message.slot().number >= floor);
        before - self.len()
    }
}
