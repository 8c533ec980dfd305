//! Slot clock: genesis time plus a fixed slot duration.

use crate::config::ConsensusConfig;
use shared_types::{Layer, SlotId};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotClock {
    layer: Layer,
    genesis_ms: u64,
    slot_ms: u64,
    slots_per_epoch: u64,
}

impl SlotClock {
    pub fn new(layer: Layer, genesis_ms: u64, slot_ms: u64, slots_per_epoch: u64) -> Self {
        Self {
            layer,
            genesis_ms,
            slot_ms: slot_ms.max(1),
            slots_per_epoch: slots_per_epoch.max(1),
        }
    }

    pub fn from_config(config: &ConsensusConfig, layer: Layer) -> Self {
        Self::new(
            layer,
            config.genesis_time_ms,
            config.slot_duration(layer).as_millis() as u64,
            config.slots_per_epoch(layer),
        )
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_millis(self.slot_ms)
    }

    /// Absolute slot number at `now_ms`; slot zero before genesis.
    pub fn slot_number_at(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.genesis_ms) / self.slot_ms
    }

    pub fn slot_at(&self, now_ms: u64) -> SlotId {
        self.slot_id(self.slot_number_at(now_ms))
    }

    pub fn slot_id(&self, number: u64) -> SlotId {
        SlotId::from_number(self.layer, number, self.slots_per_epoch)
    }

    pub fn slot_start_ms(&self, number: u64) -> u64 {
        self.genesis_ms
            .saturating_add(number.saturating_mul(self.slot_ms))
    }

    /// Time left until the next slot boundary.
    pub fn until_next_slot(&self, now_ms: u64) -> Duration {
        let next = self.slot_start_ms(self.slot_number_at(now_ms) + 1);
        Duration::from_millis(next.saturating_sub(now_ms))
    }
}
