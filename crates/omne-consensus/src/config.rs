//! Consensus configuration and network presets

use crate::error::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use shared_types::{Hash, Layer, ZERO_HASH};
use std::time::Duration;

/// Supermajority threshold as a fraction of total stake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumThreshold {
    pub numerator: u64,
    pub denominator: u64,
}

impl QuorumThreshold {
    pub const TWO_THIRDS: QuorumThreshold = QuorumThreshold {
        numerator: 2,
        denominator: 3,
    };

    /// `weight / total >= numerator / denominator`, in integers.
    ///
    /// A zero total never reaches quorum.
    pub fn is_reached(&self, weight: u128, total: u128) -> bool {
        if total == 0 || weight == 0 {
            return false;
        }
        let num = self.numerator as u128;
        let den = self.denominator as u128;
        match (weight.checked_mul(den), total.checked_mul(num)) {
            (Some(lhs), Some(rhs)) => lhs >= rhs,
            // Only reachable with stakes near u128::MAX; compare after scaling down.
            _ => weight / num.max(1) >= total / den.max(1),
        }
    }
}

impl Default for QuorumThreshold {
    fn default() -> Self {
        Self::TWO_THIRDS
    }
}

/// Consensus configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Topic namespace (`{namespace}/consensus/{layer}/{network_id}`)
    pub namespace: String,
    /// Network identifier stamped on every message
    pub network_id: u64,
    /// Genesis block hash, root of both layers
    pub genesis_hash: Hash,
    /// Unix time (ms) of slot zero on both layers
    pub genesis_time_ms: u64,
    /// Commerce slot duration
    pub commerce_slot_ms: u64,
    /// Security slot duration
    pub security_slot_ms: u64,
    pub commerce_slots_per_epoch: u64,
    pub security_slots_per_epoch: u64,
    /// Quorum threshold for both layers
    pub quorum: QuorumThreshold,
    /// How many slots behind the current slot a message may be
    pub max_slot_lag: u64,
    /// Commerce attestation pools kept behind the current slot
    pub commerce_retention_slots: u64,
    /// Security attestation pools kept behind the current slot
    pub security_retention_slots: u64,
    /// Messages held while their block or validator epoch is missing
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
    /// Bound on draining in-flight quorum rounds at shutdown
    pub shutdown_grace_ms: u64,
}

fn default_pending_capacity() -> usize {
    1024
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ConsensusConfig {
    /// Mainnet: 3 s commerce slots, 540 s security slots.
    pub fn mainnet() -> Self {
        Self {
            namespace: "omne".to_string(),
            network_id: 1,
            genesis_hash: ZERO_HASH,
            genesis_time_ms: 0,
            commerce_slot_ms: 3_000,
            security_slot_ms: 540_000,
            commerce_slots_per_epoch: 180,
            security_slots_per_epoch: 1,
            quorum: QuorumThreshold::TWO_THIRDS,
            max_slot_lag: 2,
            commerce_retention_slots: 64,
            security_retention_slots: 8,
            pending_capacity: default_pending_capacity(),
            shutdown_grace_ms: 2_000,
        }
    }

    /// Testnet: mainnet timing, network id 2.
    pub fn testnet() -> Self {
        Self {
            network_id: 2,
            ..Self::mainnet()
        }
    }

    /// Devnet: 60 s security slots, network id 3.
    pub fn devnet() -> Self {
        Self {
            network_id: 3,
            security_slot_ms: 60_000,
            commerce_slots_per_epoch: 20,
            ..Self::mainnet()
        }
    }

    /// Look up a preset by name.
    pub fn for_network(name: &str) -> ConsensusResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::mainnet()),
            "testnet" => Ok(Self::testnet()),
            "devnet" => Ok(Self::devnet()),
            other => Err(ConsensusError::InvalidConfig(format!(
                "unknown network preset '{}'",
                other
            ))),
        }
    }

    /// Reject configurations the engines cannot run with.
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.commerce_slot_ms == 0 || self.security_slot_ms == 0 {
            return Err(ConsensusError::InvalidConfig(
                "slot durations must be non-zero".into(),
            ));
        }
        if self.security_slot_ms < self.commerce_slot_ms {
            return Err(ConsensusError::InvalidConfig(
                "security slot must not be shorter than commerce slot".into(),
            ));
        }
        if self.commerce_slots_per_epoch == 0 || self.security_slots_per_epoch == 0 {
            return Err(ConsensusError::InvalidConfig(
                "slots per epoch must be non-zero".into(),
            ));
        }
        let q = self.quorum;
        if q.denominator == 0 || q.numerator == 0 || q.numerator > q.denominator {
            return Err(ConsensusError::InvalidConfig(format!(
                "quorum {}/{} is not a fraction in (0, 1]",
                q.numerator, q.denominator
            )));
        }
        if self.commerce_retention_slots <= self.max_slot_lag
            || self.security_retention_slots <= self.max_slot_lag
        {
            return Err(ConsensusError::InvalidConfig(format!(
                "retention must exceed max slot lag {}",
                self.max_slot_lag
            )));
        }
        if self.pending_capacity == 0 {
            return Err(ConsensusError::InvalidConfig(
                "pending capacity must be non-zero".into(),
            ));
        }
        if self.namespace.is_empty() || self.namespace.contains('/') {
            return Err(ConsensusError::InvalidConfig(
                "namespace must be non-empty and contain no '/'".into(),
            ));
        }
        Ok(())
    }

    pub fn slot_duration(&self, layer: Layer) -> Duration {
        Duration::from_millis(match layer {
            Layer::Commerce => self.commerce_slot_ms,
            Layer::Security => self.security_slot_ms,
        })
    }

    pub fn slots_per_epoch(&self, layer: Layer) -> u64 {
        match layer {
            Layer::Commerce => self.commerce_slots_per_epoch,
            Layer::Security => self.security_slots_per_epoch,
        }
    }

    pub fn retention_slots(&self, layer: Layer) -> u64 {
        match layer {
            Layer::Commerce => self.commerce_retention_slots,
            Layer::Security => self.security_retention_slots,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Gossip topic for a layer.
    pub fn topic(&self, layer: Layer) -> String {
        format!(
            "{}/consensus/{}/{}",
            self.namespace,
            layer.as_str(),
            self.network_id
        )
    }
}
