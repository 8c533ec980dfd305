//! # Consensus Metrics
//!
//! Prometheus metrics for slot production, attestations and finality.
//!
//! Enable with the `metrics` feature:
//! ```toml
//! omne-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `consensus_proposals_total` - Proposals signed by this node, by layer
//! - `consensus_attestations_total` - Attestations signed by this node, by layer
//! - `consensus_slots_skipped_total` - Slots that ended without a valid proposal or quorum, by layer
//! - `consensus_messages_rejected_total` - Inbound messages rejected, by reason
//! - `consensus_slashable_offenses_total` - Slashable offenses detected, by type
//! - `consensus_checkpoints_finalized_total` - Finalized security checkpoints
//! - `consensus_finalized_epoch` - Epoch of the last finalized checkpoint
//! - `consensus_layer_halted` - 1 while a layer is halted, by layer

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref PROPOSALS: IntCounterVec = register_int_counter_vec!(
        "consensus_proposals_total",
        "Proposals signed by this node",
        &["layer"]
    )
    .expect("Failed to create PROPOSALS metric");

    pub static ref ATTESTATIONS: IntCounterVec = register_int_counter_vec!(
        "consensus_attestations_total",
        "Attestations signed by this node",
        &["layer"]
    )
    .expect("Failed to create ATTESTATIONS metric");

    pub static ref SLOTS_SKIPPED: IntCounterVec = register_int_counter_vec!(
        "consensus_slots_skipped_total",
        "Slots that ended without a valid proposal or quorum",
        &["layer"]
    )
    .expect("Failed to create SLOTS_SKIPPED metric");

    pub static ref MESSAGES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "consensus_messages_rejected_total",
        "Inbound messages rejected",
        &["reason"]
    )
    .expect("Failed to create MESSAGES_REJECTED metric");

    pub static ref SLASHABLE_OFFENSES: IntCounterVec = register_int_counter_vec!(
        "consensus_slashable_offenses_total",
        "Slashable offenses detected",
        &["type"]
    )
    .expect("Failed to create SLASHABLE_OFFENSES metric");

    pub static ref CHECKPOINTS_FINALIZED: IntCounter = register_int_counter!(
        "consensus_checkpoints_finalized_total",
        "Finalized security checkpoints"
    )
    .expect("Failed to create CHECKPOINTS_FINALIZED metric");

    pub static ref FINALIZED_EPOCH: IntGauge = register_int_gauge!(
        "consensus_finalized_epoch",
        "Epoch of the last finalized checkpoint"
    )
    .expect("Failed to create FINALIZED_EPOCH metric");

    pub static ref LAYER_HALTED: IntGaugeVec = register_int_gauge_vec!(
        "consensus_layer_halted",
        "1 while a layer is halted",
        &["layer"]
    )
    .expect("Failed to create LAYER_HALTED metric");
}

#[cfg(feature = "metrics")]
pub fn record_proposal(layer: &str) {
    PROPOSALS.with_label_values(&[layer]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_attestation(layer: &str) {
    ATTESTATIONS.with_label_values(&[layer]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_slot_skipped(layer: &str) {
    SLOTS_SKIPPED.with_label_values(&[layer]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_message_rejected(reason: &str) {
    MESSAGES_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_slashable_offense(offense_type: &str) {
    SLASHABLE_OFFENSES.with_label_values(&[offense_type]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_checkpoint_finalized(epoch: u64) {
    CHECKPOINTS_FINALIZED.inc();
    FINALIZED_EPOCH.set(epoch as i64);
}

#[cfg(feature = "metrics")]
pub fn set_layer_halted(layer: &str, halted: bool) {
    LAYER_HALTED
        .with_label_values(&[layer])
        .set(if halted { 1 } else { 0 });
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_proposal(_layer: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_attestation(_layer: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_slot_skipped(_layer: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_slashable_offense(_offense_type: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_checkpoint_finalized(_epoch: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn set_layer_halted(_layer: &str, _halted: bool) {}
