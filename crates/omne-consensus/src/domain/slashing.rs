//! # Slashing Rules
//!
//! In-memory vote history and the two slashing conditions.
//!
//! 1. No double vote: one digest per (validator, layer, kind, slot)
//! 2. No surround vote: a security range may not strictly contain, or be
//!    strictly contained by, a range the same validator already signed
//!
//! Durability is layered on top by the protector service; this module
//! only decides.

use super::EpochRange;
use serde::{Deserialize, Serialize};
use shared_types::{Hash, Layer, ValidatorId};
use std::collections::HashMap;
use std::fmt;

/// What was signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Proposal,
    Attestation,
}

impl MessageKind {
    pub fn tag(&self) -> u8 {
        match self {
            MessageKind::Proposal => 0x01,
            MessageKind::Attestation => 0x02,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(MessageKind::Proposal),
            0x02 => Some(MessageKind::Attestation),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Proposal => f.write_str("proposal"),
            MessageKind::Attestation => f.write_str("attestation"),
        }
    }
}

/// A signed (or about to be signed) vote, as seen by slashing protection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedVote {
    pub validator: ValidatorId,
    pub layer: Layer,
    pub kind: MessageKind,
    pub slot: u64,
    pub digest: Hash,
    pub checkpoint_range: Option<EpochRange>,
}

/// Key identifying one vote slot of one validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoteKey {
    pub validator: ValidatorId,
    pub layer: Layer,
    pub kind: MessageKind,
    pub slot: u64,
}

impl SignedVote {
    pub fn key(&self) -> VoteKey {
        VoteKey {
            validator: self.validator,
            layer: self.layer,
            kind: self.kind,
            slot: self.slot,
        }
    }
}

/// Evidence of a slashing condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashableOffense {
    DoubleVote {
        validator: ValidatorId,
        layer: Layer,
        kind: MessageKind,
        slot: u64,
        first: Hash,
        second: Hash,
    },
    SurroundVote {
        validator: ValidatorId,
        existing: EpochRange,
        offending: EpochRange,
    },
}

impl SlashableOffense {
    pub fn validator(&self) -> ValidatorId {
        match self {
            Self::DoubleVote { validator, .. } => *validator,
            Self::SurroundVote { validator, .. } => *validator,
        }
    }

    /// Label for metrics.
    pub fn offense_type(&self) -> &'static str {
        match self {
            Self::DoubleVote { .. } => "double_vote",
            Self::SurroundVote { .. } => "surround_vote",
        }
    }
}

impl fmt::Display for SlashableOffense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleVote {
                validator,
                layer,
                kind,
                slot,
                first,
                second,
            } => write!(
                f,
                "double {} by {} on {} slot {} ({} vs {})",
                kind,
                validator.short(),
                layer,
                slot,
                hex::encode(&first[..4]),
                hex::encode(&second[..4])
            ),
            Self::SurroundVote {
                validator,
                existing,
                offending,
            } => write!(
                f,
                "surround vote by {}: {} vs recorded {}",
                validator.short(),
                offending,
                existing
            ),
        }
    }
}

/// Outcome of checking a vote against history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteCheck {
    /// Not seen before and not slashable; must be recorded
    New,
    /// Identical vote already recorded
    AlreadyRecorded,
}

/// Vote history for all validators this node has seen.
#[derive(Debug, Default)]
pub struct SlashingHistory {
    votes: HashMap<VoteKey, Hash>,
    ranges: HashMap<ValidatorId, Vec<EpochRange>>,
}

impl SlashingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a vote without recording it.
    pub fn check(&self, vote: &SignedVote) -> Result<VoteCheck, SlashableOffense> {
        let key = vote.key();
        if let Some(first) = self.votes.get(&key) {
            if *first == vote.digest {
                return Ok(VoteCheck::AlreadyRecorded);
            }
            return Err(SlashableOffense::DoubleVote {
                validator: vote.validator,
                layer: vote.layer,
                kind: vote.kind,
                slot: vote.slot,
                first: *first,
                second: vote.digest,
            });
        }

        if let Some(range) = vote.checkpoint_range {
            if let Some(recorded) = self.ranges.get(&vote.validator) {
                for existing in recorded {
                    if range.surrounds(existing) || existing.surrounds(&range) {
                        return Err(SlashableOffense::SurroundVote {
                            validator: vote.validator,
                            existing: *existing,
                            offending: range,
                        });
                    }
                }
            }
        }

        Ok(VoteCheck::New)
    }

    /// Record a vote that passed `check`.
    pub fn record(&mut self, vote: &SignedVote) {
        self.votes.insert(vote.key(), vote.digest);
        if let Some(range) = vote.checkpoint_range {
            let ranges = self.ranges.entry(vote.validator).or_default();
            if !ranges.contains(&range) {
                ranges.push(range);
            }
        }
    }

    /// Restore a persisted vote.
    pub fn restore_vote(&mut self, key: VoteKey, digest: Hash) {
        self.votes.insert(key, digest);
    }

    /// Restore a persisted range.
    pub fn restore_range(&mut self, validator: ValidatorId, range: EpochRange) {
        let ranges = self.ranges.entry(validator).or_default();
        if !ranges.contains(&range) {
            ranges.push(range);
        }
    }

    /// Drop votes of `layer` with slot `< slot`; returns the removed keys.
    pub fn prune_before(&mut self, layer: Layer, slot: u64) -> Vec<VoteKey> {
        let stale: Vec<VoteKey> = self
            .votes
            .keys()
            .filter(|k| k.layer == layer && k.slot < slot)
            .copied()
            .collect();
        for key in &stale {
            self.votes.remove(key);
        }
        stale
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn range_count(&self) -> usize {
        self.ranges.values().map(Vec::len).sum()
    }
}
