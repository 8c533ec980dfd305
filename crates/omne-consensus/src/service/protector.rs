//! Slashing protection with durable history.
//!
//! Every vote this node signs or accepts passes through `check_and_record`.
//! A new vote is written to storage before it is admitted to the in-memory
//! history, so a crash can never forget a vote that was already signed.

use super::store::ConsensusStore;
use crate::domain::{SignedVote, SlashableOffense, SlashingHistory, VoteCheck};
use crate::error::{ConsensusError, ConsensusResult};
use crate::metrics;
use shared_types::Layer;
use tracing::{info, warn};

pub struct SlashingProtector {
    history: SlashingHistory,
    store: ConsensusStore,
    offenses: Vec<SlashableOffense>,
    /// Next free evidence key; never reuses one already on disk
    next_offense_seq: u64,
}

impl SlashingProtector {
    /// Rebuild the protector from storage. Any failure is fatal to startup.
    pub fn load(store: ConsensusStore) -> ConsensusResult<Self> {
        let mut history = SlashingHistory::new();
        for (key, digest) in store.load_votes()? {
            history.restore_vote(key, digest);
        }
        for (validator, range) in store.load_ranges()? {
            history.restore_range(validator, range);
        }
        let persisted = store.load_offenses()?;
        let next_offense_seq = persisted.last().map_or(0, |(seq, _)| seq + 1);
        let offenses: Vec<SlashableOffense> =
            persisted.into_iter().map(|(_, offense)| offense).collect();

        info!(
            "[consensus] slashing protection loaded: {} votes, {} ranges, {} offenses",
            history.vote_count(),
            history.range_count(),
            offenses.len()
        );

        Ok(Self {
            history,
            store,
            offenses,
            next_offense_seq,
        })
    }

    /// Check a vote against history and record it.
    ///
    /// Same digest again is `Ok`. A conflicting vote is recorded as evidence
    /// and returned as `Slashable`. `StorageUnavailable` means nothing was
    /// recorded and nothing may be signed.
    pub fn check_and_record(&mut self, vote: &SignedVote) -> ConsensusResult<()> {
        match self.admit(vote)? {
            Ok(()) => Ok(()),
            Err(offense) => {
                self.record_offense(offense.clone());
                Err(ConsensusError::Slashable(Box::new(offense)))
            }
        }
    }

    /// `check_and_record` for a vote this node is about to sign.
    ///
    /// A conflict is refused but not kept as evidence, since nothing was signed.
    pub fn guard_own_vote(&mut self, vote: &SignedVote) -> ConsensusResult<()> {
        self.admit(vote)?
            .map_err(|offense| ConsensusError::Slashable(Box::new(offense)))
    }

    fn admit(&mut self, vote: &SignedVote) -> ConsensusResult<Result<(), SlashableOffense>> {
        match self.history.check(vote) {
            Ok(VoteCheck::AlreadyRecorded) => Ok(Ok(())),
            Ok(VoteCheck::New) => {
                self.store.record_vote(vote)?;
                self.history.record(vote);
                Ok(Ok(()))
            }
            Err(offense) => Ok(Err(offense)),
        }
    }

    /// Append offense evidence. Duplicate evidence is ignored.
    ///
    /// Evidence that cannot be persisted is still kept in memory; losing it
    /// on restart does not weaken protection.
    pub fn record_offense(&mut self, offense: SlashableOffense) {
        if self.offenses.contains(&offense) {
            return;
        }
        warn!(
            "[consensus] slashable offense by {}: {}",
            offense.validator().short(),
            offense
        );
        metrics::record_slashable_offense(offense.offense_type());

        let seq = self.next_offense_seq;
        self.next_offense_seq += 1;
        if let Err(e) = self.store.append_offense(seq, &offense) {
            warn!("[consensus] failed to persist offense evidence: {}", e);
        }
        self.offenses.push(offense);
    }

    pub fn offenses(&self) -> &[SlashableOffense] {
        &self.offenses
    }

    pub fn offense_count(&self) -> usize {
        self.offenses.len()
    }

    /// Forget commerce votes for slots below `slot`.
    ///
    /// Those slots are outside the slot window, so no message for them can
    /// be accepted or signed again.
    pub fn prune_commerce_before(&mut self, slot: u64) -> usize {
        let pruned = self.history.prune_before(Layer::Commerce, slot);
        if let Err(e) = self.store.delete_votes(&pruned) {
            // Entries left on disk only cost space
            warn!("[consensus] failed to prune slashing history: {}", e);
        }
        pruned.len()
    }
}
