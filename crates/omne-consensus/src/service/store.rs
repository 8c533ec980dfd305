//! Persistent consensus records on top of the `KeyValueStore` port.
//!
//! Key layout (all integers big-endian so prefix scans come back ordered):
//!
//! | Key | Value |
//! |-----|-------|
//! | `slashing/vote/{validator:32}{layer:1}{kind:1}{slot:8}` | digest (32 bytes) |
//! | `slashing/range/{validator:32}{source:8}{target:8}` | empty |
//! | `slashing/offense/{seq:8}` | bincode `SlashableOffense` |
//! | `finality/last` | bincode `FinalizedCheckpointRef` |

use crate::domain::{
    EpochRange, FinalizedCheckpointRef, MessageKind, SignedVote, SlashableOffense, VoteKey,
};
use crate::error::{ConsensusError, ConsensusResult};
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::Mutex;
use shared_types::{Hash, Layer, ValidatorId};
use std::sync::Arc;

const VOTE_PREFIX: &[u8] = b"slashing/vote/";
const RANGE_PREFIX: &[u8] = b"slashing/range/";
const OFFENSE_PREFIX: &[u8] = b"slashing/offense/";
const FINALIZED_KEY: &[u8] = b"finality/last";

/// Shared handle to the node's key-value store.
///
/// The mutex is held for a single store operation only.
#[derive(Clone)]
pub struct ConsensusStore {
    inner: Arc<Mutex<Box<dyn KeyValueStore>>>,
}

impl ConsensusStore {
    pub fn new<S: KeyValueStore + 'static>(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(store))),
        }
    }

    fn vote_key(key: &VoteKey) -> Vec<u8> {
        let mut out = Vec::with_capacity(VOTE_PREFIX.len() + 42);
        out.extend_from_slice(VOTE_PREFIX);
        out.extend_from_slice(key.validator.as_bytes());
        out.push(key.layer.tag());
        out.push(key.kind.tag());
        out.extend_from_slice(&key.slot.to_be_bytes());
        out
    }

    fn parse_vote_key(raw: &[u8]) -> Option<VoteKey> {
        let body = raw.strip_prefix(VOTE_PREFIX)?;
        if body.len() != 42 {
            return None;
        }
        let validator = ValidatorId::new(body[..32].try_into().ok()?);
        let layer = match body[32] {
            t if t == Layer::Commerce.tag() => Layer::Commerce,
            t if t == Layer::Security.tag() => Layer::Security,
            _ => return None,
        };
        let kind = MessageKind::from_tag(body[33])?;
        let slot = u64::from_be_bytes(body[34..42].try_into().ok()?);
        Some(VoteKey {
            validator,
            layer,
            kind,
            slot,
        })
    }

    fn range_key(validator: &ValidatorId, range: &EpochRange) -> Vec<u8> {
        let mut out = Vec::with_capacity(RANGE_PREFIX.len() + 48);
        out.extend_from_slice(RANGE_PREFIX);
        out.extend_from_slice(validator.as_bytes());
        out.extend_from_slice(&range.source_epoch.to_be_bytes());
        out.extend_from_slice(&range.target_epoch.to_be_bytes());
        out
    }

    fn parse_range_key(raw: &[u8]) -> Option<(ValidatorId, EpochRange)> {
        let body = raw.strip_prefix(RANGE_PREFIX)?;
        if body.len() != 48 {
            return None;
        }
        let validator = ValidatorId::new(body[..32].try_into().ok()?);
        let source = u64::from_be_bytes(body[32..40].try_into().ok()?);
        let target = u64::from_be_bytes(body[40..48].try_into().ok()?);
        Some((validator, EpochRange::new(source, target)))
    }

    fn offense_key(seq: u64) -> Vec<u8> {
        let mut out = OFFENSE_PREFIX.to_vec();
        out.extend_from_slice(&seq.to_be_bytes());
        out
    }

    /// Durably record a vote (and its range) in one atomic batch.
    pub fn record_vote(&self, vote: &SignedVote) -> ConsensusResult<()> {
        let mut ops = vec![BatchOperation::put(
            Self::vote_key(&vote.key()),
            vote.digest.to_vec(),
        )];
        if let Some(range) = vote.checkpoint_range {
            ops.push(BatchOperation::put(
                Self::range_key(&vote.validator, &range),
                Vec::new(),
            ));
        }
        self.inner.lock().atomic_batch_write(ops)?;
        Ok(())
    }

    /// All persisted votes; malformed entries are reported as corruption.
    pub fn load_votes(&self) -> ConsensusResult<Vec<(VoteKey, Hash)>> {
        let raw = self.inner.lock().prefix_scan(VOTE_PREFIX)?;
        raw.into_iter()
            .map(|(k, v)| {
                let key = Self::parse_vote_key(&k)
                    .ok_or_else(|| ConsensusError::Codec("malformed vote key".into()))?;
                let digest: Hash = v
                    .as_slice()
                    .try_into()
                    .map_err(|_| ConsensusError::Codec("malformed vote digest".into()))?;
                Ok((key, digest))
            })
            .collect()
    }

    pub fn load_ranges(&self) -> ConsensusResult<Vec<(ValidatorId, EpochRange)>> {
        let raw = self.inner.lock().prefix_scan(RANGE_PREFIX)?;
        raw.into_iter()
            .map(|(k, _)| {
                Self::parse_range_key(&k)
                    .ok_or_else(|| ConsensusError::Codec("malformed range key".into()))
            })
            .collect()
    }

    /// Remove votes in one atomic batch.
    pub fn delete_votes(&self, keys: &[VoteKey]) -> ConsensusResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let ops = keys
            .iter()
            .map(|k| BatchOperation::delete(Self::vote_key(k)))
            .collect();
        self.inner.lock().atomic_batch_write(ops)?;
        Ok(())
    }

    pub fn append_offense(&self, seq: u64, offense: &SlashableOffense) -> ConsensusResult<()> {
        let value = bincode::serialize(offense)?;
        self.inner.lock().put(&Self::offense_key(seq), &value)?;
        Ok(())
    }

    /// Offenses with their sequence numbers, in append order.
    pub fn load_offenses(&self) -> ConsensusResult<Vec<(u64, SlashableOffense)>> {
        let raw = self.inner.lock().prefix_scan(OFFENSE_PREFIX)?;
        let mut entries = raw
            .into_iter()
            .map(|(k, v)| {
                let seq = k
                    .strip_prefix(OFFENSE_PREFIX)
                    .and_then(|body| <[u8; 8]>::try_from(body).ok())
                    .map(u64::from_be_bytes)
                    .ok_or_else(|| ConsensusError::Codec("malformed offense key".into()))?;
                let offense = bincode::deserialize(&v).map_err(ConsensusError::from)?;
                Ok((seq, offense))
            })
            .collect::<ConsensusResult<Vec<(u64, SlashableOffense)>>>()?;
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries)
    }

    pub fn put_finalized(&self, reference: &FinalizedCheckpointRef) -> ConsensusResult<()> {
        let value = bincode::serialize(reference)?;
        self.inner.lock().put(FINALIZED_KEY, &value)?;
        Ok(())
    }

    pub fn load_finalized(&self) -> ConsensusResult<Option<FinalizedCheckpointRef>> {
        let raw = self.inner.lock().get(FINALIZED_KEY)?;
        raw.map(|bytes| bincode::deserialize(&bytes).map_err(ConsensusError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKVStore;
    use shared_types::SlotId;

    fn vote(slot: u64, range: Option<EpochRange>) -> SignedVote {
        SignedVote {
            validator: ValidatorId::new([4; 32]),
            layer: if range.is_some() {
                Layer::Security
            } else {
                Layer::Commerce
            },
            kind: MessageKind::Attestation,
            slot,
            digest: [slot as u8; 32],
            checkpoint_range: range,
        }
    }

    #[test]
    fn test_votes_and_ranges_persist() {
        let backing = InMemoryKVStore::new();
        let store = ConsensusStore::new(backing.clone());
        store.record_vote(&vote(3, None)).unwrap();
        store
            .record_vote(&vote(2, Some(EpochRange::new(1, 2))))
            .unwrap();

        // Fresh handle over the same backing data
        let reopened = ConsensusStore::new(backing);
        let votes = reopened.load_votes().unwrap();
        assert_eq!(votes.len(), 2);
        assert!(votes.contains(&(vote(3, None).key(), [3; 32])));

        let ranges = reopened.load_ranges().unwrap();
        assert_eq!(ranges, vec![(ValidatorId::new([4; 32]), EpochRange::new(1, 2))]);

        reopened.delete_votes(&[vote(3, None).key()]).unwrap();
        assert_eq!(reopened.load_votes().unwrap().len(), 1);
    }

    #[test]
    fn test_offenses_in_order() {
        let store = ConsensusStore::new(InMemoryKVStore::new());
        let offense = |slot| SlashableOffense::DoubleVote {
            validator: ValidatorId::new([1; 32]),
            layer: Layer::Commerce,
            kind: MessageKind::Proposal,
            slot,
            first: [1; 32],
            second: [2; 32],
        };
        for seq in [2u64, 0, 1] {
            store.append_offense(seq, &offense(seq)).unwrap();
        }
        let loaded = store.load_offenses().unwrap();
        assert_eq!(
            loaded,
            vec![(0, offense(0)), (1, offense(1)), (2, offense(2))]
        );
    }

    #[test]
    fn test_finalized_ref_roundtrip() {
        let store = ConsensusStore::new(InMemoryKVStore::new());
        assert!(store.load_finalized().unwrap().is_none());

        let reference = FinalizedCheckpointRef {
            epoch: 3,
            security_slot: SlotId::from_number(Layer::Security, 3, 1),
            security_hash: [1; 32],
            commerce_slot: SlotId::from_number(Layer::Commerce, 58, 20),
            commerce_hash: [2; 32],
            validator_epoch: 2,
            seed: [9; 32],
        };
        store.put_finalized(&reference).unwrap();
        assert_eq!(store.load_finalized().unwrap(), Some(reference));
    }

    #[test]
    fn test_unavailable_store_surfaces_error() {
        let backing = InMemoryKVStore::new();
        let store = ConsensusStore::new(backing.clone());
        backing.set_unavailable(true);
        assert!(matches!(
            store.record_vote(&vote(1, None)),
            Err(ConsensusError::StorageUnavailable(_))
        ));
        assert!(store.load_votes().is_err());
    }
}
