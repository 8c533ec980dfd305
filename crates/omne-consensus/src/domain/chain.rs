//! Per-layer block tree with finality barrier
//!
//! Tracks accepted blocks of one layer, the head (latest accepted block on
//! the branch of the provisional head), the provisional head (latest block
//! with quorum) and the finalized barrier. Once a block is final, every
//! block that does not descend from it is pruned and any later block that
//! would build on pruned history is rejected.

use super::Block;
use crate::error::{ConsensusError, ConsensusResult};
use shared_types::{Hash, Layer, SlotId};
use std::collections::{HashMap, HashSet};

/// Hash and slot of a chain position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainPoint {
    pub hash: Hash,
    pub slot: SlotId,
}

impl ChainPoint {
    pub fn new(hash: Hash, slot: SlotId) -> Self {
        Self { hash, slot }
    }
}

/// Known blocks of one layer.
pub struct BlockTree {
    layer: Layer,
    /// Genesis or the finalized block restored at startup; has no body
    root: ChainPoint,
    blocks: HashMap<Hash, Block>,
    head: ChainPoint,
    provisional: ChainPoint,
    finalized: ChainPoint,
    /// Blocks pruned at the last finalization, kept to report conflicts
    orphaned: HashSet<Hash>,
}

impl BlockTree {
    /// Tree rooted at a final block (genesis, or the persisted barrier).
    pub fn new(layer: Layer, root: ChainPoint) -> Self {
        Self {
            layer,
            root,
            blocks: HashMap::new(),
            head: root,
            provisional: root,
            finalized: root,
            orphaned: HashSet::new(),
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn head(&self) -> ChainPoint {
        self.head
    }

    pub fn provisional_head(&self) -> ChainPoint {
        self.provisional
    }

    pub fn finalized(&self) -> ChainPoint {
        self.finalized
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        *hash == self.root.hash || self.blocks.contains_key(hash)
    }

    pub fn block(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn slot_of(&self, hash: &Hash) -> Option<SlotId> {
        if *hash == self.root.hash {
            return Some(self.root.slot);
        }
        self.blocks.get(hash).map(|b| b.slot)
    }

    fn point(&self, hash: &Hash) -> Option<ChainPoint> {
        self.slot_of(hash).map(|slot| ChainPoint::new(*hash, slot))
    }

    /// True if `hash` is `ancestor` or descends from it.
    pub fn is_descendant(&self, hash: &Hash, ancestor: &Hash) -> bool {
        let Some(floor) = self.slot_of(ancestor) else {
            return false;
        };
        let mut current = *hash;
        loop {
            if current == *ancestor {
                return true;
            }
            match self.blocks.get(&current) {
                Some(block) if block.slot.number > floor.number => current = block.parent,
                _ => return false,
            }
        }
    }

    /// Check that a block with `parent` at `slot` may be accepted.
    ///
    /// The parent must be known, strictly older, and on the finalized branch.
    pub fn check_extends(&self, parent: &Hash, slot: SlotId) -> ConsensusResult<()> {
        if slot.number <= self.finalized.slot.number || self.orphaned.contains(parent) {
            return Err(ConsensusError::ConflictsWithFinality {
                layer: self.layer,
                finalized_slot: self.finalized.slot.number,
            });
        }
        let Some(parent_slot) = self.slot_of(parent) else {
            return Err(ConsensusError::UnknownParent { parent: *parent });
        };
        if parent_slot.number >= slot.number {
            return Err(ConsensusError::invalid(format!(
                "parent slot {} is not older than block slot {}",
                parent_slot.number, slot.number
            )));
        }
        if !self.is_descendant(parent, &self.finalized.hash) {
            return Err(ConsensusError::ConflictsWithFinality {
                layer: self.layer,
                finalized_slot: self.finalized.slot.number,
            });
        }
        Ok(())
    }

    /// Insert a block. Returns false if it was already known.
    pub fn insert(&mut self, block: Block) -> ConsensusResult<bool> {
        let hash = block.hash();
        if self.contains(&hash) {
            return Ok(false);
        }
        self.check_extends(&block.parent, block.slot)?;

        let point = ChainPoint::new(hash, block.slot);
        self.blocks.insert(hash, block);

        if point.slot.number > self.head.slot.number
            && self.is_descendant(&hash, &self.provisional.hash)
        {
            self.head = point;
        }
        Ok(true)
    }

    /// Advance the provisional head to a block that reached quorum.
    ///
    /// Returns false if the block is unknown, older than the current
    /// provisional head, or off its branch.
    pub fn mark_provisional(&mut self, hash: &Hash) -> bool {
        let Some(point) = self.point(hash) else {
            return false;
        };
        if point.slot.number <= self.provisional.slot.number
            || !self.is_descendant(hash, &self.provisional.hash)
        {
            return false;
        }
        self.provisional = point;
        if !self.is_descendant(&self.head.hash, hash) {
            self.head = point;
        }
        true
    }

    /// Move the finality barrier to `hash` and prune conflicting branches.
    pub fn finalize(&mut self, hash: &Hash) -> ConsensusResult<()> {
        let Some(point) = self.point(hash) else {
            return Err(ConsensusError::UnknownBlock { block: *hash });
        };
        if *hash == self.finalized.hash {
            return Ok(());
        }
        if !self.is_descendant(hash, &self.finalized.hash) {
            return Err(ConsensusError::ConflictsWithFinality {
                layer: self.layer,
                finalized_slot: self.finalized.slot.number,
            });
        }

        self.finalized = point;
        if !self.is_descendant(&self.provisional.hash, hash) {
            self.provisional = point;
        }
        if !self.is_descendant(&self.head.hash, hash) {
            self.head = point;
        }
        self.prune();
        Ok(())
    }

    /// Drop every block that does not descend from the barrier.
    fn prune(&mut self) {
        let barrier = self.finalized.hash;
        let keep: HashSet<Hash> = self
            .blocks
            .keys()
            .filter(|h| self.is_descendant(h, &barrier))
            .copied()
            .collect();
        let mut removed: HashSet<Hash> = self
            .blocks
            .keys()
            .filter(|h| !keep.contains(*h))
            .copied()
            .collect();
        self.blocks.retain(|h, _| keep.contains(h));
        if let Some(barrier_block) = self.blocks.get(&barrier) {
            if self.root.hash != barrier {
                removed.insert(self.root.hash);
            }
            self.root = ChainPoint::new(barrier, barrier_block.slot);
        }
        self.orphaned = removed;
    }

    /// Hashes from `from` (exclusive) to `to` (inclusive) in chain order.
    ///
    /// None if `to` does not descend from `from`.
    pub fn segment(&self, from: &Hash, to: &Hash) -> Option<Vec<Hash>> {
        if !self.is_descendant(to, from) {
            return None;
        }
        let mut out = Vec::new();
        let mut current = *to;
        while current != *from {
            let block = self.blocks.get(&current)?;
            out.push(current);
            current = block.parent;
        }
        out.reverse();
        Some(out)
    }
}
