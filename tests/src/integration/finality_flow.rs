//! # Two-Layer Finality Flow
//!
//! Four equal-stake validators, stepped slot by slot:
//!
//! 1. Commerce proposer broadcasts a block and attests it
//! 2. Peers attest; at 2/3 stake the block becomes provisional everywhere
//! 3. Security proposer checkpoints the provisional segment
//! 4. Quorum on the checkpoint finalizes it and the covered commerce blocks
//! 5. Every node rotates to the same validator epoch and seed

#[cfg(test)]
mod tests {
    use crate::harness::Cluster;
    use omne_consensus::{ConsensusError, MessageDisposition, SkipReason, SlotOutcome};
    use shared_types::{Layer, NodeHealth};
    use std::collections::HashSet;

    // =============================================================================
    // COMMERCE LAYER
    // =============================================================================

    #[tokio::test]
    async fn test_quorum_makes_block_provisional_on_every_node() {
        let mut cluster = Cluster::new(4).await;

        cluster.cross(Layer::Commerce, 1).await;
        let report = cluster.deliver_all().await;
        assert!(report.rejected.is_empty(), "{:?}", report.rejected);

        let head = cluster.nodes[0].coordinator.commerce().provisional_head();
        assert_eq!(head.slot.number, 1);
        for node in &cluster.nodes {
            let status = node.coordinator.status();
            assert_eq!(status.commerce.provisional_slot, 1);
            assert_eq!(status.commerce.provisional_head, head.hash);
            assert_eq!(status.commerce.finalized_slot, 0);
            assert_eq!(status.health, NodeHealth::Healthy);
        }

        let proposer = cluster.proposer_index(Layer::Commerce, 1);
        assert_eq!(
            cluster.nodes[proposer]
                .coordinator
                .status()
                .commerce
                .stats
                .proposed,
            1
        );

        let outcomes = cluster.step(Layer::Commerce, 2).await;
        for outcome in outcomes {
            assert!(matches!(
                outcome,
                Some(SlotOutcome::Completed { slot, block }) if slot.number == 1 && block == head.hash
            ));
        }
    }

    #[tokio::test]
    async fn test_attestation_before_proposal_counts_once_block_arrives() {
        let mut cluster = Cluster::new(4).await;
        let proposer = cluster.proposer_index(Layer::Commerce, 1);
        let peer = (proposer + 1) % 4;
        let other = (proposer + 2) % 4;

        cluster.cross(Layer::Commerce, 1).await;
        let sent = cluster.nodes[proposer].network.drain();
        let proposal = sent[0].to_inbound();
        let attestation = sent[1].to_inbound();

        // Only `peer` sees the proposal; its attestation reaches `other` first
        assert!(cluster.inject(peer, proposal.clone()).await.is_accepted());
        let peer_attestation = cluster.nodes[peer].network.drain().remove(0).to_inbound();
        assert_eq!(
            cluster.inject(other, peer_attestation).await,
            MessageDisposition::Pending
        );
        assert_eq!(
            cluster.inject(other, attestation).await,
            MessageDisposition::Pending
        );
        assert_eq!(cluster.nodes[other].coordinator.status().pending_messages, 2);

        // The block arrives: both held votes count, plus `other`'s own
        assert!(cluster.inject(other, proposal).await.is_accepted());
        let status = cluster.nodes[other].coordinator.status();
        assert_eq!(status.pending_messages, 0);
        assert_eq!(status.commerce.provisional_slot, 1);
        assert_eq!(status.messages_rejected, 0);
    }

    #[tokio::test]
    async fn test_reversed_delivery_still_reaches_quorum() {
        let mut cluster = Cluster::new(4).await;

        cluster.cross(Layer::Commerce, 1).await;
        let report = cluster.deliver_all_reversed().await;
        assert!(report.rejected.is_empty(), "{:?}", report.rejected);

        let head = cluster.nodes[0].coordinator.commerce().provisional_head();
        assert_eq!(head.slot.number, 1);
        for node in &cluster.nodes {
            let status = node.coordinator.status();
            assert_eq!(status.commerce.provisional_head, head.hash);
            assert_eq!(status.commerce.stats.attested, 1);
            assert_eq!(status.pending_messages, 0);
        }
    }

    // =============================================================================
    // SECURITY LAYER
    // =============================================================================

    #[tokio::test]
    async fn test_checkpoint_finalizes_segment_and_rotates_everywhere() {
        let mut cluster = Cluster::new(4).await;
        cluster.step(Layer::Commerce, 1).await;
        cluster.step(Layer::Commerce, 2).await;
        let provisional = cluster.nodes[0].coordinator.commerce().provisional_head();
        assert_eq!(provisional.slot.number, 2);

        cluster.cross(Layer::Security, 1).await;
        let report = cluster.deliver_all().await;
        // Attestations that arrive after a node has rotated carry the old epoch
        for (_, disposition) in &report.rejected {
            assert!(
                matches!(
                    disposition,
                    MessageDisposition::Rejected(ConsensusError::EpochMismatch { .. })
                ),
                "{:?}",
                disposition
            );
        }

        let reference = cluster.nodes[0]
            .coordinator
            .last_finalized()
            .cloned()
            .expect("checkpoint not finalized");
        assert_eq!(reference.commerce_hash, provisional.hash);
        assert_eq!(reference.commerce_slot.number, 2);
        assert_eq!(reference.security_slot.number, 1);
        assert_eq!(reference.validator_epoch, 1);

        for node in &cluster.nodes {
            let status = node.coordinator.status();
            assert_eq!(status.commerce.finalized_slot, 2);
            assert_eq!(status.security.finalized_slot, 1);
            assert_eq!(status.validator_epoch, 1);
            // Same reveals mixed in the same order: same seed on every node
            assert_eq!(status.last_finalized.as_ref(), Some(&reference));
            assert_eq!(node.coordinator.validators().epoch(), 1);
        }
    }

    #[tokio::test]
    async fn test_chain_continues_from_finalized_block() {
        let mut cluster = Cluster::new(4).await;
        for (layer, slot) in [
            (Layer::Commerce, 1),
            (Layer::Commerce, 2),
            (Layer::Security, 1),
            (Layer::Commerce, 3),
            (Layer::Commerce, 4),
        ] {
            cluster.step(layer, slot).await;
        }

        let node = &cluster.nodes[0].coordinator;
        let finalized = node.commerce().finalized();
        let head = node.commerce().provisional_head();
        assert_eq!(head.slot.number, 4);
        let block3 = node
            .commerce()
            .chain()
            .block(&node.commerce().chain().block(&head.hash).unwrap().parent)
            .unwrap()
            .clone();
        assert_eq!(block3.slot.number, 3);
        assert_eq!(block3.parent, finalized.hash);

        cluster.step(Layer::Security, 2).await;
        for node in &cluster.nodes {
            let status = node.coordinator.status();
            assert_eq!(status.commerce.finalized_slot, 4);
            assert_eq!(status.security.finalized_slot, 2);
            assert_eq!(status.validator_epoch, 2);
        }
    }

    #[tokio::test]
    async fn test_empty_checkpoint_still_finalizes() {
        let mut cluster = Cluster::new(4).await;
        cluster.step(Layer::Security, 1).await;

        for node in &cluster.nodes {
            let status = node.coordinator.status();
            assert_eq!(status.security.finalized_slot, 1);
            assert_eq!(status.commerce.finalized_slot, 0);
            assert_eq!(status.validator_epoch, 1);
        }
    }

    // =============================================================================
    // PROPOSER SELECTION
    // =============================================================================

    #[tokio::test]
    async fn test_proposer_selection_agrees_across_nodes() {
        let mut cluster = Cluster::new(4).await;

        let schedule = |cluster: &Cluster| -> Vec<Vec<_>> {
            cluster
                .nodes
                .iter()
                .map(|n| {
                    (1..=64)
                        .map(|slot| n.coordinator.commerce().core().expected_proposer(slot).unwrap())
                        .collect()
                })
                .collect()
        };

        let before = schedule(&cluster);
        assert!(before.windows(2).all(|w| w[0] == w[1]));
        let distinct: HashSet<_> = before[0].iter().collect();
        assert_eq!(distinct.len(), 4, "every equal-stake validator gets slots");

        cluster.step(Layer::Security, 1).await;
        let after = schedule(&cluster);
        assert!(after.windows(2).all(|w| w[0] == w[1]));
        assert_ne!(before[0], after[0], "rotation reseeds the schedule");
    }

    // =============================================================================
    // LIVENESS
    // =============================================================================

    #[tokio::test]
    async fn test_offline_proposer_skips_slot() {
        let mut cluster = Cluster::new(4).await;
        let offline = cluster.proposer_index(Layer::Commerce, 1);
        cluster.nodes[offline].online = false;

        cluster.step(Layer::Commerce, 1).await;
        let outcomes = cluster.step(Layer::Commerce, 2).await;
        for (i, outcome) in outcomes.into_iter().enumerate() {
            if i == offline {
                continue;
            }
            assert!(matches!(
                outcome,
                Some(SlotOutcome::Skipped { slot, reason: SkipReason::NoProposal }) if slot.number == 1
            ));
        }

        let mut slot = 2;
        while cluster.proposer_index(Layer::Commerce, slot) == offline {
            slot += 1;
            assert!(slot < 40, "offline validator proposes every slot");
            cluster.step(Layer::Commerce, slot).await;
        }

        // Three of four online is enough stake for quorum
        let online = (offline + 1) % 4;
        let node = &cluster.nodes[online].coordinator;
        let head = node.commerce().provisional_head();
        assert_eq!(head.slot.number, slot);
        let block = node.commerce().chain().block(&head.hash).unwrap();
        assert_eq!(block.parent, cluster.config.genesis_hash);
    }

    #[tokio::test]
    async fn test_two_offline_validators_block_quorum() {
        let mut cluster = Cluster::new(4).await;
        let proposer = cluster.proposer_index(Layer::Commerce, 1);
        for i in [(proposer + 1) % 4, (proposer + 2) % 4] {
            cluster.nodes[i].online = false;
        }

        cluster.step(Layer::Commerce, 1).await;
        let outcomes = cluster.step(Layer::Commerce, 2).await;
        let outcome = outcomes[proposer];
        assert!(matches!(
            outcome,
            Some(SlotOutcome::Skipped { slot, reason: SkipReason::NoQuorum }) if slot.number == 1
        ));

        let status = cluster.nodes[proposer].coordinator.status();
        assert_eq!(status.commerce.head_slot, 1);
        assert_eq!(status.commerce.provisional_slot, 0);
    }
}
