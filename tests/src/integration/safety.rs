//! # Safety Scenarios
//!
//! Equivocation, forks below the finality barrier and crash recovery,
//! exercised across a four-validator cluster.

#[cfg(test)]
mod tests {
    use crate::harness::{signed_block, Cluster};
    use omne_consensus::domain::{MessageKind, SignedVote};
    use omne_consensus::{
        ConsensusError, ConsensusMessage, ConsensusStore, EnginePhase, MessageDisposition,
        SlashableOffense, ValidatorKey,
    };
    use shared_types::{Layer, NodeHealth, SlotId};

    fn commerce_slot(cluster: &Cluster, number: u64) -> SlotId {
        SlotId::from_number(
            Layer::Commerce,
            number,
            cluster.config.commerce_slots_per_epoch,
        )
    }

    // =============================================================================
    // EQUIVOCATION
    // =============================================================================

    #[tokio::test]
    async fn test_equivocating_proposer_caught_after_restart() {
        let mut cluster = Cluster::new(4).await;
        let proposer = cluster.proposer_index(Layer::Commerce, 1);
        let witness = (proposer + 1) % 4;

        cluster.step(Layer::Commerce, 1).await;
        let honest = cluster.nodes[witness].coordinator.commerce().head();
        assert_eq!(honest.slot.number, 1);

        // The witness crashes; its vote history survives in the store
        cluster.restart(witness).await.unwrap();
        cluster.nodes[witness]
            .coordinator
            .on_slot_boundary(Layer::Commerce, 1)
            .await
            .unwrap();

        let slot = commerce_slot(&cluster, 1);
        let key = cluster.nodes[proposer].key.clone();
        let conflicting = signed_block(
            &key,
            0,
            slot,
            cluster.config.genesis_hash,
            [0x42; 32],
            Vec::new(),
        );
        assert_ne!(conflicting.hash(), honest.hash);

        let message = cluster.envelope(witness, ConsensusMessage::Proposal(conflicting));
        let disposition = cluster.inject(witness, message).await;
        match disposition {
            MessageDisposition::Rejected(ConsensusError::Slashable(offense)) => match *offense {
                SlashableOffense::DoubleVote {
                    validator,
                    kind,
                    slot,
                    first,
                    ..
                } => {
                    assert_eq!(validator, key.identity());
                    assert_eq!(kind, MessageKind::Proposal);
                    assert_eq!(slot, 1);
                    assert_eq!(first, honest.hash);
                }
                other => panic!("unexpected offense {:?}", other),
            },
            other => panic!("unexpected disposition {:?}", other),
        }
        assert_eq!(cluster.nodes[witness].coordinator.offenses().len(), 1);

        // Evidence is durable too
        cluster.restart(witness).await.unwrap();
        assert_eq!(cluster.nodes[witness].coordinator.offenses().len(), 1);
        assert_eq!(
            cluster.nodes[witness].coordinator.status().slashing_offenses,
            1
        );
    }

    #[tokio::test]
    async fn test_restarted_validator_refuses_conflicting_attestation() {
        let mut cluster = Cluster::new(4).await;
        let proposer = cluster.proposer_index(Layer::Commerce, 1);
        let witness = (proposer + 1) % 4;
        let proposer_id = cluster.nodes[proposer].id();

        cluster.step(Layer::Commerce, 1).await;
        let first = cluster.nodes[witness].coordinator.commerce().head();

        // Forget the proposer's vote so only the witness's own attestation
        // history stands between it and a second block at slot 1
        let proposal_vote = SignedVote {
            validator: proposer_id,
            layer: Layer::Commerce,
            kind: MessageKind::Proposal,
            slot: 1,
            digest: first.hash,
            checkpoint_range: None,
        };
        ConsensusStore::new(cluster.nodes[witness].store.clone())
            .delete_votes(&[proposal_vote.key()])
            .unwrap();

        cluster.restart(witness).await.unwrap();
        cluster.nodes[witness]
            .coordinator
            .on_slot_boundary(Layer::Commerce, 1)
            .await
            .unwrap();

        let key = cluster.nodes[proposer].key.clone();
        let second = signed_block(
            &key,
            0,
            commerce_slot(&cluster, 1),
            cluster.config.genesis_hash,
            [0x43; 32],
            Vec::new(),
        );
        let message = cluster.envelope(witness, ConsensusMessage::Proposal(second));
        assert!(cluster.inject(witness, message).await.is_accepted());

        let node = &cluster.nodes[witness];
        assert!(node.network.sent().is_empty(), "witness attested twice");
        let status = node.coordinator.status();
        assert_eq!(status.commerce.stats.attested, 0);
        assert_eq!(status.slashing_offenses, 0);
        assert_eq!(status.health, NodeHealth::Healthy);
    }

    #[tokio::test]
    async fn test_block_from_wrong_proposer_rejected() {
        let mut cluster = Cluster::new(4).await;
        let proposer = cluster.proposer_index(Layer::Commerce, 1);
        let impostor = (proposer + 1) % 4;
        let target = (proposer + 2) % 4;
        cluster.cross(Layer::Commerce, 1).await;

        let key = cluster.nodes[impostor].key.clone();
        let block = signed_block(
            &key,
            0,
            commerce_slot(&cluster, 1),
            cluster.config.genesis_hash,
            [7; 32],
            Vec::new(),
        );
        let message = cluster.envelope(target, ConsensusMessage::Proposal(block));
        assert!(matches!(
            cluster.inject(target, message).await,
            MessageDisposition::Rejected(ConsensusError::WrongProposer { .. })
        ));
        assert_eq!(cluster.nodes[target].coordinator.offenses().len(), 0);
    }

    // =============================================================================
    // FINALITY BARRIER
    // =============================================================================

    #[tokio::test]
    async fn test_fork_below_finality_rejected() {
        let mut cluster = Cluster::new(4).await;
        for (layer, slot) in [
            (Layer::Commerce, 1),
            (Layer::Commerce, 2),
            (Layer::Security, 1),
        ] {
            cluster.step(layer, slot).await;
        }
        assert_eq!(
            cluster.nodes[0].coordinator.status().commerce.finalized_slot,
            2
        );

        // Slot 2 under the rotated schedule, built on genesis
        let proposer = cluster.proposer_index(Layer::Commerce, 2);
        let target = (proposer + 1) % 4;
        let key = cluster.nodes[proposer].key.clone();
        let fork = signed_block(
            &key,
            1,
            commerce_slot(&cluster, 2),
            cluster.config.genesis_hash,
            [0xF0; 32],
            Vec::new(),
        );
        let message = cluster.envelope(target, ConsensusMessage::Proposal(fork));
        assert!(matches!(
            cluster.inject(target, message).await,
            MessageDisposition::Rejected(ConsensusError::ConflictsWithFinality {
                layer: Layer::Commerce,
                finalized_slot: 2,
            })
        ));

        let status = cluster.nodes[target].coordinator.status();
        assert_eq!(status.commerce.finalized_slot, 2);
        assert_eq!(status.health, NodeHealth::Healthy);
    }

    // =============================================================================
    // CRASH RECOVERY
    // =============================================================================

    #[tokio::test]
    async fn test_restarted_node_rejoins_after_finality() {
        let mut cluster = Cluster::new(4).await;
        for (layer, slot) in [
            (Layer::Commerce, 1),
            (Layer::Commerce, 2),
            (Layer::Security, 1),
        ] {
            cluster.step(layer, slot).await;
        }
        let finalized = cluster.nodes[0].coordinator.commerce().finalized();

        cluster.restart(3).await.unwrap();
        let restarted = &cluster.nodes[3].coordinator;
        assert_eq!(restarted.validator_epoch(), 1);
        assert_eq!(restarted.commerce().finalized(), finalized);
        assert_eq!(
            restarted.last_finalized(),
            cluster.nodes[0].coordinator.last_finalized()
        );

        cluster.cross(Layer::Commerce, 3).await;
        let report = cluster.deliver_all().await;
        assert!(report.rejected.is_empty(), "{:?}", report.rejected);

        let head = cluster.nodes[0].coordinator.commerce().provisional_head();
        assert_eq!(head.slot.number, 3);
        assert_eq!(
            cluster.nodes[3].coordinator.commerce().provisional_head(),
            head
        );
    }

    #[tokio::test]
    async fn test_storage_outage_halts_only_that_node() {
        let mut cluster = Cluster::new(4).await;
        let proposer = cluster.proposer_index(Layer::Commerce, 1);
        let broken = (proposer + 1) % 4;
        cluster.nodes[broken].store.set_unavailable(true);

        cluster.step(Layer::Commerce, 1).await;

        let status = cluster.nodes[broken].coordinator.status();
        assert!(matches!(status.health, NodeHealth::Degraded { .. }));
        assert_eq!(status.commerce.phase, EnginePhase::Halted);
        assert_eq!(status.commerce.provisional_slot, 0);

        // Three healthy validators still carry quorum
        for (i, node) in cluster.nodes.iter().enumerate() {
            if i == broken {
                continue;
            }
            let status = node.coordinator.status();
            assert_eq!(status.health, NodeHealth::Healthy);
            assert_eq!(status.commerce.provisional_slot, 1);
        }
    }
}
