//! # Reordered Delivery
//!
//! A validator that sees the next epoch's traffic before the checkpoint that
//! opens it must catch up once the checkpoint arrives, not fall out of
//! consensus.

#[cfg(test)]
mod tests {
    use crate::harness::Cluster;
    use omne_consensus::MessageDisposition;
    use shared_types::Layer;

    /// Commerce proposer of slot 3 after the first checkpoint rotates the set.
    async fn rotated_proposer_of_slot_3() -> usize {
        let mut cluster = Cluster::new(4).await;
        for (layer, slot) in [
            (Layer::Commerce, 1),
            (Layer::Commerce, 2),
            (Layer::Security, 1),
        ] {
            cluster.step(layer, slot).await;
        }
        cluster.proposer_index(Layer::Commerce, 3)
    }

    #[tokio::test]
    async fn test_lagging_validator_catches_up_from_next_epoch_traffic() {
        let rotated = rotated_proposer_of_slot_3().await;
        let mut cluster = Cluster::new(4).await;
        let stale = cluster.proposer_index(Layer::Commerce, 3);
        let checkpointer = cluster.proposer_index(Layer::Security, 1);
        let lagging = (0..4)
            .find(|i| ![rotated, stale, checkpointer].contains(i))
            .unwrap();

        cluster.step(Layer::Commerce, 1).await;
        cluster.step(Layer::Commerce, 2).await;

        // The lagging node misses the checkpoint round and the next slot
        cluster.hold(lagging);
        cluster.step(Layer::Security, 1).await;
        cluster.step(Layer::Commerce, 3).await;
        for (i, node) in cluster.nodes.iter().enumerate() {
            let expected = if i == lagging { 0 } else { 1 };
            assert_eq!(node.coordinator.validator_epoch(), expected);
        }
        let head = cluster.nodes[rotated].coordinator.commerce().provisional_head();
        assert_eq!(head.slot.number, 3);

        // Epoch 1 traffic first, the checkpoint that opens epoch 1 last
        let dispositions = cluster.release_reversed(lagging).await;
        let (last, early) = dispositions.split_last().unwrap();
        assert_eq!(*last, MessageDisposition::Accepted);
        assert!(
            early.iter().all(|d| *d == MessageDisposition::Pending),
            "{:?}",
            early
        );
        cluster.deliver_all().await;

        let caught_up = &cluster.nodes[lagging].coordinator;
        let status = caught_up.status();
        assert_eq!(status.validator_epoch, 1);
        assert_eq!(status.pending_messages, 0);
        assert_eq!(status.commerce.finalized_slot, 2);
        assert_eq!(caught_up.commerce().provisional_head(), head);
        assert_eq!(
            caught_up.last_finalized(),
            cluster.nodes[rotated].coordinator.last_finalized()
        );

        // The next checkpoint finalizes slot 3 everywhere
        cluster.step(Layer::Security, 2).await;
        let reference = cluster.nodes[rotated].coordinator.last_finalized().cloned();
        for node in &cluster.nodes {
            let status = node.coordinator.status();
            assert_eq!(status.commerce.finalized_slot, 3);
            assert_eq!(status.validator_epoch, 2);
            assert_eq!(status.last_finalized, reference);
        }
    }
}
