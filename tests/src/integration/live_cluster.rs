//! # Live Cluster
//!
//! Four coordinators on their own tasks, driven by real slot tickers
//! (100 ms commerce, 400 ms security) and joined by a router task.

#[cfg(test)]
mod tests {
    use crate::harness::LiveCluster;
    use shared_types::NodeHealth;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_live_cluster_reaches_finality_and_stops() {
        let cluster = LiveCluster::start(4).await.unwrap();
        assert_eq!(cluster.ids.len(), 4);

        for handle in &cluster.status {
            let mut handle = handle.clone();
            timeout(Duration::from_secs(10), async {
                while handle.snapshot().last_finalized.is_none() {
                    if handle.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .expect("node did not finalize within 10s");

            let snapshot = handle.snapshot();
            let reference = snapshot.last_finalized.unwrap();
            assert!(reference.validator_epoch >= 1);
            assert_eq!(snapshot.validator_epoch, reference.validator_epoch);
            assert!(snapshot.security.finalized_slot >= 1);
            assert!(snapshot.messages_accepted > 0);
        }

        let status = cluster.status.clone();
        let results = timeout(Duration::from_secs(5), cluster.shutdown())
            .await
            .expect("cluster did not stop within the grace period");
        assert!(results.iter().all(|r| r.is_ok()));
        for handle in status {
            assert_eq!(handle.snapshot().health, NodeHealth::Stopped);
        }
    }
}
