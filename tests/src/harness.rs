//! # Cluster Harness
//!
//! Drives several coordinators against each other without a real transport.
//!
//! `Cluster` steps every node through slot boundaries by hand and delivers
//! broadcasts in rounds until the network is quiet. `LiveCluster` runs each
//! coordinator on its own task with real slot tickers and a router task in
//! place of gossip.

use omne_consensus::adapters::{
    ChannelNetwork, Ed25519ValidatorKey, Ed25519Verifier, InMemoryKVStore, RecordingNetwork,
    SlotPayloadSource, StaticValidatorSetProvider,
};
use omne_consensus::domain::{reveal_digest, Signature};
use omne_consensus::{
    Block, ConsensusConfig, ConsensusCoordinator, ConsensusMessage, ConsensusResult,
    ConsensusStore, CoordinatorDependencies, MessageDisposition, NetworkMessage,
    OutboundMessage, SlotOutcome, StatusHandle, ValidatorInfo, ValidatorKey,
};
use shared_types::{Hash, Layer, SlotId, ValidatorId};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub const STAKE: u128 = 100;

pub fn validator_key(index: usize) -> Arc<Ed25519ValidatorKey> {
    let mut seed = [0u8; 32];
    seed[0] = 0xA0;
    seed[1] = index as u8;
    Arc::new(Ed25519ValidatorKey::from_seed(seed))
}

pub fn validator_infos(keys: &[Arc<Ed25519ValidatorKey>]) -> Vec<ValidatorInfo> {
    keys.iter()
        .map(|k| ValidatorInfo::new(k.identity(), STAKE, k.public_key()))
        .collect()
}

/// Commerce slots of 100 ms, security slots of 400 ms.
pub fn fast_config() -> ConsensusConfig {
    ConsensusConfig {
        commerce_slot_ms: 100,
        security_slot_ms: 400,
        commerce_slots_per_epoch: 8,
        shutdown_grace_ms: 300,
        ..ConsensusConfig::devnet()
    }
}

/// Sign a proposal the way an honest (or equivocating) proposer would.
pub fn signed_block(
    key: &Ed25519ValidatorKey,
    validator_epoch: u64,
    slot: SlotId,
    parent: Hash,
    payload: Hash,
    checkpointed: Vec<Hash>,
) -> Block {
    let mut block = Block::unsigned(slot, parent, key.identity(), payload, checkpointed);
    block.randao_reveal = sign(key, &reveal_digest(validator_epoch));
    block.signature = sign(key, &block.hash());
    block
}

fn sign(key: &Ed25519ValidatorKey, digest: &Hash) -> Signature {
    match key.sign(digest) {
        Ok(signature) => signature,
        Err(e) => panic!("test key failed to sign: {}", e),
    }
}

/// One validator in a stepped cluster.
pub struct TestNode {
    pub coordinator: ConsensusCoordinator,
    pub network: RecordingNetwork,
    pub store: InMemoryKVStore,
    pub key: Arc<Ed25519ValidatorKey>,
    pub online: bool,
    /// While set, deliveries queue here instead of reaching the coordinator
    pub held: Option<Vec<NetworkMessage>>,
}

impl TestNode {
    pub fn id(&self) -> ValidatorId {
        self.key.identity()
    }
}

pub async fn start_node(
    config: ConsensusConfig,
    key: Arc<Ed25519ValidatorKey>,
    provider: StaticValidatorSetProvider,
    store: InMemoryKVStore,
) -> ConsensusResult<TestNode> {
    let network = RecordingNetwork::new();
    let deps = CoordinatorDependencies {
        network: Arc::new(network.clone()),
        key: Some(key.clone() as Arc<dyn ValidatorKey>),
        verifier: Arc::new(Ed25519Verifier),
        validator_provider: Arc::new(provider),
        payload_source: Arc::new(SlotPayloadSource),
        store: ConsensusStore::new(store.clone()),
    };
    let coordinator = ConsensusCoordinator::start(config, deps).await?;
    Ok(TestNode {
        coordinator,
        network,
        store,
        key,
        online: true,
        held: None,
    })
}

/// Delivery log of one round.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub rejected: Vec<(usize, MessageDisposition)>,
}

/// Equal-stake validators stepped in lockstep.
pub struct Cluster {
    pub config: ConsensusConfig,
    pub provider: StaticValidatorSetProvider,
    pub nodes: Vec<TestNode>,
}

impl Cluster {
    pub async fn new(size: usize) -> Self {
        Self::with_config(size, fast_config()).await
    }

    pub async fn with_config(size: usize, config: ConsensusConfig) -> Self {
        let keys: Vec<_> = (0..size).map(validator_key).collect();
        let provider = StaticValidatorSetProvider::new(validator_infos(&keys));
        let mut nodes = Vec::with_capacity(size);
        for key in keys {
            let node = start_node(
                config.clone(),
                key,
                provider.clone(),
                InMemoryKVStore::new(),
            )
            .await
            .unwrap_or_else(|e| panic!("node failed to start: {}", e));
            nodes.push(node);
        }
        Self {
            config,
            provider,
            nodes,
        }
    }

    /// Index of the validator expected to propose `slot` on `layer`.
    pub fn proposer_index(&self, layer: Layer, slot: u64) -> usize {
        let reference = self.nodes.iter().find(|n| n.online).unwrap_or(&self.nodes[0]);
        let core = match layer {
            Layer::Commerce => reference.coordinator.commerce().core(),
            Layer::Security => reference.coordinator.security().core(),
        };
        let proposer = core
            .expected_proposer(slot)
            .unwrap_or_else(|e| panic!("no proposer for slot {}: {}", slot, e));
        self.nodes
            .iter()
            .position(|n| n.id() == proposer)
            .unwrap_or_else(|| panic!("proposer of slot {} is not in the cluster", slot))
    }

    /// Every online node crosses the boundary, then broadcasts are delivered
    /// until quiet. Returns each node's outcome for the slot that ended.
    pub async fn step(&mut self, layer: Layer, slot: u64) -> Vec<Option<SlotOutcome>> {
        let outcomes = self.cross(layer, slot).await;
        self.deliver_all().await;
        outcomes
    }

    /// Every online node crosses the boundary; nothing is delivered.
    pub async fn cross(&mut self, layer: Layer, slot: u64) -> Vec<Option<SlotOutcome>> {
        let mut outcomes = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.iter_mut() {
            if !node.online {
                outcomes.push(None);
                continue;
            }
            let outcome = node
                .coordinator
                .on_slot_boundary(layer, slot)
                .await
                .unwrap_or_else(|e| panic!("{} boundary {} failed: {}", layer, slot, e));
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Deliver rounds of broadcasts between online nodes until none are left.
    ///
    /// Offline nodes neither send nor receive; whatever they queued is dropped.
    pub async fn deliver_all(&mut self) -> DeliveryReport {
        self.deliver_rounds(false).await
    }

    /// Like `deliver_all`, but each round arrives newest first, so reactions
    /// overtake the messages they react to.
    pub async fn deliver_all_reversed(&mut self) -> DeliveryReport {
        self.deliver_rounds(true).await
    }

    async fn deliver_rounds(&mut self, reversed: bool) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        loop {
            let mut batch: Vec<(usize, OutboundMessage)> = Vec::new();
            for (i, node) in self.nodes.iter().enumerate() {
                let sent = node.network.drain();
                if node.online {
                    batch.extend(sent.into_iter().map(|m| (i, m)));
                }
            }
            if batch.is_empty() {
                return report;
            }
            if reversed {
                batch.reverse();
            }
            for (sender, message) in batch {
                let inbound = message.to_inbound();
                for (i, node) in self.nodes.iter_mut().enumerate() {
                    if i == sender || !node.online {
                        continue;
                    }
                    if let Some(inbox) = node.held.as_mut() {
                        inbox.push(inbound.clone());
                        continue;
                    }
                    let disposition = node.coordinator.handle_message(inbound.clone()).await;
                    report.delivered += 1;
                    if let MessageDisposition::Rejected(_) = disposition {
                        report.rejected.push((i, disposition));
                    }
                }
            }
        }
    }

    /// Queue everything addressed to node `index` until `release_reversed`.
    pub fn hold(&mut self, index: usize) {
        self.nodes[index].held.get_or_insert_with(Vec::new);
    }

    /// Hand node `index` its queued messages newest first and stop holding.
    pub async fn release_reversed(&mut self, index: usize) -> Vec<MessageDisposition> {
        let inbox = self.nodes[index].held.take().unwrap_or_default();
        let mut dispositions = Vec::with_capacity(inbox.len());
        for message in inbox.into_iter().rev() {
            dispositions.push(self.nodes[index].coordinator.handle_message(message).await);
        }
        dispositions
    }

    /// Hand one message to a single node.
    pub async fn inject(&mut self, index: usize, message: NetworkMessage) -> MessageDisposition {
        self.nodes[index].coordinator.handle_message(message).await
    }

    /// Wrap a consensus message the way node `index` would broadcast it.
    pub fn envelope(&self, index: usize, message: ConsensusMessage) -> NetworkMessage {
        NetworkMessage {
            network_id: self.config.network_id,
            epoch: self.nodes[index].coordinator.validator_epoch(),
            message,
        }
    }

    /// Drop a node's coordinator and start a fresh one on the same store.
    pub async fn restart(&mut self, index: usize) -> ConsensusResult<()> {
        let key = self.nodes[index].key.clone();
        let store = self.nodes[index].store.clone();
        let node = start_node(self.config.clone(), key, self.provider.clone(), store).await?;
        self.nodes[index] = node;
        Ok(())
    }
}

/// Coordinators on their own tasks, joined by a router task.
pub struct LiveCluster {
    pub ids: Vec<ValidatorId>,
    pub status: Vec<StatusHandle>,
    shutdown_tx: watch::Sender<bool>,
    coordinators: Vec<JoinHandle<ConsensusResult<()>>>,
    router: JoinHandle<()>,
}

impl LiveCluster {
    /// Start `size` validators with slot zero at the current time.
    pub async fn start(size: usize) -> ConsensusResult<Self> {
        let mut config = fast_config();
        config.genesis_time_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        let keys: Vec<_> = (0..size).map(validator_key).collect();
        let provider = StaticValidatorSetProvider::new(validator_infos(&keys));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (routed_tx, routed_rx) = mpsc::unbounded_channel::<(usize, OutboundMessage)>();

        let mut ids = Vec::with_capacity(size);
        let mut status = Vec::with_capacity(size);
        let mut inbound = Vec::with_capacity(size);
        let mut coordinators = Vec::with_capacity(size);

        for (index, key) in keys.into_iter().enumerate() {
            let (network, mut outbound_rx) = ChannelNetwork::new();
            let deps = CoordinatorDependencies {
                network: Arc::new(network),
                key: Some(key.clone() as Arc<dyn ValidatorKey>),
                verifier: Arc::new(Ed25519Verifier),
                validator_provider: Arc::new(provider.clone()),
                payload_source: Arc::new(SlotPayloadSource),
                store: ConsensusStore::new(InMemoryKVStore::new()),
            };
            let coordinator = ConsensusCoordinator::start(config.clone(), deps).await?;
            ids.push(key.identity());
            status.push(coordinator.status_handle());

            let routed_tx = routed_tx.clone();
            tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    if routed_tx.send((index, message)).is_err() {
                        break;
                    }
                }
            });

            let (inbound_tx, inbound_rx) = mpsc::channel(1024);
            inbound.push(inbound_tx);
            coordinators.push(tokio::spawn(
                coordinator.run(inbound_rx, shutdown_rx.clone()),
            ));
        }
        drop(routed_tx);

        let router = tokio::spawn(route(routed_rx, inbound));

        Ok(Self {
            ids,
            status,
            shutdown_tx,
            coordinators,
            router,
        })
    }

    /// Signal shutdown and wait for every coordinator to stop.
    pub async fn shutdown(self) -> Vec<ConsensusResult<()>> {
        let _ = self.shutdown_tx.send(true);
        let mut results = Vec::with_capacity(self.coordinators.len());
        for handle in self.coordinators {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => panic!("coordinator task panicked: {}", e),
            });
        }
        let _ = self.router.await;
        results
    }
}

/// Fan each broadcast out to every other node, one message at a time, so a
/// proposal reaches all peers before any reaction to it.
async fn route(
    mut routed_rx: mpsc::UnboundedReceiver<(usize, OutboundMessage)>,
    inbound: Vec<mpsc::Sender<NetworkMessage>>,
) {
    while let Some((sender, message)) = routed_rx.recv().await {
        let delivered = message.to_inbound();
        for (i, tx) in inbound.iter().enumerate() {
            if i != sender {
                let _ = tx.send(delivered.clone()).await;
            }
        }
    }
}
