//! Node wiring: builds the coordinator's collaborators and owns its tasks.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use omne_consensus::adapters::{
    ChannelNetwork, Ed25519ValidatorKey, Ed25519Verifier, FileBackedKVStore, SlotPayloadSource,
    StaticValidatorSetProvider,
};
use omne_consensus::{
    ConsensusCoordinator, ConsensusStore, CoordinatorDependencies, NetworkMessage,
    OutboundMessage, StatusHandle, StatusSnapshot, ValidatorInfo,
};
use shared_types::{Layer, NodeHealth, ValidatorId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const INBOUND_QUEUE: usize = 1024;

/// A running validator node.
pub struct NodeRuntime {
    validator: ValidatorId,
    status: StatusHandle,
    shutdown_tx: watch::Sender<bool>,
    coordinator: JoinHandle<()>,
    loopback: JoinHandle<()>,
    reporter: JoinHandle<()>,
}

impl NodeRuntime {
    /// Open the store, start the coordinator and spawn its tasks.
    ///
    /// ## Startup Sequence
    ///
    /// 1. Open the slashing-protection store under `data_dir`
    /// 2. Load or generate the validator key
    /// 3. Start the coordinator (restores the last finalized checkpoint)
    /// 4. Spawn the coordinator loop, the loopback transport and the status reporter
    pub async fn start(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {:?}", config.data_dir))?;
        let store = FileBackedKVStore::open(config.store_path())
            .with_context(|| format!("opening store {:?}", config.store_path()))?;

        let seed = match config.validator_seed {
            Some(seed) => seed,
            None => {
                warn!("No validator seed configured, using an ephemeral key");
                rand::random()
            }
        };
        let key = Arc::new(Ed25519ValidatorKey::from_seed(seed));
        let validator = ValidatorId::new(key.public_key());
        let validators = vec![ValidatorInfo::new(validator, config.stake, key.public_key())];

        let (network, outbound_rx) = ChannelNetwork::new();
        let deps = CoordinatorDependencies {
            network: Arc::new(network),
            key: Some(key),
            verifier: Arc::new(Ed25519Verifier),
            validator_provider: Arc::new(StaticValidatorSetProvider::new(validators)),
            payload_source: Arc::new(SlotPayloadSource),
            store: ConsensusStore::new(store),
        };

        let coordinator = ConsensusCoordinator::start(config.consensus.clone(), deps)
            .await
            .context("starting consensus coordinator")?;
        let status = coordinator.status_handle();

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let coordinator = tokio::spawn(async move {
            if let Err(e) = coordinator.run(inbound_rx, shutdown_rx).await {
                error!("[consensus] coordinator exited: {}", e);
            }
        });
        let loopback = tokio::spawn(loopback(outbound_rx, inbound_tx));
        let reporter = tokio::spawn(report_status(status.clone()));

        info!("Validator: {}", validator.short());
        info!("Network: {} (id {})", config.network, config.consensus.network_id);
        info!("Data Dir: {:?}", config.data_dir);

        Ok(Self {
            validator,
            status,
            shutdown_tx,
            coordinator,
            loopback,
            reporter,
        })
    }

    pub fn validator(&self) -> ValidatorId {
        self.validator
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Shutdown the node gracefully.
    ///
    /// ## Shutdown Sequence
    ///
    /// 1. Signal the coordinator to stop opening slots
    /// 2. Wait for it to drain in-flight rounds (bounded by the grace period)
    /// 3. Join the transport and reporter tasks
    pub async fn shutdown(self) -> Result<StatusSnapshot> {
        info!("Initiating graceful shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("Coordinator already gone");
        }

        self.coordinator.await.context("joining coordinator")?;
        self.loopback.await.context("joining loopback transport")?;
        self.reporter.await.context("joining status reporter")?;

        info!("Shutdown complete");
        Ok(self.status.snapshot())
    }
}

/// Deliver our own broadcasts back to the coordinator, as a gossip layer
/// would deliver them to every subscriber.
async fn loopback(
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    inbound_tx: mpsc::Sender<NetworkMessage>,
) {
    while let Some(message) = outbound_rx.recv().await {
        if inbound_tx.send(message.to_inbound()).await.is_err() {
            break;
        }
    }
}

/// Log finality and health changes.
async fn report_status(mut status: StatusHandle) {
    let mut last = status.snapshot();
    while let Ok(snapshot) = status.changed().await {
        if snapshot.last_finalized != last.last_finalized {
            if let Some(checkpoint) = &snapshot.last_finalized {
                info!(
                    "Finalized security slot {} / commerce slot {} (validator epoch {})",
                    checkpoint.security_slot.number,
                    checkpoint.commerce_slot.number,
                    checkpoint.validator_epoch
                );
            }
        }
        if snapshot.health != last.health {
            match &snapshot.health {
                NodeHealth::Healthy => info!("Health: healthy"),
                NodeHealth::Degraded { reason } => warn!("Health: degraded ({})", reason),
                NodeHealth::Stopped => info!("Health: stopped"),
            }
        }
        let provisional = snapshot.layer(Layer::Commerce).provisional_slot;
        if provisional != last.layer(Layer::Commerce).provisional_slot {
            debug!("Commerce provisional head at slot {}", provisional);
        }
        last = snapshot;
    }
}
