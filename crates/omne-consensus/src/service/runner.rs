//! Async driver for the coordinator.
//!
//! One `SlotTicker` task per layer turns wall-clock time into slot
//! boundaries. The coordinator task consumes boundaries and inbound
//! messages from channels; tickers never touch consensus state.

use super::ConsensusCoordinator;
use crate::domain::NetworkMessage;
use crate::engine::SlotClock;
use crate::error::ConsensusResult;
use crate::ports::{SystemTimeSource, TimeSource};
use shared_types::Layer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const MIN_POLL: Duration = Duration::from_millis(10);
const MAX_POLL: Duration = Duration::from_secs(1);
const COMMAND_QUEUE: usize = 64;

/// Commands sent to the coordinator task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorCommand {
    SlotBoundary { layer: Layer, slot: u64 },
}

/// Emits a `SlotBoundary` whenever the clock enters a new slot.
pub struct SlotTicker {
    clock: SlotClock,
    time: Arc<dyn TimeSource>,
}

impl SlotTicker {
    pub fn new(clock: SlotClock, time: Arc<dyn TimeSource>) -> Self {
        Self { clock, time }
    }

    pub fn layer(&self) -> Layer {
        self.clock.layer()
    }

    /// A tenth of the slot, clamped to [10 ms, 1 s].
    pub fn poll_interval(&self) -> Duration {
        (self.clock.slot_duration() / 10).clamp(MIN_POLL, MAX_POLL)
    }

    pub fn spawn(
        self,
        tx: mpsc::Sender<CoordinatorCommand>,
        stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(tx, stop))
    }

    async fn run(self, tx: mpsc::Sender<CoordinatorCommand>, mut stop: watch::Receiver<bool>) {
        let layer = self.layer();
        let mut interval = tokio::time::interval(self.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<u64> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let slot = self.clock.slot_number_at(self.time.now_ms());
                    if last == Some(slot) {
                        continue;
                    }
                    last = Some(slot);
                    if tx.send(CoordinatorCommand::SlotBoundary { layer, slot }).await.is_err() {
                        break;
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("[consensus] {} slot ticker stopped", layer);
    }
}

impl ConsensusCoordinator {
    /// Drive the coordinator on the system clock until shutdown.
    pub async fn run(
        self,
        inbound_rx: mpsc::Receiver<NetworkMessage>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> ConsensusResult<()> {
        self.run_with_time(inbound_rx, shutdown_rx, Arc::new(SystemTimeSource))
            .await
    }

    /// Drive the coordinator until `shutdown_rx` turns true (or its sender
    /// is dropped).
    ///
    /// On shutdown no new slots are opened; inbound messages keep flowing
    /// until in-flight quorum rounds finish or the grace period expires.
    pub async fn run_with_time(
        mut self,
        mut inbound_rx: mpsc::Receiver<NetworkMessage>,
        mut shutdown_rx: watch::Receiver<bool>,
        time: Arc<dyn TimeSource>,
    ) -> ConsensusResult<()> {
        let (command_tx, mut command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (stop_tx, stop_rx) = watch::channel(false);
        let tickers: Vec<JoinHandle<()>> = Layer::ALL
            .iter()
            .map(|&layer| {
                SlotTicker::new(SlotClock::from_config(&self.config, layer), Arc::clone(&time))
                    .spawn(command_tx.clone(), stop_rx.clone())
            })
            .collect();
        drop(command_tx);

        info!("[consensus] coordinator loop running");

        let mut inbound_open = true;
        let mut draining = false;
        let mut deadline = Instant::now();
        if *shutdown_rx.borrow() {
            draining = true;
            deadline = self.start_drain(&stop_tx);
        }

        loop {
            if draining && !self.has_in_flight_rounds() {
                break;
            }
            tokio::select! {
                Some(command) = command_rx.recv(), if !draining => match command {
                    CoordinatorCommand::SlotBoundary { layer, slot } => {
                        if let Err(e) = self.on_slot_boundary(layer, slot).await {
                            debug!("[consensus] {} boundary {} not applied: {}", layer, slot, e);
                        }
                    }
                },
                message = inbound_rx.recv(), if inbound_open => match message {
                    Some(message) => {
                        self.handle_message(message).await;
                    }
                    None => {
                        debug!("[consensus] inbound channel closed");
                        inbound_open = false;
                    }
                },
                changed = shutdown_rx.changed(), if !draining => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        draining = true;
                        deadline = self.start_drain(&stop_tx);
                    }
                }
                _ = tokio::time::sleep_until(deadline), if draining => {
                    warn!("[consensus] shutdown grace expired with rounds in flight");
                    break;
                }
                else => break,
            }
        }

        let _ = stop_tx.send(true);
        for ticker in tickers {
            let _ = ticker.await;
        }
        self.stop();
        Ok(())
    }

    fn start_drain(&mut self, stop_tx: &watch::Sender<bool>) -> Instant {
        self.begin_shutdown();
        let _ = stop_tx.send(true);
        Instant::now() + self.config.shutdown_grace()
    }
}
