//! # Consensus Coordinator
//!
//! Owns both layer engines, the attestation pool, slashing protection and
//! the validator-set view. Single writer: every state change happens on the
//! coordinator task (see `runner`), so nothing here is shared or locked.
//!
//! ## Inbound pipeline
//!
//! ```text
//! network id → epoch tag → engine checks → signatures → slashing protection → engine / pool
//! ```
//!
//! A message tagged with the next validator epoch, or one whose parent or
//! attested block is not known yet, is parked in a bounded buffer instead of
//! rejected. Parked messages are replayed, oldest first, once the block is
//! accepted or the validator set rotates, and are dropped when their slot
//! leaves the `max_slot_lag` window.
//!
//! ## Outbound pipeline
//!
//! ```text
//! build → slashing protection → sign → broadcast → process locally
//! ```
//!
//! ## Safety halts
//!
//! A failed slashing-protection write halts the affected layer. A failure
//! to persist finality or to fetch the next validator set halts both. A
//! halted layer neither signs nor accepts messages until restart, and the
//! status snapshot reports `Degraded`.

pub mod protector;
pub mod runner;
pub mod store;


pub use protector::SlashingProtector;
pub use runner::{CoordinatorCommand, SlotTicker};
pub use store::ConsensusStore;

use crate::config::ConsensusConfig;
use crate::domain::{
    genesis_seed, reveal_digest, AggregateWeight, Attestation, AttestationOutcome,
    AttestationPool, Block, BlockTree, ChainPoint, ConsensusMessage, Dependency,
    FinalityCheckpoint, FinalizedCheckpointRef, MessageKind, NetworkMessage, OutboundMessage,
    PendingMessages, RandaoAccumulator, Signature, SignedVote, SlashableOffense, ValidatorSet,
};
use crate::engine::{
    CommerceLayerEngine, EngineCore, EnginePhase, EpochView, SecurityLayerEngine, SlotDuty,
    SlotOutcome,
};
use crate::error::{ConsensusError, ConsensusResult};
use crate::metrics;
use crate::ports::{
    ConsensusApi, LayerStatus, MessageDisposition, NetworkGateway, PayloadSource,
    SignatureVerifier, StatusHandle, StatusSnapshot, ValidatorKey, ValidatorSetProvider,
};
use async_trait::async_trait;
use shared_types::{Hash, Layer, NodeHealth, SlotId, ValidatorId};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Collaborators the coordinator is wired to.
pub struct CoordinatorDependencies {
    pub network: Arc<dyn NetworkGateway>,
    /// `None` runs an observer that follows consensus without voting
    pub key: Option<Arc<dyn ValidatorKey>>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub validator_provider: Arc<dyn ValidatorSetProvider>,
    pub payload_source: Arc<dyn PayloadSource>,
    pub store: ConsensusStore,
}

pub struct ConsensusCoordinator {
    config: ConsensusConfig,
    network: Arc<dyn NetworkGateway>,
    key: Option<Arc<dyn ValidatorKey>>,
    verifier: Arc<dyn SignatureVerifier>,
    validator_provider: Arc<dyn ValidatorSetProvider>,
    payload_source: Arc<dyn PayloadSource>,
    store: ConsensusStore,
    protector: SlashingProtector,
    commerce: CommerceLayerEngine,
    security: SecurityLayerEngine,
    pool: AttestationPool,
    pending: PendingMessages,
    /// Seed and mix of the current validator-set epoch
    randao: RandaoAccumulator,
    validators: Arc<ValidatorSet>,
    last_finalized: Option<FinalizedCheckpointRef>,
    messages_accepted: u64,
    messages_rejected: u64,
    shutting_down: bool,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl ConsensusCoordinator {
    /// Restore persisted state and build both engines.
    ///
    /// Fails if the configuration is invalid, slashing history cannot be
    /// loaded, or the validator set of the restored epoch is unavailable.
    pub async fn start(
        config: ConsensusConfig,
        deps: CoordinatorDependencies,
    ) -> ConsensusResult<Self> {
        config.validate()?;

        let protector = SlashingProtector::load(deps.store.clone())?;
        let last_finalized = deps.store.load_finalized()?;

        let (validator_epoch, seed) = match &last_finalized {
            Some(reference) => (reference.validator_epoch, reference.seed),
            None => (0, genesis_seed(&config.genesis_hash, config.network_id)),
        };
        let validators = deps
            .validator_provider
            .validator_set_at_epoch(validator_epoch)
            .await
            .map_err(|e| ConsensusError::ValidatorSetUnavailable {
                epoch: validator_epoch,
                reason: e.to_string(),
            })?;
        let validators = Arc::new(validators.with_epoch(validator_epoch));

        let (commerce_root, security_root, last_final_epoch) = match &last_finalized {
            Some(r) => (
                ChainPoint::new(r.commerce_hash, r.commerce_slot),
                ChainPoint::new(r.security_hash, r.security_slot),
                r.epoch,
            ),
            None => (
                ChainPoint::new(config.genesis_hash, SlotId::genesis(Layer::Commerce)),
                ChainPoint::new(config.genesis_hash, SlotId::genesis(Layer::Security)),
                0,
            ),
        };

        let view = EpochView {
            epoch: validator_epoch,
            validators: Arc::clone(&validators),
            seed,
        };
        let self_id = deps.key.as_ref().map(|key| key.identity());
        let commerce = CommerceLayerEngine::new(view.clone(), self_id, commerce_root, &config);
        let security =
            SecurityLayerEngine::new(view, self_id, security_root, last_final_epoch, &config);

        let pending = PendingMessages::new(config.pending_capacity);
        let mut pool = AttestationPool::new(config.quorum, Arc::clone(&validators));
        pool.discard_through(Layer::Commerce, commerce_root.slot.number);
        pool.discard_through(Layer::Security, security_root.slot.number);

        let initial = StatusSnapshot {
            network_id: config.network_id,
            validator_epoch,
            is_validator: commerce.core().is_validator(),
            commerce: layer_status(commerce.core(), commerce.chain()),
            security: layer_status(security.core(), security.chain()),
            last_finalized: last_finalized.clone(),
            slashing_offenses: protector.offense_count(),
            messages_accepted: 0,
            messages_rejected: 0,
            pending_messages: 0,
            health: NodeHealth::Healthy,
        };
        let (status_tx, _) = watch::channel(initial);

        info!(
            "[consensus] coordinator started: network {}, validator epoch {}, {} validators (stake {}), role {}",
            config.network_id,
            validator_epoch,
            validators.len(),
            validators.total_stake(),
            match self_id {
                Some(id) if validators.contains(&id) => format!("validator {}", id.short()),
                Some(id) => format!("inactive validator {}", id.short()),
                None => "observer".to_string(),
            }
        );
        if let Some(reference) = &last_finalized {
            info!(
                "[consensus] resuming from checkpoint epoch {} (commerce slot {}, security slot {})",
                reference.epoch, reference.commerce_slot.number, reference.security_slot.number
            );
        }

        Ok(Self {
            config,
            network: deps.network,
            key: deps.key,
            verifier: deps.verifier,
            validator_provider: deps.validator_provider,
            payload_source: deps.payload_source,
            store: deps.store,
            protector,
            commerce,
            security,
            pool,
            pending,
            randao: RandaoAccumulator::new(validator_epoch, seed),
            validators,
            last_finalized,
            messages_accepted: 0,
            messages_rejected: 0,
            shutting_down: false,
            status_tx,
        })
    }

    // === ACCESSORS ===

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn commerce(&self) -> &CommerceLayerEngine {
        &self.commerce
    }

    pub fn security(&self) -> &SecurityLayerEngine {
        &self.security
    }

    pub fn pool(&self) -> &AttestationPool {
        &self.pool
    }

    pub fn validators(&self) -> &Arc<ValidatorSet> {
        &self.validators
    }

    pub fn validator_epoch(&self) -> u64 {
        self.randao.epoch()
    }

    pub fn last_finalized(&self) -> Option<&FinalizedCheckpointRef> {
        self.last_finalized.as_ref()
    }

    /// Slashing evidence recorded so far, oldest first.
    pub fn offenses(&self) -> &[SlashableOffense] {
        self.protector.offenses()
    }

    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle::new(self.status_tx.subscribe())
    }

    fn core(&self, layer: Layer) -> &EngineCore {
        match layer {
            Layer::Commerce => self.commerce.core(),
            Layer::Security => self.security.core(),
        }
    }

    fn core_mut(&mut self, layer: Layer) -> &mut EngineCore {
        match layer {
            Layer::Commerce => self.commerce.core_mut(),
            Layer::Security => self.security.core_mut(),
        }
    }

    fn chain(&self, layer: Layer) -> &BlockTree {
        match layer {
            Layer::Commerce => self.commerce.chain(),
            Layer::Security => self.security.chain(),
        }
    }

    // === SLOTS ===

    /// Close the current slot of `layer` and open `slot_number`.
    ///
    /// Stale or repeated boundaries are ignored. Returns how the closed slot
    /// ended.
    pub async fn on_slot_boundary(
        &mut self,
        layer: Layer,
        slot_number: u64,
    ) -> ConsensusResult<Option<SlotOutcome>> {
        if self.shutting_down {
            return Err(ConsensusError::ShuttingDown);
        }
        self.core(layer).ensure_active()?;

        let current = self.core(layer).current_slot().map(|s| s.number);
        let finalized = self.chain(layer).finalized().slot.number;
        if current.is_some_and(|c| slot_number <= c) || slot_number <= finalized {
            debug!(
                "[consensus] ignoring stale {} boundary {} (current {:?}, finalized {})",
                layer, slot_number, current, finalized
            );
            return Ok(None);
        }

        let outcome = self.core_mut(layer).end_slot();
        if let Some(outcome) = outcome {
            self.report_outcome(layer, outcome);
        }
        self.prune_history(layer, slot_number);

        let slot = SlotId::from_number(layer, slot_number, self.config.slots_per_epoch(layer));
        match self.core_mut(layer).begin_slot(slot)? {
            SlotDuty::Propose => self.propose(slot).await,
            SlotDuty::Await { proposer } => debug!(
                "[consensus] {} slot {}: awaiting proposal from {}",
                layer,
                slot_number,
                proposer.short()
            ),
            SlotDuty::Skip => warn!(
                "[consensus] {} slot {}: no eligible validators",
                layer, slot_number
            ),
        }

        self.replay_pending().await;
        self.publish_status();
        Ok(outcome)
    }

    fn report_outcome(&self, layer: Layer, outcome: SlotOutcome) {
        match outcome {
            SlotOutcome::Completed { slot, block } => debug!(
                "[consensus] {} slot {} complete with {}",
                layer,
                slot.number,
                hex::encode(&block[..4])
            ),
            SlotOutcome::Skipped { slot, reason } => {
                info!(
                    "[consensus] {} slot {} skipped: {:?}",
                    layer, slot.number, reason
                );
                metrics::record_slot_skipped(layer.as_str());
            }
        }
    }

    /// Bound pool and slashing-history memory to the retention window.
    fn prune_history(&mut self, layer: Layer, slot_number: u64) {
        let floor = slot_number.saturating_sub(self.config.retention_slots(layer));
        let dropped = self.pool.discard_before(layer, floor);
        let forgotten = match layer {
            Layer::Commerce => self.protector.prune_commerce_before(floor),
            // Security votes back surround-vote detection and are kept
            Layer::Security => 0,
        };
        if dropped > 0 || forgotten > 0 {
            debug!(
                "[consensus] {} retention: dropped {} slot pools, {} votes below slot {}",
                layer, dropped, forgotten, floor
            );
        }

        let window = slot_number.saturating_sub(self.config.max_slot_lag);
        let expired = self.pending.discard_before(layer, window);
        if expired > 0 {
            debug!(
                "[consensus] {} dropped {} pending messages below slot {}",
                layer, expired, window
            );
        }
    }

    // === OUTBOUND ===

    async fn propose(&mut self, slot: SlotId) {
        let Some(key) = self.key.clone() else {
            return;
        };
        let layer = slot.layer;
        let proposer = key.identity();

        let mut block = match layer {
            Layer::Commerce => match self.payload_source.payload_commitment(slot) {
                Ok(payload) => self.commerce.build_proposal(slot, proposer, payload),
                Err(e) => {
                    warn!(
                        "[consensus] no payload for commerce slot {}: {}",
                        slot.number, e
                    );
                    return;
                }
            },
            Layer::Security => self
                .security
                .build_checkpoint(slot, proposer, self.commerce.chain()),
        };
        let hash = block.hash();

        let vote = SignedVote {
            validator: proposer,
            layer,
            kind: MessageKind::Proposal,
            slot: slot.number,
            digest: hash,
            checkpoint_range: None,
        };
        if let Err(e) = self.guard_vote(&vote, true) {
            error!(
                "[consensus] refusing to propose {} slot {}: {}",
                layer, slot.number, e
            );
            return;
        }

        let signed = key
            .sign(&reveal_digest(self.randao.epoch()))
            .and_then(|reveal| key.sign(&hash).map(|signature| (reveal, signature)));
        match signed {
            Ok((reveal, signature)) => {
                block.randao_reveal = reveal;
                block.signature = signature;
            }
            Err(e) => {
                error!("[consensus] failed to sign {} proposal: {}", layer, e);
                return;
            }
        }

        info!(
            "[consensus] proposing {} block {} at slot {} ({} checkpointed)",
            layer,
            hex::encode(&hash[..4]),
            slot.number,
            block.checkpointed.len()
        );
        self.core_mut(layer).mark_proposed();
        metrics::record_proposal(layer.as_str());
        self.broadcast(ConsensusMessage::Proposal(block.clone()));

        if let MessageDisposition::Rejected(e) = self.process_proposal(block).await {
            warn!("[consensus] own {} proposal rejected: {}", layer, e);
        }
    }

    /// Attest `block` if this node has not attested the slot yet.
    async fn attest(&mut self, slot: SlotId, block: Hash) {
        let Some(key) = self.key.clone() else {
            return;
        };
        let layer = slot.layer;
        if !self.core(layer).should_attest(slot, &block) {
            return;
        }

        let range = match layer {
            Layer::Commerce => None,
            Layer::Security => match self.security.chain().block(&block) {
                Some(checkpoint) => Some(self.security.attestation_range(checkpoint)),
                None => return,
            },
        };
        let mut attestation = Attestation::unsigned(slot, block, key.identity(), range);
        let digest = attestation.digest();

        let vote = SignedVote {
            validator: key.identity(),
            layer,
            kind: MessageKind::Attestation,
            slot: slot.number,
            digest,
            checkpoint_range: range,
        };
        if let Err(e) = self.guard_vote(&vote, true) {
            error!(
                "[consensus] refusing to attest {} slot {}: {}",
                layer, slot.number, e
            );
            return;
        }

        match key.sign(&digest) {
            Ok(signature) => attestation.signature = signature,
            Err(e) => {
                error!("[consensus] failed to sign {} attestation: {}", layer, e);
                return;
            }
        }

        self.core_mut(layer).mark_attested(slot);
        metrics::record_attestation(layer.as_str());
        self.broadcast(ConsensusMessage::Attestation(attestation.clone()));

        if let MessageDisposition::Rejected(e) = self.process_attestation(attestation).await {
            warn!("[consensus] own {} attestation rejected: {}", layer, e);
        }
    }

    fn broadcast(&self, message: ConsensusMessage) {
        let layer = message.layer();
        let outbound = OutboundMessage {
            topic: self.config.topic(layer),
            network_id: self.config.network_id,
            epoch: self.randao.epoch(),
            message,
        };
        if let Err(e) = self.network.broadcast(outbound) {
            warn!("[consensus] {} broadcast failed: {}", layer, e);
        }
    }

    /// Run a vote through slashing protection; a storage failure halts the layer.
    fn guard_vote(&mut self, vote: &SignedVote, own: bool) -> ConsensusResult<()> {
        let result = if own {
            self.protector.guard_own_vote(vote)
        } else {
            self.protector.check_and_record(vote)
        };
        if let Err(ConsensusError::StorageUnavailable(reason)) = &result {
            self.halt_layer(
                vote.layer,
                format!("slashing protection storage unavailable: {}", reason),
            );
        }
        result
    }

    // === INBOUND ===

    /// Process a message from a peer. Never fails the caller.
    ///
    /// Parked messages released while handling it are replayed before
    /// returning.
    pub async fn handle_message(&mut self, message: NetworkMessage) -> MessageDisposition {
        let disposition = self.dispatch(message).await;
        self.replay_pending().await;
        self.publish_status();
        disposition
    }

    /// Feed released messages back through the inbound pipeline until none
    /// are ready. Replaying may release more.
    async fn replay_pending(&mut self) {
        while let Some(message) = self.pending.pop_ready() {
            debug!(
                "[consensus] replaying {} {} for slot {}",
                message.message.layer(),
                message.message.kind(),
                message.message.slot().number
            );
            self.dispatch(message).await;
        }
    }

    async fn dispatch(&mut self, message: NetworkMessage) -> MessageDisposition {
        let kind = message.message.kind();
        let layer = message.message.layer();
        let sender = message.message.sender();

        let disposition = self.route(message).await;
        match &disposition {
            MessageDisposition::Accepted => self.messages_accepted += 1,
            MessageDisposition::Duplicate => {}
            MessageDisposition::Pending => debug!(
                "[consensus] parked {} {} from {} ({} pending)",
                layer,
                kind,
                sender.short(),
                self.pending.len()
            ),
            MessageDisposition::Rejected(e) => {
                self.messages_rejected += 1;
                metrics::record_message_rejected(e.label());
                debug!(
                    "[consensus] rejected {} {} from {}: {}",
                    layer,
                    kind,
                    sender.short(),
                    e
                );
            }
        }
        disposition
    }

    async fn route(&mut self, message: NetworkMessage) -> MessageDisposition {
        if message.network_id != self.config.network_id {
            return MessageDisposition::Rejected(ConsensusError::NetworkMismatch {
                expected: self.config.network_id,
                actual: message.network_id,
            });
        }
        let epoch = self.randao.epoch();
        if message.epoch == epoch + 1 {
            // Sent by a peer that already rotated; its signatures are checked
            // against the next set once this node rotates too
            let layer = message.message.layer();
            let checked = self
                .core(layer)
                .ensure_active()
                .and_then(|_| self.core(layer).check_slot_window(message.message.slot()));
            if let Err(e) = checked {
                return MessageDisposition::Rejected(e);
            }
            let actual = message.epoch;
            if self.pending.park(Dependency::Epoch(actual), message) {
                return MessageDisposition::Pending;
            }
            return MessageDisposition::Rejected(ConsensusError::EpochMismatch {
                expected: epoch,
                actual,
            });
        }
        if message.epoch != epoch {
            return MessageDisposition::Rejected(ConsensusError::EpochMismatch {
                expected: epoch,
                actual: message.epoch,
            });
        }
        match message.message {
            ConsensusMessage::Proposal(block) => self.process_proposal(block).await,
            ConsensusMessage::Attestation(attestation) => {
                self.process_attestation(attestation).await
            }
        }
    }

    fn verify_signed(
        &self,
        validator: &ValidatorId,
        digest: &Hash,
        signature: &Signature,
    ) -> ConsensusResult<()> {
        let info = self
            .validators
            .get(validator)
            .ok_or(ConsensusError::UnknownValidator(*validator))?;
        if self.verifier.verify(&info.public_key, digest, signature) {
            Ok(())
        } else {
            Err(ConsensusError::InvalidSignature(*validator))
        }
    }

    async fn process_proposal(&mut self, block: Block) -> MessageDisposition {
        let layer = block.layer;
        let hash = block.hash();

        if let Err(e) = self.core(layer).ensure_active() {
            return MessageDisposition::Rejected(e);
        }
        if self.chain(layer).contains(&hash) {
            return MessageDisposition::Duplicate;
        }

        let checked = match layer {
            Layer::Commerce => self.commerce.validate_proposal(&block),
            Layer::Security => self.security.validate_proposal(&block, self.commerce.chain()),
        };
        let missing = match &checked {
            Err(ConsensusError::UnknownParent { parent }) => Some(*parent),
            Err(ConsensusError::UnknownBlock { block }) => Some(*block),
            _ => None,
        };
        let signed = self
            .verify_signed(&block.proposer, &hash, &block.signature)
            .and_then(|_| {
                self.verify_signed(
                    &block.proposer,
                    &reveal_digest(self.randao.epoch()),
                    &block.randao_reveal,
                )
            });
        if let (Some(missing), Ok(())) = (missing, &signed) {
            return self.park_for_block(missing, ConsensusMessage::Proposal(block), checked);
        }
        if let Err(e) = checked.and(signed) {
            return MessageDisposition::Rejected(e);
        }

        let vote = SignedVote {
            validator: block.proposer,
            layer,
            kind: MessageKind::Proposal,
            slot: block.slot.number,
            digest: hash,
            checkpoint_range: None,
        };
        if let Err(e) = self.guard_vote(&vote, false) {
            return MessageDisposition::Rejected(e);
        }

        let slot = block.slot;
        let proposer = block.proposer;
        let accepted = match layer {
            Layer::Commerce => self.commerce.accept_proposal(block),
            Layer::Security => {
                let total = self.validators.total_stake();
                self.security.accept_proposal(block, total)
            }
        };
        match accepted {
            Ok(true) => {}
            Ok(false) => return MessageDisposition::Duplicate,
            Err(e) => return MessageDisposition::Rejected(e),
        }
        let released = self.pending.release_block(&hash);
        debug!(
            "[consensus] accepted {} block {} at slot {} from {} ({} waiting messages released)",
            layer,
            hex::encode(&hash[..4]),
            slot.number,
            proposer.short(),
            released
        );

        self.attest(slot, hash).await;
        MessageDisposition::Accepted
    }

    async fn process_attestation(&mut self, attestation: Attestation) -> MessageDisposition {
        let layer = attestation.layer;

        if let Err(e) = self.core(layer).ensure_active() {
            return MessageDisposition::Rejected(e);
        }
        if attestation.slot.number < self.pool.watermark(layer) {
            return MessageDisposition::Duplicate;
        }

        let checked = match layer {
            Layer::Commerce => self.commerce.validate_attestation(&attestation),
            Layer::Security => self.security.validate_attestation(&attestation),
        };
        let digest = attestation.digest();
        let signed = self.verify_signed(&attestation.validator, &digest, &attestation.signature);
        let missing = match (&checked, &signed) {
            (Err(ConsensusError::UnknownBlock { block }), Ok(())) => Some(*block),
            _ => None,
        };
        if let Some(block) = missing {
            return self.park_for_block(block, ConsensusMessage::Attestation(attestation), checked);
        }
        if let Err(e) = checked.and(signed) {
            return MessageDisposition::Rejected(e);
        }

        let vote = SignedVote {
            validator: attestation.validator,
            layer,
            kind: MessageKind::Attestation,
            slot: attestation.slot.number,
            digest,
            checkpoint_range: attestation.checkpoint_range,
        };
        if let Err(e) = self.guard_vote(&vote, false) {
            return MessageDisposition::Rejected(e);
        }

        let slot = attestation.slot;
        let block = attestation.block_ref;
        let validator = attestation.validator;
        match self.pool.add(attestation) {
            Ok(AttestationOutcome::Accepted) => {}
            Ok(AttestationOutcome::DuplicateIgnored) | Ok(AttestationOutcome::Superseded) => {
                return MessageDisposition::Duplicate
            }
            Ok(AttestationOutcome::Conflict { existing }) => {
                let offense = SlashableOffense::DoubleVote {
                    validator,
                    layer,
                    kind: MessageKind::Attestation,
                    slot: slot.number,
                    first: existing.digest(),
                    second: digest,
                };
                self.protector.record_offense(offense.clone());
                return MessageDisposition::Rejected(ConsensusError::Slashable(Box::new(offense)));
            }
            Err(e) => return MessageDisposition::Rejected(e),
        }

        let aggregate = self.pool.aggregate(layer, slot.number, &block);
        if aggregate.quorum {
            self.on_quorum(slot, block, aggregate).await;
        }
        MessageDisposition::Accepted
    }

    /// Hold a signed message until `block` is accepted. A full buffer
    /// rejects it with the original error.
    fn park_for_block(
        &mut self,
        block: Hash,
        message: ConsensusMessage,
        checked: ConsensusResult<()>,
    ) -> MessageDisposition {
        let envelope = NetworkMessage {
            network_id: self.config.network_id,
            epoch: self.randao.epoch(),
            message,
        };
        if self.pending.park(Dependency::Block(block), envelope) {
            return MessageDisposition::Pending;
        }
        match checked {
            Err(e) => MessageDisposition::Rejected(e),
            Ok(()) => MessageDisposition::Rejected(ConsensusError::UnknownBlock { block }),
        }
    }

    // === QUORUM & FINALITY ===

    async fn on_quorum(&mut self, slot: SlotId, block: Hash, aggregate: AggregateWeight) {
        match slot.layer {
            Layer::Commerce => {
                if self.commerce.on_quorum(&block, slot) {
                    info!(
                        "[consensus] commerce slot {} reached quorum ({}/{} stake, {} validators); provisional head {}",
                        slot.number,
                        aggregate.weight,
                        aggregate.total,
                        aggregate.participants,
                        hex::encode(&block[..4])
                    );
                }
            }
            Layer::Security => match self.security.on_quorum(&block, aggregate.weight) {
                Ok(Some(checkpoint)) => self.finalize_checkpoint(checkpoint).await,
                Ok(None) => {}
                Err(e) => warn!(
                    "[consensus] security quorum for {} not applied: {}",
                    hex::encode(&block[..4]),
                    e
                ),
            },
        }
    }

    /// Apply a checkpoint that just became final, then rotate validator sets.
    async fn finalize_checkpoint(&mut self, checkpoint: FinalityCheckpoint) {
        // Reveals are read before the commerce barrier prunes the covered blocks
        let chain = self.commerce.chain();
        let barrier = chain.finalized().hash;
        let mut reveals: Vec<Signature> = checkpoint
            .covered
            .iter()
            .filter(|hash| **hash != barrier && chain.is_descendant(hash, &barrier))
            .filter_map(|hash| chain.block(hash).map(|b| b.randao_reveal.clone()))
            .collect();
        if let Some(block) = self.security.chain().block(&checkpoint.block_hash) {
            reveals.push(block.randao_reveal.clone());
        }

        if let Some(last) = checkpoint.last_covered() {
            if let Err(e) = self.commerce.apply_finality(last) {
                warn!("[consensus] commerce barrier not moved: {}", e);
            }
        }
        let rebased = self.security.rebase_pending(self.commerce.chain());
        if rebased > 0 {
            debug!(
                "[consensus] dropped {} already-final blocks from pending checkpoints",
                rebased
            );
        }
        let commerce_final = self.commerce.finalized();
        self.pool
            .discard_through(Layer::Commerce, commerce_final.slot.number);
        self.pool.discard_through(Layer::Security, checkpoint.slot.number);

        for reveal in &reveals {
            self.randao.mix_in(reveal.as_bytes());
        }
        let contributions = self.randao.contributions();
        let seed = self.randao.advance_epoch();
        let validator_epoch = self.randao.epoch();

        info!(
            "[consensus] checkpoint epoch {} final ({:.1}% stake): {} commerce blocks, commerce finalized at slot {}",
            checkpoint.epoch,
            checkpoint.participation_percent(),
            checkpoint.covered.len(),
            commerce_final.slot.number
        );
        metrics::record_checkpoint_finalized(checkpoint.epoch);

        let reference = FinalizedCheckpointRef {
            epoch: checkpoint.epoch,
            security_slot: checkpoint.slot,
            security_hash: checkpoint.block_hash,
            commerce_slot: commerce_final.slot,
            commerce_hash: commerce_final.hash,
            validator_epoch,
            seed,
        };
        let persisted = self.store.put_finalized(&reference);
        self.last_finalized = Some(reference);
        if let Err(e) = persisted {
            self.halt_all(format!("failed to persist finalized checkpoint: {}", e));
            return;
        }

        debug!(
            "[consensus] seed for validator epoch {} from {} reveals: {}",
            validator_epoch,
            contributions,
            hex::encode(&seed[..4])
        );
        self.rotate_validators(validator_epoch, seed).await;
    }

    /// Install the validator set and seed of `epoch` on both engines.
    async fn rotate_validators(&mut self, epoch: u64, seed: Hash) {
        let fetched = self.validator_provider.validator_set_at_epoch(epoch).await;
        let validators = match fetched {
            Ok(set) => Arc::new(set.with_epoch(epoch)),
            Err(e) => {
                let error = ConsensusError::ValidatorSetUnavailable {
                    epoch,
                    reason: e.to_string(),
                };
                self.halt_all(error.to_string());
                return;
            }
        };

        let view = EpochView {
            epoch,
            validators: Arc::clone(&validators),
            seed,
        };
        self.commerce.core_mut().refresh_view(view.clone());
        self.security.core_mut().refresh_view(view);
        for layer in Layer::ALL {
            self.pool.set_validators(layer, Arc::clone(&validators));
        }
        let released = self.pending.release_epoch(epoch);
        info!(
            "[consensus] rotated to validator epoch {}: {} validators, total stake {}, {} early messages released",
            epoch,
            validators.len(),
            validators.total_stake(),
            released
        );
        self.validators = validators;
    }

    // === HALT & SHUTDOWN ===

    fn halt_layer(&mut self, layer: Layer, reason: String) {
        error!("[consensus] halting {} layer: {}", layer, reason);
        self.core_mut(layer).halt(reason);
        metrics::set_layer_halted(layer.as_str(), true);
    }

    fn halt_all(&mut self, reason: String) {
        for layer in Layer::ALL {
            self.halt_layer(layer, reason.clone());
        }
    }

    /// Stop opening slots; in-flight quorum rounds may still complete.
    pub fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!("[consensus] shutdown requested, draining in-flight rounds");
        self.publish_status();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn has_in_flight_rounds(&self) -> bool {
        self.commerce.core().has_in_flight_round() || self.security.core().has_in_flight_round()
    }

    /// Stop both engines.
    pub fn stop(&mut self) {
        self.shutting_down = true;
        for layer in Layer::ALL {
            self.core_mut(layer).stop();
        }
        info!(
            "[consensus] stopped ({} accepted, {} rejected messages)",
            self.messages_accepted, self.messages_rejected
        );
        self.publish_status();
    }

    // === STATUS ===

    fn health(&self) -> NodeHealth {
        let halted: Vec<String> = Layer::ALL
            .iter()
            .filter_map(|&layer| {
                self.core(layer)
                    .halt_reason()
                    .map(|reason| format!("{} halted: {}", layer, reason))
            })
            .collect();
        if !halted.is_empty() {
            return NodeHealth::Degraded {
                reason: halted.join("; "),
            };
        }
        if Layer::ALL
            .iter()
            .all(|&layer| self.core(layer).phase() == EnginePhase::Stopped)
        {
            return NodeHealth::Stopped;
        }
        NodeHealth::Healthy
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            network_id: self.config.network_id,
            validator_epoch: self.randao.epoch(),
            is_validator: self.commerce.core().is_validator(),
            commerce: layer_status(self.commerce.core(), self.commerce.chain()),
            security: layer_status(self.security.core(), self.security.chain()),
            last_finalized: self.last_finalized.clone(),
            slashing_offenses: self.protector.offense_count(),
            messages_accepted: self.messages_accepted,
            messages_rejected: self.messages_rejected,
            pending_messages: self.pending.len(),
            health: self.health(),
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status());
    }
}

fn layer_status(core: &EngineCore, chain: &BlockTree) -> LayerStatus {
    let head = chain.head();
    let provisional = chain.provisional_head();
    let finalized = chain.finalized();
    LayerStatus {
        layer: core.layer(),
        phase: core.phase(),
        current_slot: core.current_slot(),
        head: head.hash,
        head_slot: head.slot.number,
        provisional_head: provisional.hash,
        provisional_slot: provisional.slot.number,
        finalized: finalized.hash,
        finalized_slot: finalized.slot.number,
        stats: core.stats(),
    }
}

#[async_trait]
impl ConsensusApi for ConsensusCoordinator {
    async fn on_slot_boundary(
        &mut self,
        layer: Layer,
        slot_number: u64,
    ) -> ConsensusResult<Option<SlotOutcome>> {
        ConsensusCoordinator::on_slot_boundary(self, layer, slot_number).await
    }

    async fn handle_message(&mut self, message: NetworkMessage) -> MessageDisposition {
        ConsensusCoordinator::handle_message(self, message).await
    }

    fn status(&self) -> StatusSnapshot {
        ConsensusCoordinator::status(self)
    }
}
