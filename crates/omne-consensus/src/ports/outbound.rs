//! Outbound ports (driven side)
//!
//! Narrow interfaces to the collaborators the consensus core depends on:
//! transport, key management, signature verification, validator-set
//! source, payload source, durable storage and time.

use crate::domain::{OutboundMessage, Signature, ValidatorSet};
use async_trait::async_trait;
use shared_types::{Hash, KVStoreError, PublicKey, SlotId, ValidatorId};
use thiserror::Error;

/// Failures reported by outbound adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Validator set source failed: {0}")]
    ValidatorSource(String),

    #[error("Payload source failed: {0}")]
    Payload(String),
}

/// Gossip transport.
///
/// `broadcast` must not block: adapters enqueue and return.
pub trait NetworkGateway: Send + Sync {
    fn broadcast(&self, message: OutboundMessage) -> Result<(), PortError>;
}

/// This node's validator key. The raw key never leaves the adapter.
pub trait ValidatorKey: Send + Sync {
    fn identity(&self) -> ValidatorId;

    /// Sign a 32-byte digest.
    fn sign(&self, digest: &Hash) -> Result<Signature, PortError>;
}

/// Verifies peer signatures over digests.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &PublicKey, digest: &Hash, signature: &Signature) -> bool;
}

/// Source of validator sets per validator-set epoch.
#[async_trait]
pub trait ValidatorSetProvider: Send + Sync {
    async fn validator_set_at_epoch(&self, epoch: u64) -> Result<ValidatorSet, PortError>;
}

/// Supplies the payload commitment of a block this node proposes.
pub trait PayloadSource: Send + Sync {
    fn payload_commitment(&self, slot: SlotId) -> Result<Hash, PortError>;
}

/// Result of a prefix scan.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Abstract interface for key-value storage.
///
/// Slashing-protection history and the last finalized checkpoint live here.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair. Durable once `Ok` is returned.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;

    /// Iterate over keys with a prefix.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Wall-clock source for the slot clocks.
pub trait TimeSource: Send + Sync {
    /// Current unix time in milliseconds
    fn now_ms(&self) -> u64;
}

/// Default time source using system time
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
