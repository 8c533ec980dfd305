//! Adapters layer - concrete implementations of the outbound ports

pub mod file_store;
pub mod memory_store;
pub mod network;
pub mod providers;
pub mod signing;

pub use file_store::FileBackedKVStore;
pub use memory_store::InMemoryKVStore;
pub use network::{ChannelNetwork, RecordingNetwork};
pub use providers::{SlotPayloadSource, StaticValidatorSetProvider};
pub use signing::{Ed25519ValidatorKey, Ed25519Verifier};
