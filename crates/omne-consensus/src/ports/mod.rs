//! Ports layer - Hexagonal architecture interfaces

pub mod inbound;
pub mod outbound;

pub use inbound::{ConsensusApi, LayerStatus, MessageDisposition, StatusHandle, StatusSnapshot};
pub use outbound::{
    BatchOperation, KeyValueStore, NetworkGateway, PayloadSource, PortError, ScanResult,
    SignatureVerifier, SystemTimeSource, TimeSource, ValidatorKey, ValidatorSetProvider,
};
