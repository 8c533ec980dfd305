//! Cross-node consensus scenarios.

pub mod finality_flow;
pub mod live_cluster;
pub mod reordering;
pub mod safety;
