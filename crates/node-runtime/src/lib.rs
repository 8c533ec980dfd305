//! # Omne Node
//!
//! Library half of the `omne-node` binary, exposed for tests.
//!
//! - `config` - network preset plus `OMNE_*` environment overrides
//! - `runtime` - wires the consensus coordinator to its store, key and transport

pub mod config;
pub mod runtime;

pub use config::{ConfigError, NodeConfig};
pub use runtime::NodeRuntime;
