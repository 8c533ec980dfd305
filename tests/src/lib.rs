//! # Omne Test Suite
//!
//! Cross-node tests of the consensus core. Unit tests live next to the code
//! in each crate; this crate covers what needs several validators.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs          # Stepped and live multi-node clusters
//! └── integration/
//!     ├── finality_flow.rs  # Provisional -> checkpoint -> final, rotation
//!     ├── safety.rs         # Equivocation, finality conflicts, restarts
//!     └── live_cluster.rs   # Real tickers and async delivery
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p omne-tests
//! cargo test -p omne-tests integration::safety::
//! ```

#![allow(dead_code)]

pub mod harness;
pub mod integration;
