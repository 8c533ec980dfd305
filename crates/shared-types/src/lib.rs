//! # Shared Types Crate
//!
//! Primitive identifiers used by every crate of the Omne validator workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: layer, slot and identity types are defined once.
//! - **Plain data**: no behavior beyond formatting and slot arithmetic lives here.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
