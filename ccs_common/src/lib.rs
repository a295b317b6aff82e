//! CCS Common Library
//!
//! This crate provides the shared vocabulary of the cooling-control
//! supervisor workspace: telemetry and command frames, VFD group
//! definitions, decisions, predictions, event records, the configuration
//! tree, and the error taxonomy crossing crate boundaries.
//!
//! # Module Structure
//!
//! - [`telemetry`] - Sensor and command frames exchanged with the PLC
//! - [`group`] - VFD group identifiers, envelopes, and persistent state
//! - [`decision`] - Per-tick decisions, applied-rule flags, operating modes
//! - [`prediction`] - Short-horizon temperature prediction records
//! - [`events`] - Structured event records for the external collaborators
//! - [`config`] - Configuration types with validation
//! - [`error`] - Error taxonomy shared across crates

pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod group;
pub mod prediction;
pub mod telemetry;
