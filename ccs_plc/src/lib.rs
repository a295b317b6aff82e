//! # CCS PLC Adapter
//!
//! Telemetry adapter between the control kernel and the PLC. Two
//! transports sit behind the [`adapter::FrameTransport`] capability trait:
//!
//! - [`live::ModbusTransport`] — Modbus-TCP client for the shipboard PLC
//! - [`sim::SimTransport`] — deterministic physics simulator with
//!   scriptable fault injection
//!
//! The adapter is the only place where the wire format is interpreted; it
//! normalises fixed-point register values to engineering units and rejects
//! frames containing any NaN or out-of-range sensor. Everything above the
//! adapter line sees [`ccs_common::telemetry::TelemetryFrame`] and
//! [`ccs_common::telemetry::CommandFrame`] only.

pub mod adapter;
pub mod live;
pub mod registers;
pub mod sim;

pub use adapter::{FrameTransport, PlcAdapter};
pub use sim::{SimHandle, SimTransport};
