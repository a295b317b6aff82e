//! Error taxonomy crossing crate boundaries.
//!
//! Recoverable conditions inside the control loop are expressed as explicit
//! states (`is_stale`, null prediction, `safety_override`), never as
//! unwinding; these types cover the adapter boundary and fatal start-up
//! paths only.

use thiserror::Error;

/// Errors crossing the telemetry adapter boundary.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The bounded deadline elapsed before the transport answered.
    #[error("transport deadline exceeded after {0} ms")]
    Timeout(u64),

    /// Wire-level or connection fault.
    #[error("transport fault: {0}")]
    Fault(String),

    /// A sensor value failed the frame invariants (NaN or out of range).
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

impl TransportError {
    /// True for faults that count toward the consecutive-failure staleness
    /// escalation (all of them do; rejection is treated like a timeout).
    #[inline]
    pub const fn is_frame_loss(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Fault(_) | Self::OutOfRange { .. }
        )
    }
}

/// Fatal supervisor errors (start-up validation and teardown only).
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("transport start-up: {0}")]
    Transport(#[from] TransportError),
}
