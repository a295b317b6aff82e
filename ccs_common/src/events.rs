//! Structured event records for the external collaborators.
//!
//! The event sink appends these to a bounded queue; the drain worker
//! serializes them as JSON lines. Records are self-contained: tick index,
//! monotonic timestamp, and a typed payload.

use serde::{Deserialize, Serialize};

use crate::decision::{OperatingMode, RuleFlags};
use crate::group::GroupId;

/// Which transport operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPhase {
    Read,
    Write,
}

/// Typed event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A decision was emitted and its command written (or attempted).
    DecisionEmitted {
        safety_override: bool,
        used_prediction: bool,
    },
    /// One or more rules fired for a group this tick.
    RuleActivated { group: GroupId, rules: RuleFlags },
    /// The count state machine changed a group's running count.
    CountChanged { group: GroupId, from: u8, to: u8 },
    /// The tick body overran its period.
    DeadlineMiss { overrun_ms: u64, consecutive: u32 },
    /// A transport operation failed.
    TransportFailure {
        phase: TransportPhase,
        detail: String,
    },
    /// The predictor artefact finished loading.
    PredictorLoaded { artefact_bytes: usize },
    /// The predictor artefact failed to load; null predictor in force.
    PredictorLoadFailed { detail: String },
    /// Inference produced unusable output; null prediction substituted.
    PredictorFault { detail: String },
    /// The scheduler entered degraded mode.
    DegradedEntered { cause: String },
    /// The scheduler recovered from degraded mode.
    DegradedCleared,
    /// The operator-requested operating mode took effect.
    ModeChanged {
        from: OperatingMode,
        to: OperatingMode,
    },
    /// The controller received violating inputs and clamped them.
    ControllerWarning { group: GroupId, detail: String },
    /// The sink dropped records under back-pressure.
    EventsDropped { count: u64 },
}

/// One event-stream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Tick index at emission.
    pub tick: u64,
    /// Monotonic timestamp [ns].
    pub timestamp_ns: u64,
    /// Typed payload.
    #[serde(flatten)]
    pub kind: EventKind,
}
