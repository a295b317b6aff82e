//! Control-state store: single writer, snapshot readers.
//!
//! The scheduler owns the only [`StoreWriter`] and commits once per tick;
//! readers clone a consistent end-of-tick snapshot and never observe a
//! partially updated state. No singletons — the store is passed in.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use ccs_common::decision::{Decision, OperatingMode};
use ccs_common::group::{GROUP_COUNT, GroupEnvelope, GroupId, GroupState};
use ccs_common::telemetry::TelemetryFrame;

use crate::window::WindowSummary;

/// End-of-tick snapshot of everything the outside world may read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSnapshot {
    /// Index of the tick that produced this snapshot (0 before the first).
    pub tick: u64,
    /// Latest telemetry frame, stale or not.
    pub frame: Option<TelemetryFrame>,
    /// Latest decision.
    pub decision: Option<Decision>,
    /// Per-group persistent state, indexed by [`GroupId::index`].
    pub groups: [GroupState; GROUP_COUNT],
    /// Rolling-window summary statistics.
    pub window: WindowSummary,
    /// Operating mode in force.
    pub operating_mode: OperatingMode,
    /// Degraded-mode flag.
    pub degraded: bool,
    /// Events dropped by the sink so far.
    pub events_dropped: u64,
}

impl ControlSnapshot {
    /// Pre-first-tick snapshot at the start-up operating point.
    pub fn initial(envelopes: &[GroupEnvelope; GROUP_COUNT], window_capacity: usize) -> Self {
        Self {
            tick: 0,
            frame: None,
            decision: None,
            groups: [
                GroupState::startup(&envelopes[GroupId::SwPumps.index()]),
                GroupState::startup(&envelopes[GroupId::FwPumps.index()]),
                GroupState::startup(&envelopes[GroupId::ErFans.index()]),
            ],
            window: WindowSummary::empty(window_capacity),
            operating_mode: OperatingMode::Auto,
            degraded: false,
            events_dropped: 0,
        }
    }
}

/// Create a store seeded with `initial`.
pub fn new_store(initial: ControlSnapshot) -> (StoreWriter, StoreReader) {
    let inner = Arc::new(RwLock::new(initial));
    (
        StoreWriter {
            inner: Arc::clone(&inner),
        },
        StoreReader { inner },
    )
}

/// Exclusive write handle (not cloneable: exactly one writer exists).
pub struct StoreWriter {
    inner: Arc<RwLock<ControlSnapshot>>,
}

impl StoreWriter {
    /// Atomically replace the published snapshot.
    pub fn commit(&self, snapshot: ControlSnapshot) {
        let mut guard = self.inner.write().expect("store lock poisoned");
        *guard = snapshot;
    }
}

/// Shared read handle.
#[derive(Clone)]
pub struct StoreReader {
    inner: Arc<RwLock<ControlSnapshot>>,
}

impl StoreReader {
    /// Clone the latest committed snapshot.
    pub fn snapshot(&self) -> ControlSnapshot {
        self.inner.read().expect("store lock poisoned").clone()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
