//! Operator interface: narrow read API plus a single mode-change request.
//!
//! Readers get end-of-tick snapshots from the store and an event tap; the
//! only supported mutation is a mode request the scheduler observes at the
//! next tick boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::Receiver;

use ccs_common::decision::{Decision, OperatingMode};
use ccs_common::events::EventRecord;
use ccs_common::group::{GROUP_COUNT, GroupState};
use ccs_common::telemetry::TelemetryFrame;

use crate::events::EventSink;
use crate::store::{ControlSnapshot, StoreReader};
use crate::window::WindowSummary;

/// Shared operating-mode request cell.
#[derive(Clone)]
pub struct ModeSwitch {
    requested: Arc<AtomicU8>,
}

impl ModeSwitch {
    pub fn new(initial: OperatingMode) -> Self {
        Self {
            requested: Arc::new(AtomicU8::new(initial as u8)),
        }
    }

    /// Request a mode; takes effect at the next tick boundary.
    pub fn request(&self, mode: OperatingMode) {
        self.requested.store(mode as u8, Ordering::Release);
    }

    /// Currently requested mode.
    pub fn requested(&self) -> OperatingMode {
        OperatingMode::from_u8(self.requested.load(Ordering::Acquire))
            .unwrap_or(OperatingMode::Auto)
    }
}

/// Handle given to the dashboard and other external collaborators.
#[derive(Clone)]
pub struct OperatorApi {
    store: StoreReader,
    sink: EventSink,
    mode: ModeSwitch,
}

impl OperatorApi {
    pub fn new(store: StoreReader, sink: EventSink, mode: ModeSwitch) -> Self {
        Self { store, sink, mode }
    }

    /// Full end-of-tick snapshot.
    pub fn snapshot(&self) -> ControlSnapshot {
        self.store.snapshot()
    }

    pub fn latest_frame(&self) -> Option<TelemetryFrame> {
        self.store.snapshot().frame
    }

    pub fn latest_decision(&self) -> Option<Decision> {
        self.store.snapshot().decision
    }

    pub fn group_states(&self) -> [GroupState; GROUP_COUNT] {
        self.store.snapshot().groups
    }

    pub fn window_summary(&self) -> WindowSummary {
        self.store.snapshot().window
    }

    /// Bounded event tap; slow consumers lose records, never stall the loop.
    pub fn subscribe_events(&self) -> Receiver<EventRecord> {
        self.sink.subscribe()
    }

    /// Request an operating mode for the next tick.
    pub fn request_mode(&self, mode: OperatingMode) {
        self.mode.request(mode);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
