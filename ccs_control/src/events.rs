//! Bounded event sink with a drop-oldest policy and a drain worker.
//!
//! `publish` never blocks the scheduler: when the queue is full the oldest
//! record is dropped and a counter incremented. The drain worker runs on
//! its own thread, forwards records to `tracing` and an optional JSON-lines
//! file, and fans out to subscriber taps. Nothing feeds back into the
//! control loop.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use ccs_common::events::{EventKind, EventRecord};

/// Per-subscriber tap capacity; slow readers lose records, never block.
const TAP_CAPACITY: usize = 256;

struct Shared {
    queue: Mutex<VecDeque<EventRecord>>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
    shutdown: AtomicBool,
    taps: Mutex<Vec<SyncSender<EventRecord>>>,
}

/// Cloneable sink handle.
#[derive(Clone)]
pub struct EventSink {
    shared: Arc<Shared>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                available: Condvar::new(),
                capacity,
                dropped: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                taps: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Append a record; drop-oldest under back-pressure. Never blocks
    /// beyond the queue lock.
    pub fn publish(&self, record: EventRecord) {
        {
            let mut q = self.shared.queue.lock().expect("event queue poisoned");
            if q.len() >= self.shared.capacity {
                q.pop_front();
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
            q.push_back(record);
        }
        self.shared.available.notify_one();
    }

    /// Records dropped so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Subscribe a bounded tap fed by the drain worker.
    pub fn subscribe(&self) -> Receiver<EventRecord> {
        let (tx, rx) = sync_channel(TAP_CAPACITY);
        self.shared.taps.lock().expect("taps poisoned").push(tx);
        rx
    }

    /// Ask the drain worker to flush and exit.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.available.notify_all();
    }

    /// Spawn the drain worker.
    pub fn spawn_drain(&self, log_path: Option<PathBuf>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("ccs-event-drain".into())
            .spawn(move || drain_loop(&shared, log_path))
            .expect("spawn event drain thread")
    }
}

fn drain_loop(shared: &Shared, log_path: Option<PathBuf>) {
    let mut log = log_path.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "event log unavailable");
                None
            }
        }
    });
    let mut batch: Vec<EventRecord> = Vec::with_capacity(64);

    loop {
        batch.clear();
        {
            let mut q = shared.queue.lock().expect("event queue poisoned");
            while q.is_empty() && !shared.shutdown.load(Ordering::Acquire) {
                let (guard, _timeout) = shared
                    .available
                    .wait_timeout(q, Duration::from_millis(250))
                    .expect("event queue poisoned");
                q = guard;
            }
            batch.extend(q.drain(..));
        }

        if batch.is_empty() && shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let mut taps = shared.taps.lock().expect("taps poisoned");
        for record in &batch {
            match &record.kind {
                EventKind::DeadlineMiss { .. }
                | EventKind::TransportFailure { .. }
                | EventKind::DegradedEntered { .. }
                | EventKind::PredictorLoadFailed { .. }
                | EventKind::PredictorFault { .. }
                | EventKind::ControllerWarning { .. } => {
                    warn!(tick = record.tick, event = ?record.kind, "supervisor event");
                }
                _ => {
                    info!(tick = record.tick, event = ?record.kind, "supervisor event");
                }
            }
            if let Some(w) = log.as_mut() {
                match serde_json::to_string(record) {
                    Ok(line) => {
                        let _ = writeln!(w, "{line}");
                    }
                    Err(e) => warn!(error = %e, "event serialization failed"),
                }
            }
            // Slow or vanished taps lose records rather than block.
            taps.retain(|tap| !matches!(tap.try_send(record.clone()), Err(std::sync::mpsc::TrySendError::Disconnected(_))));
        }
        drop(taps);

        if let Some(w) = log.as_mut() {
            let _ = w.flush();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
