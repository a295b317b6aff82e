//! Rolling telemetry window with per-channel statistics.
//!
//! A fixed-capacity ring of at most 90 samples at a 20 s stride — thirty
//! minutes of history independent of tick-rate drift. Append is O(1);
//! statistics are O(n ≤ 90) over pre-sized storage, no allocation.

use heapless::Deque;
use serde::{Deserialize, Serialize};

use ccs_common::config::{WINDOW_CAPACITY_DEFAULT, WINDOW_SLOTS};
use ccs_common::telemetry::{TEMP_CHANNEL_COUNT, TelemetryFrame, TempChannel};

static_assertions::const_assert!(WINDOW_CAPACITY_DEFAULT <= WINDOW_SLOTS);

/// Stride tolerance against scheduler jitter [ns].
const STRIDE_JITTER_MARGIN_NS: u64 = 250_000_000;

// ─── Samples & Channels ─────────────────────────────────────────────

/// Compact per-sample copy of the archived channels.
#[derive(Debug, Clone, Copy)]
pub struct WindowSample {
    pub timestamp_ns: u64,
    pub temps_c: [f64; TEMP_CHANNEL_COUNT],
    pub px1_bar: f64,
    pub engine_load_pct: f64,
}

impl From<&TelemetryFrame> for WindowSample {
    fn from(frame: &TelemetryFrame) -> Self {
        Self {
            timestamp_ns: frame.timestamp_ns,
            temps_c: frame.temps_c,
            px1_bar: frame.px1_bar,
            engine_load_pct: frame.engine_load_pct,
        }
    }
}

/// Channel selector for window queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowChannel {
    Temp(TempChannel),
    Pressure,
    EngineLoad,
}

impl WindowSample {
    #[inline]
    fn value(&self, channel: WindowChannel) -> f64 {
        match channel {
            WindowChannel::Temp(ch) => self.temps_c[ch.index()],
            WindowChannel::Pressure => self.px1_bar,
            WindowChannel::EngineLoad => self.engine_load_pct,
        }
    }
}

/// Per-channel window statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Most recent retained value.
    pub current: f64,
    /// Window mean.
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// Least-squares slope [unit/min].
    pub slope_per_min: f64,
}

impl ChannelStats {
    const ZERO: Self = Self {
        current: 0.0,
        mean: 0.0,
        stddev: 0.0,
        slope_per_min: 0.0,
    };
}

/// Summary published to the store for dashboard readers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub len: usize,
    pub capacity: usize,
    pub fill_ratio: f64,
    pub t4: ChannelStats,
    pub t5: ChannelStats,
    pub t6: ChannelStats,
    pub px1: ChannelStats,
}

impl WindowSummary {
    pub const fn empty(capacity: usize) -> Self {
        Self {
            len: 0,
            capacity,
            fill_ratio: 0.0,
            t4: ChannelStats::ZERO,
            t5: ChannelStats::ZERO,
            t6: ChannelStats::ZERO,
            px1: ChannelStats::ZERO,
        }
    }
}

// ─── Window ─────────────────────────────────────────────────────────

/// Fixed-capacity, stride-gated telemetry window.
///
/// Invariants: `len ≤ capacity ≤ 90`; retained timestamps strictly
/// monotonic; gap between retained samples at least the stride minus the
/// jitter margin.
pub struct Window {
    samples: Deque<WindowSample, WINDOW_SLOTS>,
    capacity: usize,
    min_gap_ns: u64,
}

impl Window {
    /// Create a window with the configured capacity and stride.
    pub fn new(capacity: usize, stride_s: f64) -> Self {
        let capacity = capacity.clamp(2, WINDOW_SLOTS);
        let stride_ns = (stride_s * 1e9) as u64;
        Self {
            samples: Deque::new(),
            capacity,
            min_gap_ns: stride_ns.saturating_sub(STRIDE_JITTER_MARGIN_NS),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Prediction sufficiency: at least 75 % full.
    #[inline]
    pub fn is_sufficient(&self) -> bool {
        self.len() * 4 >= self.capacity * 3
    }

    /// Stride-gated append. Returns true when the frame was retained.
    ///
    /// Frames inside the stride gap, or not strictly after the last
    /// retained sample, are used by the live layers only and not archived.
    pub fn append(&mut self, frame: &TelemetryFrame) -> bool {
        if let Some(last) = self.samples.back() {
            if frame.timestamp_ns <= last.timestamp_ns {
                return false;
            }
            if frame.timestamp_ns - last.timestamp_ns < self.min_gap_ns {
                return false;
            }
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        // Capacity is bounded by WINDOW_SLOTS, so the push cannot fail.
        let _ = self.samples.push_back(WindowSample::from(frame));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowSample> {
        self.samples.iter()
    }

    /// Full-window statistics for one channel. `None` while empty.
    pub fn stats(&self, channel: WindowChannel) -> Option<ChannelStats> {
        let n = self.samples.len();
        if n == 0 {
            return None;
        }
        let current = self.samples.back().map(|s| s.value(channel))?;

        let mut sum = 0.0;
        for s in self.samples.iter() {
            sum += s.value(channel);
        }
        let mean = sum / n as f64;

        let mut var_sum = 0.0;
        for s in self.samples.iter() {
            let d = s.value(channel) - mean;
            var_sum += d * d;
        }
        let stddev = (var_sum / n as f64).sqrt();

        Some(ChannelStats {
            current,
            mean,
            stddev,
            slope_per_min: self.slope_over(channel, n),
        })
    }

    /// Least-squares slope over the most recent `n` samples [unit/min].
    ///
    /// Returns 0 with fewer than two samples in range.
    pub fn recent_slope_per_min(&self, channel: WindowChannel, n: usize) -> f64 {
        self.slope_over(channel, n.min(self.samples.len()))
    }

    fn slope_over(&self, channel: WindowChannel, n: usize) -> f64 {
        if n < 2 {
            return 0.0;
        }
        let skip = self.samples.len() - n;
        let t0 = match self.samples.iter().nth(skip) {
            Some(s) => s.timestamp_ns,
            None => return 0.0,
        };

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        for s in self.samples.iter().skip(skip) {
            sum_x += minutes_since(t0, s.timestamp_ns);
            sum_y += s.value(channel);
        }
        let mean_x = sum_x / n as f64;
        let mean_y = sum_y / n as f64;

        let mut num = 0.0;
        let mut den = 0.0;
        for s in self.samples.iter().skip(skip) {
            let dx = minutes_since(t0, s.timestamp_ns) - mean_x;
            num += dx * (s.value(channel) - mean_y);
            den += dx * dx;
        }
        if den == 0.0 { 0.0 } else { num / den }
    }

    /// Dashboard summary over the contractual channels.
    pub fn summary(&self) -> WindowSummary {
        let stat = |ch| self.stats(ch).unwrap_or(ChannelStats::ZERO);
        WindowSummary {
            len: self.len(),
            capacity: self.capacity,
            fill_ratio: self.fill_ratio(),
            t4: stat(WindowChannel::Temp(TempChannel::T4)),
            t5: stat(WindowChannel::Temp(TempChannel::T5)),
            t6: stat(WindowChannel::Temp(TempChannel::T6)),
            px1: stat(WindowChannel::Pressure),
        }
    }
}

#[inline]
fn minutes_since(t0_ns: u64, t_ns: u64) -> f64 {
    (t_ns - t0_ns) as f64 / 60e9
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const STRIDE_S: f64 = 20.0;
    const STRIDE_NS: u64 = 20_000_000_000;

    fn frame(ts_ns: u64, t6: f64) -> TelemetryFrame {
        let mut temps = [30.0; TEMP_CHANNEL_COUNT];
        temps[TempChannel::T6.index()] = t6;
        TelemetryFrame {
            temps_c: temps,
            px1_bar: 2.0,
            engine_load_pct: 60.0,
            timestamp_ns: ts_ns,
            is_stale: false,
        }
    }

    fn filled(n: usize, t6: impl Fn(usize) -> f64) -> Window {
        let mut w = Window::new(90, STRIDE_S);
        for i in 0..n {
            assert!(w.append(&frame((i as u64 + 1) * STRIDE_NS, t6(i))));
        }
        w
    }

    #[test]
    fn append_respects_stride_gate() {
        let mut w = Window::new(90, STRIDE_S);
        assert!(w.append(&frame(STRIDE_NS, 43.0)));
        // 2 s later: inside the gate, not archived.
        assert!(!w.append(&frame(STRIDE_NS + 2_000_000_000, 43.1)));
        // Just shy of the stride but inside the jitter margin: archived.
        assert!(w.append(&frame(2 * STRIDE_NS - 100_000_000, 43.2)));
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn non_monotonic_timestamps_rejected() {
        let mut w = Window::new(90, STRIDE_S);
        assert!(w.append(&frame(5 * STRIDE_NS, 43.0)));
        assert!(!w.append(&frame(5 * STRIDE_NS, 43.0)));
        assert!(!w.append(&frame(4 * STRIDE_NS, 43.0)));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn capacity_is_bounded_and_oldest_discarded() {
        let w = filled(120, |i| i as f64);
        assert_eq!(w.len(), 90);
        // Oldest 30 samples evicted: first retained value is 30.
        let first = w.iter().next().unwrap();
        assert_eq!(first.temps_c[TempChannel::T6.index()], 30.0);
    }

    #[test]
    fn sufficiency_at_75_percent() {
        assert!(!filled(67, |_| 43.0).is_sufficient());
        assert!(filled(68, |_| 43.0).is_sufficient());
        assert!(filled(90, |_| 43.0).is_sufficient());
    }

    #[test]
    fn stats_on_constant_series() {
        let w = filled(90, |_| 43.0);
        let s = w.stats(WindowChannel::Temp(TempChannel::T6)).unwrap();
        assert_eq!(s.current, 43.0);
        assert!((s.mean - 43.0).abs() < 1e-12);
        assert!(s.stddev < 1e-12);
        assert!(s.slope_per_min.abs() < 1e-12);
    }

    #[test]
    fn slope_of_linear_ramp() {
        // 0.3 °C per sample at 20 s stride → 0.9 °C/min.
        let w = filled(90, |i| 40.0 + 0.3 * i as f64);
        let s = w.stats(WindowChannel::Temp(TempChannel::T6)).unwrap();
        assert!((s.slope_per_min - 0.9).abs() < 1e-9, "slope {}", s.slope_per_min);
    }

    #[test]
    fn recent_slope_sees_a_fresh_ramp() {
        // Flat history with a ramp over the last 6 samples.
        let w = filled(90, |i| if i < 84 { 43.0 } else { 43.0 + 0.2 * (i - 83) as f64 });
        let full = w.stats(WindowChannel::Temp(TempChannel::T6)).unwrap();
        let recent = w.recent_slope_per_min(WindowChannel::Temp(TempChannel::T6), 6);
        // 0.2 °C per 20 s sample → 0.6 °C/min over the recent span.
        assert!((recent - 0.6).abs() < 0.01, "recent slope {recent}");
        assert!(full.slope_per_min < recent / 4.0, "full-window slope should dilute the ramp");
    }

    #[test]
    fn empty_window_has_no_stats() {
        let w = Window::new(90, STRIDE_S);
        assert!(w.stats(WindowChannel::Pressure).is_none());
        let summary = w.summary();
        assert_eq!(summary.len, 0);
        assert_eq!(summary.fill_ratio, 0.0);
    }

    #[test]
    fn reduced_capacity_window() {
        let mut w = Window::new(10, STRIDE_S);
        for i in 0..20 {
            w.append(&frame((i + 1) * STRIDE_NS, 40.0));
        }
        assert_eq!(w.len(), 10);
        assert!(w.is_sufficient());
    }
}
