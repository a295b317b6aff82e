//! Telemetry adapter: frame-level read/write over a swappable transport.
//!
//! The adapter owns unit normalisation, frame validation, and timestamping.
//! Capture timestamps derive from the PLC uptime counter so they stay
//! coherent with the sensor image; wrap-around and reboots are absorbed so
//! that frame timestamps are strictly increasing. The scheduler and
//! controller cannot distinguish the live PLC from the simulator; both sit
//! behind [`FrameTransport`].

use std::time::{Duration, Instant};

use ccs_common::error::TransportError;
use ccs_common::telemetry::{CommandFrame, TelemetryFrame};

use crate::registers::{
    HOLDING_REGISTER_COUNT, INPUT_REGISTER_COUNT, decode_telemetry, encode_command,
};

// ─── Capability Trait ───────────────────────────────────────────────

/// Register-level exchange with the PLC (or its simulated stand-in).
///
/// Implementations may block internally but must return within the given
/// deadline; a breach is reported as [`TransportError::Timeout`], never by
/// blocking past it. Implementations are handed to the scheduler at
/// construction and never rediscovered.
pub trait FrameTransport: Send {
    /// Read the full input-register image.
    fn read_registers(
        &mut self,
        deadline: Duration,
    ) -> Result<[u16; INPUT_REGISTER_COUNT], TransportError>;

    /// Write the full holding-register image.
    fn write_registers(
        &mut self,
        regs: &[u16; HOLDING_REGISTER_COUNT],
        deadline: Duration,
    ) -> Result<(), TransportError>;

    /// Transport identifier for logs.
    fn name(&self) -> &'static str;
}

// ─── Adapter ────────────────────────────────────────────────────────

/// Frame-level adapter over a [`FrameTransport`].
pub struct PlcAdapter {
    transport: Box<dyn FrameTransport>,
    read_deadline: Duration,
    write_deadline: Duration,
    epoch: Instant,
    /// Last issued frame timestamp [ns].
    last_timestamp_ns: u64,
    /// Last raw uptime reading, for wrap/reboot detection.
    last_uptime_ms: u32,
    /// Accumulated uptime epochs across counter wraps [ms].
    uptime_base_ms: u64,
}

impl PlcAdapter {
    pub fn new(
        transport: Box<dyn FrameTransport>,
        read_deadline: Duration,
        write_deadline: Duration,
    ) -> Self {
        Self {
            transport,
            read_deadline,
            write_deadline,
            epoch: Instant::now(),
            last_timestamp_ns: 0,
            last_uptime_ms: 0,
            uptime_base_ms: 0,
        }
    }

    /// Transport identifier for logs.
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Wall-side monotonic nanoseconds since adapter construction (event
    /// timestamps, not frame timestamps).
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Next frame timestamp after the latest one (stale-frame synthesis).
    pub fn bump_timestamp(&mut self) -> u64 {
        self.last_timestamp_ns += 1;
        self.last_timestamp_ns
    }

    /// Frame timestamp from the PLC uptime counter, strictly increasing.
    fn stamp(&mut self, uptime_ms: u32) -> u64 {
        if uptime_ms < self.last_uptime_ms {
            // Counter wrapped (49.7 days) or the PLC rebooted; either way
            // time only moves forward here.
            self.uptime_base_ms += u64::from(u32::MAX) + 1;
        }
        self.last_uptime_ms = uptime_ms;
        let candidate = (self.uptime_base_ms + u64::from(uptime_ms)) * 1_000_000;
        let stamped = candidate.max(self.last_timestamp_ns + 1);
        self.last_timestamp_ns = stamped;
        stamped
    }

    /// Read one sensor frame.
    ///
    /// Rejects frames with any NaN or out-of-range sensor; the caller
    /// treats rejection exactly like a timeout (frame loss).
    pub fn read_frame(&mut self) -> Result<TelemetryFrame, TransportError> {
        let regs = self.transport.read_registers(self.read_deadline)?;
        let image = decode_telemetry(&regs);
        let frame = TelemetryFrame {
            temps_c: image.temps_c,
            px1_bar: image.px1_bar,
            engine_load_pct: image.engine_load_pct,
            timestamp_ns: self.stamp(image.uptime_ms),
            is_stale: false,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Write one command frame.
    pub fn write_command(&mut self, cmd: &CommandFrame) -> Result<(), TransportError> {
        let regs = encode_command(cmd);
        self.transport.write_registers(&regs, self.write_deadline)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{SensorImage, encode_telemetry};
    use ccs_common::telemetry::TEMP_CHANNEL_COUNT;

    /// Transport replaying scripted images, with scriptable faults.
    struct ScriptedTransport {
        images: Vec<[u16; INPUT_REGISTER_COUNT]>,
        cursor: usize,
        fail_next: bool,
        written: Vec<[u16; HOLDING_REGISTER_COUNT]>,
    }

    impl ScriptedTransport {
        fn new(images: Vec<SensorImage>) -> Self {
            Self {
                images: images.iter().map(encode_telemetry).collect(),
                cursor: 0,
                fail_next: false,
                written: Vec::new(),
            }
        }
    }

    impl FrameTransport for ScriptedTransport {
        fn read_registers(
            &mut self,
            deadline: Duration,
        ) -> Result<[u16; INPUT_REGISTER_COUNT], TransportError> {
            if self.fail_next {
                self.fail_next = false;
                return Err(TransportError::Timeout(deadline.as_millis() as u64));
            }
            let regs = self.images[self.cursor.min(self.images.len() - 1)];
            self.cursor += 1;
            Ok(regs)
        }

        fn write_registers(
            &mut self,
            regs: &[u16; HOLDING_REGISTER_COUNT],
            _deadline: Duration,
        ) -> Result<(), TransportError> {
            self.written.push(*regs);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn image(uptime_ms: u32, t1: f64) -> SensorImage {
        let mut temps_c = [30.0; TEMP_CHANNEL_COUNT];
        temps_c[0] = t1;
        SensorImage {
            temps_c,
            px1_bar: 2.0,
            engine_load_pct: 60.0,
            uptime_ms,
        }
    }

    fn adapter(t: ScriptedTransport) -> PlcAdapter {
        PlcAdapter::new(
            Box::new(t),
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn frames_carry_uptime_derived_timestamps() {
        let mut a = adapter(ScriptedTransport::new(vec![
            image(2_000, 28.0),
            image(4_000, 28.5),
        ]));
        let f1 = a.read_frame().unwrap();
        let f2 = a.read_frame().unwrap();
        assert_eq!(f1.timestamp_ns, 2_000_000_000);
        assert_eq!(f2.timestamp_ns, 4_000_000_000);
        assert!((f2.temps_c[0] - 28.5).abs() < 1e-9);
        assert!(!f1.is_stale);
    }

    #[test]
    fn frozen_uptime_still_yields_increasing_timestamps() {
        let mut a = adapter(ScriptedTransport::new(vec![
            image(2_000, 28.0),
            image(2_000, 28.0),
            image(2_000, 28.0),
        ]));
        let f1 = a.read_frame().unwrap();
        let f2 = a.read_frame().unwrap();
        let f3 = a.read_frame().unwrap();
        assert!(f1.timestamp_ns < f2.timestamp_ns);
        assert!(f2.timestamp_ns < f3.timestamp_ns);
    }

    #[test]
    fn uptime_wrap_absorbed() {
        let mut a = adapter(ScriptedTransport::new(vec![
            image(u32::MAX - 1_000, 28.0),
            image(1_000, 28.0),
        ]));
        let f1 = a.read_frame().unwrap();
        let f2 = a.read_frame().unwrap();
        assert!(f2.timestamp_ns > f1.timestamp_ns);
    }

    #[test]
    fn out_of_range_register_image_is_rejected() {
        // 130.0 °C encodes fine but fails frame validation.
        let mut a = adapter(ScriptedTransport::new(vec![image(2_000, 130.0)]));
        let err = a.read_frame().unwrap_err();
        assert!(matches!(err, TransportError::OutOfRange { field: "T1", .. }));
    }

    #[test]
    fn timeout_propagates_and_recovers() {
        let mut t = ScriptedTransport::new(vec![image(2_000, 28.0), image(4_000, 28.0)]);
        t.fail_next = true;
        let mut a = adapter(t);
        assert!(matches!(a.read_frame(), Err(TransportError::Timeout(200))));
        assert!(a.read_frame().is_ok());
    }

    #[test]
    fn bump_timestamp_follows_the_last_frame() {
        let mut a = adapter(ScriptedTransport::new(vec![image(2_000, 28.0)]));
        let f = a.read_frame().unwrap();
        let stale_ts = a.bump_timestamp();
        assert_eq!(stale_ts, f.timestamp_ns + 1);
        assert_eq!(a.bump_timestamp(), f.timestamp_ns + 2);
    }
}
