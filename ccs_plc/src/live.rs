//! Live Modbus-TCP transport.
//!
//! Minimal client for the shipboard PLC: function 04 (read input
//! registers) for the sensor image, function 16 (write multiple holding
//! registers) for the actuation image. Socket read/write timeouts enforce
//! the per-call deadline; a failed exchange drops the connection so the
//! next call reconnects.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use ccs_common::error::TransportError;

use crate::adapter::FrameTransport;
use crate::registers::{HOLDING_REGISTER_COUNT, INPUT_REGISTER_COUNT};

const FC_READ_INPUT_REGISTERS: u8 = 0x04;
const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
const MBAP_LEN: usize = 7;

/// Modbus-TCP client transport.
pub struct ModbusTransport {
    address: String,
    unit_id: u8,
    txn_id: u16,
    stream: Option<TcpStream>,
}

impl ModbusTransport {
    /// Create the transport and attempt the initial connection.
    ///
    /// A failed initial connection is fatal at start-up; later failures
    /// are reported per call and retried via reconnect.
    pub fn connect(address: &str, unit_id: u8) -> Result<Self, TransportError> {
        let mut t = Self {
            address: address.to_string(),
            unit_id,
            txn_id: 0,
            stream: None,
        };
        t.ensure_connected(Duration::from_millis(2_000))?;
        Ok(t)
    }

    fn ensure_connected(&mut self, deadline: Duration) -> Result<&mut TcpStream, TransportError> {
        if self.stream.is_none() {
            let addr = self
                .address
                .to_socket_addrs()
                .map_err(|e| TransportError::Fault(format!("resolve {}: {e}", self.address)))?
                .next()
                .ok_or_else(|| {
                    TransportError::Fault(format!("no address for {}", self.address))
                })?;
            let stream = TcpStream::connect_timeout(&addr, deadline)
                .map_err(|e| TransportError::Fault(format!("connect {}: {e}", self.address)))?;
            stream
                .set_nodelay(true)
                .map_err(|e| TransportError::Fault(format!("set_nodelay: {e}")))?;
            debug!(address = %self.address, "PLC connection established");
            self.stream = Some(stream);
        }
        Ok(self.stream.as_mut().expect("stream just set"))
    }

    /// One request/response exchange under the deadline.
    fn exchange(
        &mut self,
        pdu: &[u8],
        deadline: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.txn_id = self.txn_id.wrapping_add(1);
        let txn = self.txn_id;
        let unit = self.unit_id;
        let deadline_ms = deadline.as_millis() as u64;

        let result = (|| -> Result<Vec<u8>, TransportError> {
            let stream = self.ensure_connected(deadline)?;
            stream
                .set_read_timeout(Some(deadline))
                .map_err(|e| TransportError::Fault(format!("set_read_timeout: {e}")))?;
            stream
                .set_write_timeout(Some(deadline))
                .map_err(|e| TransportError::Fault(format!("set_write_timeout: {e}")))?;

            // MBAP: txn, protocol 0, length = unit + PDU, unit id.
            let len = (pdu.len() + 1) as u16;
            let mut request = Vec::with_capacity(MBAP_LEN + pdu.len());
            request.extend_from_slice(&txn.to_be_bytes());
            request.extend_from_slice(&0u16.to_be_bytes());
            request.extend_from_slice(&len.to_be_bytes());
            request.push(unit);
            request.extend_from_slice(pdu);
            stream
                .write_all(&request)
                .map_err(|e| io_to_transport(e, deadline_ms))?;

            let mut header = [0u8; MBAP_LEN];
            stream
                .read_exact(&mut header)
                .map_err(|e| io_to_transport(e, deadline_ms))?;
            let rx_txn = u16::from_be_bytes([header[0], header[1]]);
            if rx_txn != txn {
                return Err(TransportError::Fault(format!(
                    "transaction id mismatch: sent {txn}, got {rx_txn}"
                )));
            }
            let body_len = u16::from_be_bytes([header[4], header[5]]) as usize;
            if body_len < 2 || body_len > 256 {
                return Err(TransportError::Fault(format!(
                    "implausible MBAP length {body_len}"
                )));
            }
            let mut body = vec![0u8; body_len - 1]; // unit id already consumed in header
            stream
                .read_exact(&mut body)
                .map_err(|e| io_to_transport(e, deadline_ms))?;

            if body[0] & 0x80 != 0 {
                let code = body.get(1).copied().unwrap_or(0);
                return Err(TransportError::Fault(format!(
                    "modbus exception {code:#04x} for function {:#04x}",
                    body[0] & 0x7f
                )));
            }
            Ok(body)
        })();

        if result.is_err() {
            // Drop the connection; the next call reconnects.
            warn!(address = %self.address, "PLC exchange failed, dropping connection");
            self.stream = None;
        }
        result
    }
}

fn io_to_transport(e: std::io::Error, deadline_ms: u64) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
            TransportError::Timeout(deadline_ms)
        }
        _ => TransportError::Fault(e.to_string()),
    }
}

impl FrameTransport for ModbusTransport {
    fn read_registers(
        &mut self,
        deadline: Duration,
    ) -> Result<[u16; INPUT_REGISTER_COUNT], TransportError> {
        let count = INPUT_REGISTER_COUNT as u16;
        let pdu = [
            FC_READ_INPUT_REGISTERS,
            0x00,
            0x00,
            (count >> 8) as u8,
            (count & 0xff) as u8,
        ];
        let body = self.exchange(&pdu, deadline)?;
        // body: fc, byte count, data
        if body.len() != 2 + INPUT_REGISTER_COUNT * 2
            || body[1] as usize != INPUT_REGISTER_COUNT * 2
        {
            return Err(TransportError::Fault(format!(
                "short read-input-registers response ({} bytes)",
                body.len()
            )));
        }
        let mut regs = [0u16; INPUT_REGISTER_COUNT];
        for (i, reg) in regs.iter_mut().enumerate() {
            *reg = u16::from_be_bytes([body[2 + i * 2], body[3 + i * 2]]);
        }
        Ok(regs)
    }

    fn write_registers(
        &mut self,
        regs: &[u16; HOLDING_REGISTER_COUNT],
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let count = HOLDING_REGISTER_COUNT as u16;
        let mut pdu = Vec::with_capacity(6 + HOLDING_REGISTER_COUNT * 2);
        pdu.push(FC_WRITE_MULTIPLE_REGISTERS);
        pdu.extend_from_slice(&0u16.to_be_bytes());
        pdu.extend_from_slice(&count.to_be_bytes());
        pdu.push((HOLDING_REGISTER_COUNT * 2) as u8);
        for reg in regs {
            pdu.extend_from_slice(&reg.to_be_bytes());
        }
        let body = self.exchange(&pdu, deadline)?;
        if body.len() != 5 || body[0] != FC_WRITE_MULTIPLE_REGISTERS {
            return Err(TransportError::Fault(format!(
                "unexpected write-multiple-registers response ({} bytes)",
                body.len()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "modbus"
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
