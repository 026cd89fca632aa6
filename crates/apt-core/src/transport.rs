// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits};

use crate::error::Result;

/// The bit-rate/framing/flow-control configuration fixed for the APT device
/// family. Exclusive open; reads are bounded by `READ_TIMEOUT` so a worker
/// blocked in a read periodically wakes to re-check whether the connection
/// is closing, rather than blocking forever.
pub const BAUD_RATE: u32 = 115_200;
pub const DATA_BITS: DataBits = DataBits::Eight;
pub const PARITY: Parity = Parity::None;
pub const STOP_BITS: StopBits = StopBits::One;
pub const FLOW_CONTROL: FlowControl = FlowControl::Hardware;

/// Per-attempt read timeout. Bounds how long the RX dispatcher can be stuck
/// inside a single `read` call, so `close()` is noticed promptly instead of
/// only after the next byte arrives (which, after `HW_STOP_UPDATEMSGS`, may
/// be never).
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// The byte-stream primitive the connection core needs: a read that may
/// return fewer bytes than asked for (including zero, on a timed-out
/// attempt with nothing available), blocking write, flush, buffer reset,
/// close. A real serial port and a test double both implement this.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes. A per-attempt timeout with nothing
    /// available returns `Ok(0)`, not an error — callers loop, accumulating
    /// into their own buffer and re-checking shutdown state between calls,
    /// rather than this trait losing already-read bytes on a timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn clear_buffers(&mut self) -> Result<()>;
}

/// A real FTDI virtual COM port, opened exclusively by path.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `path` with the fixed APT transport settings. `path` is an
    /// opaque string handed in by the caller (typically resolved from a
    /// device serial number by a port-discovery helper outside this crate).
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DATA_BITS)
            .parity(PARITY)
            .stop_bits(STOP_BITS)
            .flow_control(FLOW_CONTROL)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        Ok(SerialTransport { port })
    }

    /// Open `path` and return two independent handles to the same
    /// underlying port: one for the RX dispatcher's exclusive blocking
    /// reads, one for writers to serialize behind the TX write lock. The
    /// handles are duplicated file descriptors, not a software split, so
    /// either one can clear or flush the shared OS-level buffers.
    pub fn open_duplex(path: &str) -> Result<(Box<dyn Transport>, Box<dyn Transport>)> {
        let writer = SerialTransport::open(path)?;
        let reader_port = writer
            .port
            .try_clone()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        let reader = SerialTransport { port: reader_port };
        Ok((Box::new(reader), Box::new(writer)))
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(0)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.port.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Write::flush(&mut self.port)?;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.port
            .clear(ClearBuffer::All)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// A transport double: reads are served from a pre-loaded queue of
    /// frames, writes are appended to a shared log so tests can assert on
    /// wire order.
    #[derive(Clone)]
    pub struct MockTransport {
        inbound: Arc<Mutex<VecDeque<u8>>>,
        pub writes: Arc<Mutex<Vec<u8>>>,
        eof: Arc<Mutex<bool>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            MockTransport {
                inbound: Arc::new(Mutex::new(VecDeque::new())),
                writes: Arc::new(Mutex::new(Vec::new())),
                eof: Arc::new(Mutex::new(false)),
            }
        }

        pub fn push_inbound(&self, bytes: &[u8]) {
            self.inbound.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn set_eof(&self) {
            *self.eof.lock().unwrap() = true;
        }

        pub fn written_bytes(&self) -> Vec<u8> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        /// Mirrors `SerialTransport`'s timeout behavior: drains whatever is
        /// queued (possibly fewer bytes than `buf.len()`, possibly zero),
        /// and only errors once `set_eof` has been called.
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let mut inbound = self.inbound.lock().unwrap();
            if !inbound.is_empty() {
                let n = buf.len().min(inbound.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inbound.pop_front().unwrap();
                }
                return Ok(n);
            }
            drop(inbound);
            if *self.eof.lock().unwrap() {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            std::thread::sleep(Duration::from_millis(1));
            Ok(0)
        }

        fn write_all(&mut self, buf: &[u8]) -> Result<()> {
            self.writes.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn clear_buffers(&mut self) -> Result<()> {
            self.inbound.lock().unwrap().clear();
            Ok(())
        }
    }
}
