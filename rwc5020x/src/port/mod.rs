//! Byte-level serial port abstraction.
//!
//! The [`Port`] trait is the raw byte pipe underneath the serial variant of
//! a [`Channel`](crate::Channel). Line framing and stale-input discarding
//! live in [`crate::channel`]; a port only has to move bytes and honour its
//! read timeout.
//!
//! ```text
//! Transceiver
//!     |
//!     +-- SerialChannel --> dyn Port --> NativePort (serialport)
//!     |
//!     +-- DatagramChannel --> UdpSocket
//! ```
//!
//! The tester's RS-232 port is fixed at 8 data bits, no parity, one stop bit
//! and no flow control, so only the baud rate is configurable.

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default read timeout of the tester link.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default baud rate of the tester's RS-232 port.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port_name: String,
    /// Line speed.
    pub baud_rate: u32,
    /// How long to wait for one reply line.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Settings for `port_name` at 115200 baud with a 5 s reply timeout.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the baud rate.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the reply timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A serial device found on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path.
    pub name: String,
    /// USB vendor ID, for USB-serial adapters.
    pub vid: Option<u16>,
    /// USB product ID, for USB-serial adapters.
    pub pid: Option<u16>,
    /// Adapter manufacturer.
    pub manufacturer: Option<String>,
    /// Adapter product string.
    pub product: Option<String>,
}

impl PortInfo {
    /// `VID:PID` in hex when both are known.
    pub fn usb_id(&self) -> Option<String> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(format!("{vid:04X}:{pid:04X}")),
            _ => None,
        }
    }
}

/// Byte pipe underneath a serial channel.
///
/// `read` must return within the limit last given to
/// [`Port::set_read_limit`], either with data, `Ok(0)` or an
/// `ErrorKind::TimedOut` error.
pub trait Port: Read + Write + Send {
    /// Upper bound for a single reply line.
    fn read_timeout(&self) -> Duration;

    /// Bound how long the next `read` may block.
    fn set_read_limit(&mut self, limit: Duration) -> Result<()>;

    /// Received bytes not yet read.
    fn pending(&self) -> Result<u32>;

    /// Drop every received byte not yet read.
    fn discard_input(&mut self) -> Result<()>;

    /// Device path.
    fn name(&self) -> &str;

    /// Release the device. Further I/O fails.
    fn close(&mut self) -> Result<()>;

    /// Write a whole command line and flush it to the wire.
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)?;
        self.flush()?;
        Ok(())
    }
}

/// Lists serial devices without opening one.
pub trait PortEnumerator {
    /// Every serial device the host reports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
