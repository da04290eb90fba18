//! Synchronous request/response transport.
//!
//! [`Transceiver`] owns at most one open [`Channel`] and offers a single
//! primitive, [`Transceive::transceive`]: write one command line, wait for
//! one reply line, classify it. There are no correlation ids in the tester
//! protocol; ordering plus discarding stale serial input before each write
//! is the only thing tying a reply to its command.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rwc5020x::{ChannelConfig, DatagramConfig, Transceive, Transceiver};
//! use std::time::Duration;
//!
//! fn main() -> rwc5020x::Result<()> {
//!     let config = ChannelConfig::Datagram(DatagramConfig::new("192.168.0.33:5001"));
//!     let mut link = Transceiver::new(config);
//!     link.open()?;
//!
//!     let reply = link.transceive("EXEC:LINK:RUN\n", Duration::ZERO);
//!     println!("{reply}");
//!
//!     link.close()
//! }
//! ```

use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::audit::{AuditEvent, AuditSink, LogAudit};
use crate::channel::{Channel, ChannelConfig};
use crate::error::{Error, Result};
use crate::response::Response;

/// The one primitive command wrappers and sequencers are allowed to use.
pub trait Transceive {
    /// Send `line` (newline-terminated), wait `settle`, then read one reply.
    ///
    /// Timeouts and transport failures are reported as
    /// [`Response::Absent`], never as errors.
    fn transceive(&mut self, line: &str, settle: Duration) -> Response;
}

impl<T: Transceive + ?Sized> Transceive for &mut T {
    fn transceive(&mut self, line: &str, settle: Duration) -> Response {
        (**self).transceive(line, settle)
    }
}

impl<T: Transceive + ?Sized> Transceive for Box<T> {
    fn transceive(&mut self, line: &str, settle: Duration) -> Response {
        (**self).transceive(line, settle)
    }
}

/// Request/response transport over one serial or datagram channel.
pub struct Transceiver {
    config: Option<ChannelConfig>,
    channel: Option<Channel>,
    audit: Box<dyn AuditSink>,
    started: Instant,
}

impl Transceiver {
    /// Create a transceiver for the given channel; nothing is opened yet.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config: Some(config),
            channel: None,
            audit: Box::new(LogAudit),
            started: Instant::now(),
        }
    }

    /// Wrap a channel that is already open.
    ///
    /// Such a transceiver cannot be reopened after [`Transceiver::close`].
    pub fn with_channel(channel: Channel) -> Self {
        let mut transceiver = Self {
            config: None,
            channel: None,
            audit: Box::new(LogAudit),
            started: Instant::now(),
        };
        transceiver.attach(channel);
        transceiver
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = audit;
        if let Some(channel) = self.channel.as_ref() {
            let description = channel.describe();
            self.record(&AuditEvent::Opened {
                channel: &description,
            });
        }
        self
    }

    /// Whether a channel is currently open.
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Description of the open or configured channel.
    pub fn describe(&self) -> String {
        match (&self.channel, &self.config) {
            (Some(channel), _) => channel.describe(),
            (None, Some(config)) => config.describe(),
            (None, None) => "detached channel".to_string(),
        }
    }

    /// Open the configured channel.
    ///
    /// Opening while already open is an error; the channel is a singleton
    /// for the lifetime of the transceiver.
    pub fn open(&mut self) -> Result<()> {
        if self.channel.is_some() {
            error!("{} is already open", self.describe());
            return Err(Error::AlreadyOpen(self.describe()));
        }
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::NotOpen("no channel configuration to open".to_string()))?;

        let channel = config
            .open()
            .inspect_err(|e| error!("Unable to open {config}: {e}"))?;
        info!("{} opened", channel.describe());
        self.attach(channel);
        Ok(())
    }

    /// Close the open channel. Closing a channel that is not open is an
    /// error.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut channel) = self.channel.take() else {
            error!("{} is already closed", self.describe());
            return Err(Error::NotOpen(self.describe()));
        };

        let description = channel.describe();
        let result = channel.close();
        self.record(&AuditEvent::Closed {
            channel: &description,
        });
        match &result {
            Ok(()) => info!("{description} closed"),
            Err(e) => error!("Can't close {description}: {e}"),
        }
        result
    }

    fn attach(&mut self, channel: Channel) {
        let description = channel.describe();
        self.channel = Some(channel);
        self.record(&AuditEvent::Opened {
            channel: &description,
        });
    }

    fn record(&mut self, event: &AuditEvent<'_>) {
        let elapsed = self
            .started
            .elapsed();
        self.audit
            .record(elapsed, event);
    }

    /// One raw exchange; errors here are downgraded by the caller.
    fn exchange(&mut self, line: &str, settle: Duration) -> Result<Option<Vec<u8>>> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| Error::NotOpen("transceive on a closed channel".to_string()))?;

        channel.discard_stale_input()?;
        channel.send_line(line.as_bytes())?;
        self.record(&AuditEvent::Sent(line));

        if !settle.is_zero() {
            thread::sleep(settle);
        }

        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| Error::NotOpen("channel closed during exchange".to_string()))?;
        channel.receive_line()
    }
}

impl Transceive for Transceiver {
    fn transceive(&mut self, line: &str, settle: Duration) -> Response {
        let raw = match self.exchange(line, settle) {
            Ok(raw) => raw,
            Err(e @ Error::NotOpen(_)) => {
                error!("{e}");
                None
            },
            Err(e) => {
                warn!(
                    "Error Send/Receive on {}: {e}",
                    self.describe()
                );
                None
            },
        };

        match raw.as_deref() {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                self.record(&AuditEvent::Received(&text));
            },
            None => self.record(&AuditEvent::NoReply),
        }

        Response::classify(raw.as_deref())
    }
}

impl Drop for Transceiver {
    fn drop(&mut self) {
        if self.channel.is_some() {
            let _ = self.close();
        }
    }
}
