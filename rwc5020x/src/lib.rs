//! # rwc5020x
//!
//! A library for driving RWC5020x-class LoRaWAN testers.
//!
//! The tester speaks newline-terminated ASCII over RS-232 or UDP. This crate
//! provides:
//!
//! - A serial/UDP [`Transceiver`] with a single blocking request/response
//!   primitive and an injectable exchange audit trail
//! - [`Response`] classification that keeps "no reply" apart from `NAK`
//! - A [`Tester`] command facade with argument validation and firmware
//!   capability gating
//! - A [`Sequencer`] that drives MAC command exchanges to a verdict, and
//!   the EU certification [`Scenario`]s built on it
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: serialization support for [`Response`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use rwc5020x::{ChannelConfig, DatagramConfig, Scenario, Sequencer, Tester, Transceiver};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut link = Transceiver::new(ChannelConfig::Datagram(DatagramConfig::new(
//!         "192.168.0.33:5001",
//!     )));
//!     link.open()?;
//!
//!     let mut seq = Sequencer::new(Tester::new(&mut link));
//!     match Scenario::Eu53.run(&mut seq) {
//!         Ok(()) => println!("Test Result: PASS"),
//!         Err(failure) => rwc5020x::abort(&failure),
//!     }
//!
//!     link.close()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod capability;
pub mod channel;
pub mod command;
pub mod error;
pub mod port;
pub mod response;
pub mod sequence;
pub mod tester;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    audit::{AuditEvent, AuditSink, FileAudit, LogAudit, NullAudit},
    capability::{Feature, FirmwareVersion},
    channel::{Channel, ChannelConfig, DatagramConfig},
    command::Command,
    error::{Error, Result},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    response::Response,
    sequence::{
        ExchangeOutcome, LinkStatus, MacExchange, PollPolicy, RetryPolicy, Scenario, Sequencer,
        Sleeper, TestFailure, ThreadSleeper, Timing, Verdict, abort,
    },
    tester::Tester,
    transport::{Transceive, Transceiver},
};
