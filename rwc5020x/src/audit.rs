//! Exchange audit trail.
//!
//! The [`Transceiver`](crate::Transceiver) reports every line it sends and
//! every reply (or missing reply) to an injected [`AuditSink`], together with
//! the monotonic time elapsed since the transceiver was created. The trail
//! is write-only: nothing in the protocol logic reads it back.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};

/// Log target used by [`LogAudit`].
pub const AUDIT_TARGET: &str = "rwc5020x::audit";

/// One entry of the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent<'a> {
    /// The channel was opened.
    Opened {
        /// Channel description.
        channel: &'a str,
    },
    /// A command line was written.
    Sent(&'a str),
    /// A reply line was received, terminators included.
    Received(&'a str),
    /// No reply was received.
    NoReply,
    /// The channel was closed.
    Closed {
        /// Channel description.
        channel: &'a str,
    },
}

/// Sink for the exchange audit trail.
pub trait AuditSink: Send {
    /// Record one event; `elapsed` is monotonic time since the transceiver
    /// was created.
    fn record(&mut self, elapsed: Duration, event: &AuditEvent<'_>);
}

/// Render one event as a single text line (without trailing newline).
pub fn format_event(elapsed: Duration, event: &AuditEvent<'_>) -> String {
    let stamp = format!("[{:>10.3}]", elapsed.as_secs_f64());
    match event {
        AuditEvent::Opened { channel } => format!("{stamp} {channel} opened"),
        AuditEvent::Sent(line) => format!("{stamp} Tx Command: {line:?}"),
        AuditEvent::Received(line) => format!("{stamp} Rx Response: {line:?}"),
        AuditEvent::NoReply => format!("{stamp} Rx Response: none"),
        AuditEvent::Closed { channel } => format!("{stamp} {channel} closed"),
    }
}

/// Forwards the audit trail to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAudit;

impl AuditSink for LogAudit {
    fn record(&mut self, elapsed: Duration, event: &AuditEvent<'_>) {
        debug!(target: AUDIT_TARGET, "{}", format_event(elapsed, event));
    }
}

/// Discards the audit trail.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&mut self, _elapsed: Duration, _event: &AuditEvent<'_>) {}
}

/// Appends the audit trail to a text file.
///
/// The file is opened when the channel opens and closed when the channel
/// closes; every event is flushed as it is written. Write failures are
/// logged and never interrupt the exchange.
#[derive(Debug)]
pub struct FileAudit {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileAudit {
    /// Create a file sink; nothing is touched until the channel opens.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    /// Path of the audit file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_writer(&mut self) -> std::io::Result<()> {
        if let Some(parent) = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{line}")?;
            writer.flush()?;
        }
        Ok(())
    }
}

impl AuditSink for FileAudit {
    fn record(&mut self, elapsed: Duration, event: &AuditEvent<'_>) {
        if matches!(event, AuditEvent::Opened { .. }) && self.writer.is_none() {
            if let Err(e) = self.open_writer() {
                warn!("Cannot open audit log {}: {e}", self.path.display());
                return;
            }
        }

        let line = format_event(elapsed, event);
        if let Err(e) = self.write_line(&line) {
            warn!("Cannot write audit log {}: {e}", self.path.display());
        }

        if matches!(event, AuditEvent::Closed { .. }) {
            self.writer = None;
        }
    }
}
