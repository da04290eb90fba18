//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audit::{AuditEvent, AuditSink};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::response::Response;
use crate::sequence::Sleeper;
use crate::transport::Transceive;

#[derive(Default)]
struct MockState {
    input: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    clears: usize,
    closed: bool,
    fail_reads: bool,
}

/// In-memory serial port. Each newline written releases the next queued
/// reply into the input buffer.
pub(crate) struct MockPort {
    name: String,
    timeout: Duration,
    state: Arc<Mutex<MockState>>,
}

/// Handle for inspecting a [`MockPort`] after it was boxed.
pub(crate) struct MockTap {
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            timeout: Duration::from_millis(50),
            state: Arc::default(),
        }
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn with_reply(self, reply: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .push_back(reply.to_vec());
        self
    }

    pub(crate) fn tap(&self) -> MockTap {
        MockTap {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockTap {
    /// Put bytes into the input buffer as if they arrived unsolicited.
    pub(crate) fn preload(&self, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .input
            .extend(bytes);
    }

    pub(crate) fn clears(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .clears
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .written
            .clone()
    }

    pub(crate) fn fail_reads(&self) {
        self.state
            .lock()
            .unwrap()
            .fail_reads = true;
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
        }
        if state.input.is_empty() || buf.is_empty() {
            drop(state);
            std::thread::sleep(Duration::from_millis(1));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        }
        let n = buf
            .len()
            .min(state.input.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state
                .input
                .pop_front()
                .unwrap_or_default();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        state
            .written
            .extend_from_slice(buf);
        for _ in buf.iter().filter(|b| **b == b'\n') {
            if let Some(reply) = state.replies.pop_front() {
                state.input.extend(reply);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn read_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_read_limit(&mut self, _limit: Duration) -> Result<()> {
        Ok(())
    }

    fn pending(&self) -> Result<u32> {
        let len = self
            .state
            .lock()
            .unwrap()
            .input
            .len();
        Ok(u32::try_from(len).unwrap_or(u32::MAX))
    }

    fn discard_input(&mut self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        state.input.clear();
        state.clears += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if state.closed {
            return Err(Error::NotOpen(self.name.clone()));
        }
        state.closed = true;
        Ok(())
    }
}

/// Audit sink that keeps a compact text form of every event.
#[derive(Default)]
pub(crate) struct RecordingAudit {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingAudit {
    pub(crate) fn events(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.events)
    }
}

impl AuditSink for RecordingAudit {
    fn record(&mut self, _elapsed: Duration, event: &AuditEvent<'_>) {
        let text = match event {
            AuditEvent::Opened { channel } => format!("open {channel}"),
            AuditEvent::Sent(line) => format!("tx {line}"),
            AuditEvent::Received(line) => format!("rx {line}"),
            AuditEvent::NoReply => "none".to_string(),
            AuditEvent::Closed { channel } => format!("close {channel}"),
        };
        self.events
            .lock()
            .unwrap()
            .push(text);
    }
}

/// Transceiver stub answering from a fixed script, one reply per line.
/// Once the script runs out every further command gets `Absent`.
#[derive(Default)]
pub(crate) struct ScriptedLink {
    replies: VecDeque<Response>,
    pub(crate) sent: Vec<String>,
}

impl ScriptedLink {
    pub(crate) fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Response>,
    {
        Self {
            replies: replies
                .into_iter()
                .collect(),
            sent: Vec::new(),
        }
    }

    /// Number of lines sent that start with `prefix`.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.sent
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

impl Transceive for ScriptedLink {
    fn transceive(&mut self, line: &str, _settle: Duration) -> Response {
        self.sent
            .push(line.to_string());
        self.replies
            .pop_front()
            .unwrap_or(Response::Absent)
    }
}

/// Sleeper that records requested sleeps instead of sleeping.
#[derive(Debug, Default)]
pub(crate) struct RecordingSleeper {
    pub(crate) slept: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.slept
            .push(duration);
    }
}

/// Build a tab-separated link message with `tag` at `field` and `lead` in
/// field 0.
pub(crate) fn link_message(lead: &str, field: usize, tag: &str) -> String {
    let mut fields: Vec<String> = (0..=field.max(18))
        .map(|i| format!("f{i}"))
        .collect();
    fields[0] = lead.to_string();
    fields[field] = tag.to_string();
    fields.join("\t")
}
