//! Certification test sequencing.
//!
//! The DUT answers on its own schedule and the tester buffers what it sees
//! as tab-separated link messages. A [`Sequencer`] drives each test step to
//! a decision by polling those messages and matching them by content:
//!
//! ```text
//! SEND -> WAIT_REQUEST -> WAIT_RESPONSE -> MATCHED | next round | FAILED
//! ```
//!
//! Every terminal condition is a [`TestFailure`]; callers route it to
//! [`abort`], the one place a run ends in `Test Result: FAIL`.

mod failure;
mod scenario;
mod sequencer;

use std::thread;
use std::time::Duration;

pub use failure::{FAIL_EXIT_CODE, TestFailure, Verdict, abort};
pub use scenario::Scenario;
pub use sequencer::{Sequencer, require_ack};

/// Reply to `READ:LINK:MSG?` while the tester has nothing buffered.
pub const NOT_AVAILABLE: &str = "NA";

/// Reply to `READ:LINK:ACTIVATION?` once the DUT has joined.
pub const ACTIVE: &str = "YES";

/// Activation checks made before the link is declared inactive.
pub const LINK_STATUS_CHECKS: u32 = 2;

/// Blocking pause between polls.
pub trait Sleeper {
    /// Pause for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// [`Sleeper`] backed by [`thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Fixed pauses of a test sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Before each `SEND_MAC`.
    pub settle_before_send: Duration,
    /// Between `SEND_MAC` and the link message reset.
    pub after_send: Duration,
    /// After every link message poll, and before re-reading a response.
    pub poll_interval: Duration,
    /// Between two rounds of one exchange.
    pub between_rounds: Duration,
    /// Before re-checking an inactive link.
    pub link_retry: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_before_send: Duration::from_secs(1),
            after_send: Duration::from_secs(1),
            poll_interval: Duration::from_secs(3),
            between_rounds: Duration::from_secs(1),
            link_retry: Duration::from_secs(15),
        }
    }
}

impl Timing {
    /// No pauses at all.
    pub const fn immediate() -> Self {
        Self {
            settle_before_send: Duration::ZERO,
            after_send: Duration::ZERO,
            poll_interval: Duration::ZERO,
            between_rounds: Duration::ZERO,
            link_retry: Duration::ZERO,
        }
    }
}

/// How long to keep polling while the tester has no link message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPolicy {
    /// Poll until a message arrives.
    #[default]
    Unbounded,
    /// Give up after this many polls; `Bounded(0)` gives up without polling.
    Bounded(u32),
}

/// Retry budget of one MAC exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Rounds (SEND included) before the step fails.
    pub rounds: u32,
    /// Messages examined per round before the round ends.
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rounds: 2,
            attempts: 2,
        }
    }
}

/// Result of one activation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The DUT has joined.
    Active,
    /// The tester answered with something other than `YES`.
    Inactive,
    /// The tester did not answer, or answered with an empty line.
    Unknown,
}

/// Expected request/response pair of one MAC command exchange.
///
/// A tag matches when the message field at the given index contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacExchange {
    /// Field holding the DUT's request.
    pub request_field: usize,
    /// Text expected in the request field.
    pub request_tag: String,
    /// Field holding the DUT's response.
    pub response_field: usize,
    /// Text expected in the response field.
    pub response_tag: String,
}

impl MacExchange {
    /// Request and response tags at their own field indexes.
    pub fn new(
        request_field: usize,
        request_tag: impl Into<String>,
        response_field: usize,
        response_tag: impl Into<String>,
    ) -> Self {
        Self {
            request_field,
            request_tag: request_tag.into(),
            response_field,
            response_tag: response_tag.into(),
        }
    }

    /// Request and response tags in the same field.
    pub fn in_field(
        field: usize,
        request_tag: impl Into<String>,
        response_tag: impl Into<String>,
    ) -> Self {
        Self::new(field, request_tag, field, response_tag)
    }
}

/// Decision reached by one MAC exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Both tags were seen; the matched field values.
    Matched {
        /// Request field value.
        request: String,
        /// Response field value.
        response: String,
    },
    /// Every round ended without a match.
    Failed,
}

impl ExchangeOutcome {
    /// Whether the exchange matched.
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Field `index` of a tab-separated link message.
pub fn message_field(message: &str, index: usize) -> Option<&str> {
    message
        .split(crate::response::FIELD_DELIMITER)
        .nth(index)
}
