//! Terminal test conditions and the abort funnel.

use std::fmt;
use std::io::Write;

use log::error;
use thiserror::Error;

/// Process exit status of a failed run.
pub const FAIL_EXIT_CODE: i32 = 1;

/// Why a test sequence cannot continue.
#[derive(Debug, Error)]
pub enum TestFailure {
    /// The tester answered something other than `ACK`.
    #[error("{what} failed: tester replied {reply}")]
    Rejected {
        /// Operation that was attempted.
        what: String,
        /// The reply received.
        reply: String,
    },

    /// The tester did not answer at all.
    #[error("{what}: tester returned nothing and the connection timed out")]
    NoReply {
        /// Operation that was attempted.
        what: String,
    },

    /// The DUT never joined.
    #[error("Link status: In-active")]
    LinkInactive,

    /// `READ:LINK:MSG?` returned a rejection instead of a message.
    #[error("READ:LINK:MSG? - {reply}")]
    MessageRejected {
        /// The reply received.
        reply: String,
    },

    /// No link message arrived within the configured number of polls.
    #[error("no link message after {polls} polls")]
    PollExhausted {
        /// Polls made.
        polls: u32,
    },

    /// A MAC exchange did not match in any round.
    #[error("{step}: Test Failed")]
    StepFailed {
        /// Step name.
        step: String,
    },

    /// A message carried a tag that must not appear.
    #[error("{step}: unexpected {tag} in field {field}")]
    UnexpectedMessage {
        /// Step name.
        step: String,
        /// Field index examined.
        field: usize,
        /// The forbidden tag that was found.
        tag: String,
    },

    /// Channel or command error.
    #[error(transparent)]
    Tester(#[from] crate::Error),
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every step passed.
    Pass,
    /// A step failed.
    Fail,
}

impl Verdict {
    /// Verdict of a finished sequence.
    pub fn of<T>(result: &Result<T, TestFailure>) -> Self {
        if result.is_ok() { Self::Pass } else { Self::Fail }
    }

    /// The line printed at the end of a run.
    pub fn marker(self) -> String {
        format!("Test Result: {self}")
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

/// Report `failure` and terminate the process with [`FAIL_EXIT_CODE`].
///
/// The diagnostic goes to stderr and the marker to stdout, so a caller
/// scraping stdout always sees the verdict.
pub fn abort(failure: &TestFailure) -> ! {
    error!("{failure}");
    eprintln!("{failure}");
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "\n{}", Verdict::Fail.marker());
    let _ = stdout.flush();
    std::process::exit(FAIL_EXIT_CODE)
}
