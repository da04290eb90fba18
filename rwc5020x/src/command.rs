//! Command line encoding and argument validation.
//!
//! Tester commands are single ASCII lines:
//!
//! ```text
//! CONF:LINK:MAC_CMD_TYPE UNCONFIRMED\n    set
//! EXEC:LINK:RUN\n                        execute
//! READ:LINK:MSG?\n                       query
//! ```
//!
//! Arguments are validated before a [`Command`] is built, so a rejected
//! argument never reaches the wire.

use std::fmt;
use std::ops::RangeInclusive;

use crate::error::{Error, Result};

/// Command verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Set a parameter.
    Conf,
    /// Query a parameter.
    Read,
    /// Trigger an action.
    Exec,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Conf => "CONF",
            Self::Read => "READ",
            Self::Exec => "EXEC",
        }
    }
}

/// One encoded command line, always newline-terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    line: String,
}

impl Command {
    /// `CONF:NOUN:FIELD arg`
    pub fn set(noun: &str, field: &str, arg: impl fmt::Display) -> Self {
        Self::build(Verb::Conf, noun, field, Some(&arg.to_string()))
    }

    /// `READ:NOUN:FIELD?`
    pub fn query(noun: &str, field: &str) -> Self {
        Self {
            line: format!("{}:{noun}:{field}?\n", Verb::Read.as_str()),
        }
    }

    /// `READ:NOUN:FIELD? arg`
    pub fn query_with(noun: &str, field: &str, arg: impl fmt::Display) -> Self {
        Self {
            line: format!("{}:{noun}:{field}? {arg}\n", Verb::Read.as_str()),
        }
    }

    /// `EXEC:NOUN:FIELD`
    pub fn exec(noun: &str, field: &str) -> Self {
        Self::build(Verb::Exec, noun, field, None)
    }

    /// A literal line such as `*IDN?`; a missing newline is appended.
    pub fn raw(line: &str) -> Self {
        let mut line = line.trim_end_matches(['\r', '\n']).to_string();
        line.push('\n');
        Self { line }
    }

    fn build(verb: Verb, noun: &str, field: &str, arg: Option<&str>) -> Self {
        let line = match arg {
            Some(arg) => format!("{}:{noun}:{field} {arg}\n", verb.as_str()),
            None => format!("{}:{noun}:{field}\n", verb.as_str()),
        };
        Self { line }
    }

    /// The full line including the terminating newline.
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// The line without its terminating newline.
    pub fn text(&self) -> &str {
        self.line
            .trim_end_matches('\n')
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Reject `value` unless it lies in `range`.
pub fn check_range<T>(name: &'static str, value: T, range: RangeInclusive<T>) -> Result<T>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid(
            name,
            format!(
                "{value} not in {}..={}",
                range.start(),
                range.end()
            ),
        ))
    }
}

/// Reject `value` unless it is one of `choices` (exact match).
pub fn check_choice<'a>(name: &'static str, value: &'a str, choices: &[&str]) -> Result<&'a str> {
    if choices.contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid(
            name,
            format!("'{value}' is not one of {}", choices.join(", ")),
        ))
    }
}
