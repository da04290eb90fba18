//! Classification of tester reply lines.
//!
//! Every exchange ends in exactly one [`Response`]. "The tester said no"
//! ([`Response::Nak`]) and "the tester said nothing" ([`Response::Absent`])
//! are different variants and never compare equal.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Positive acknowledgement line.
pub const ACK: &str = "ACK";

/// Negative acknowledgement line.
pub const NAK: &str = "NAK";

/// Delimiter between positional fields of multi-field replies.
pub const FIELD_DELIMITER: char = '\t';

/// A classified reply to one command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", content = "payload", rename_all = "lowercase")
)]
pub enum Response {
    /// The tester accepted the command.
    Ack,
    /// The tester rejected the command.
    Nak,
    /// Any other reply text, line terminators removed.
    Data(String),
    /// Nothing was received before the timeout, or the channel failed.
    Absent,
}

impl Response {
    /// Classify raw received bytes; `None` means nothing was received.
    pub fn classify(raw: Option<&[u8]>) -> Self {
        match raw {
            None => Self::Absent,
            Some(bytes) => Self::from_line(&String::from_utf8_lossy(bytes)),
        }
    }

    /// Classify a received line. Carriage returns and newlines are removed
    /// wherever they appear.
    pub fn from_line(line: &str) -> Self {
        let text = strip_terminators(line);
        match text.as_str() {
            ACK => Self::Ack,
            NAK => Self::Nak,
            _ => Self::Data(text),
        }
    }

    /// Whether the tester acknowledged the command.
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    /// Whether the tester rejected the command.
    pub fn is_nak(&self) -> bool {
        matches!(self, Self::Nak)
    }

    /// Whether nothing was received.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The payload of a [`Response::Data`] reply.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Data(text) => Some(text),
            _ => None,
        }
    }

    /// Field `index` of a [`Response::Data`] reply split on `delimiter`.
    /// Telemetry replies use [`FIELD_DELIMITER`]; `*IDN?` uses `,`.
    pub fn field(&self, index: usize, delimiter: char) -> Option<&str> {
        self.payload()
            .and_then(|text| {
                text.split(delimiter)
                    .nth(index)
            })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => f.write_str(ACK),
            Self::Nak => f.write_str(NAK),
            Self::Data(text) => f.write_str(text),
            Self::Absent => f.write_str("<no reply>"),
        }
    }
}

/// Remove every `\r` and `\n` from a line.
pub fn strip_terminators(line: &str) -> String {
    line.chars()
        .filter(|c| !matches!(c, '\r' | '\n'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ack_nak_data() {
        assert_eq!(Response::classify(Some(b"ACK\r\n")), Response::Ack);
        assert_eq!(Response::classify(Some(b"NAK\n")), Response::Nak);
        assert_eq!(
            Response::classify(Some(b"870.000000\r\n")),
            Response::Data("870.000000".into())
        );
    }

    #[test]
    fn test_absent_is_not_nak() {
        let absent = Response::classify(None);
        let nak = Response::classify(Some(b"NAK\r\n"));
        assert!(absent.is_absent());
        assert!(nak.is_nak());
        assert_ne!(absent, nak);
    }

    #[test]
    fn test_empty_line_is_data_not_absent() {
        let empty = Response::classify(Some(b"\r\n"));
        assert_eq!(empty, Response::Data(String::new()));
        assert_ne!(empty, Response::Absent);
    }

    #[test]
    fn test_ack_match_is_exact() {
        assert_eq!(Response::from_line("ACK "), Response::Data("ACK ".into()));
        assert_eq!(Response::from_line("ack"), Response::Data("ack".into()));
    }

    #[test]
    fn test_embedded_terminators_removed() {
        assert_eq!(Response::from_line("A\rC\nK"), Response::Ack);
    }

    #[test]
    fn test_invalid_utf8_is_data() {
        let response = Response::classify(Some(&[0xFF, b'O', b'K', b'\n']));
        assert_eq!(response.payload(), Some("\u{FFFD}OK"));
    }

    #[test]
    fn test_field_access() {
        let response = Response::from_line("U\t868.1\tActivateTM\r\n");
        assert_eq!(response.field(0, FIELD_DELIMITER), Some("U"));
        assert_eq!(response.field(2, FIELD_DELIMITER), Some("ActivateTM"));
        assert_eq!(response.field(3, FIELD_DELIMITER), None);
        assert_eq!(Response::Ack.field(0, FIELD_DELIMITER), None);

        let idn = Response::from_line("RWC5020A LoRaWAN Tester, Ver=1.222,SN=RWC50201760009\r\n");
        assert_eq!(idn.field(1, ','), Some(" Ver=1.222"));
        assert_eq!(idn.field(1, FIELD_DELIMITER), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Response::Ack.to_string(), "ACK");
        assert_eq!(Response::Nak.to_string(), "NAK");
        assert_eq!(Response::Data("YES".into()).to_string(), "YES");
        assert_eq!(Response::Absent.to_string(), "<no reply>");
    }

    #[test]
    fn test_same_reply_classifies_the_same() {
        let first = Response::classify(Some(b"ACK\r\n"));
        let second = Response::classify(Some(b"ACK\r\n"));
        assert_eq!(first, second);
    }
}
