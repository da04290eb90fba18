//! Firmware-version gated command availability.
//!
//! The caller supplies the tester's firmware version string; it is trusted
//! as given. Commands that only exist on some firmware releases consult
//! [`Feature::available_on`] instead of scattering version checks.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Tester firmware version such as `1.222`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    /// Major release.
    pub major: u16,
    /// Minor release.
    pub minor: u16,
}

impl FirmwareVersion {
    /// Build a version from its parts.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl FromStr for FirmwareVersion {
    type Err = Error;

    /// Accepts `1.222`, `Ver=1.222` and `V1.222`, with surrounding spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("Ver=")
            .or_else(|| trimmed.strip_prefix(['V', 'v']))
            .unwrap_or(trimmed);
        let (major, minor) = digits
            .split_once('.')
            .ok_or_else(|| Error::Config(format!("invalid firmware version '{s}'")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("invalid firmware version '{s}': {e}")))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Commands whose availability depends on the firmware release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Abnormal-frame injection (`MIC_ERR`, ...).
    AbnormalMode,
    /// Echo payload length configuration.
    PayloadLength,
    /// LoRaWAN 1.0.3 test-mode MAC commands (`TRIGGER_JOIN_REQ_TM`, ...).
    TestModeMacCommands,
}

/// Version range in which a feature exists: `since..until`.
struct Availability {
    feature: Feature,
    since: FirmwareVersion,
    until: Option<FirmwareVersion>,
}

const CAPABILITIES: &[Availability] = &[
    Availability {
        feature: Feature::AbnormalMode,
        since: FirmwareVersion::new(1, 200),
        until: None,
    },
    Availability {
        feature: Feature::PayloadLength,
        since: FirmwareVersion::new(1, 150),
        until: None,
    },
    Availability {
        feature: Feature::TestModeMacCommands,
        since: FirmwareVersion::new(1, 200),
        until: None,
    },
];

impl Feature {
    /// Whether the feature exists on `version`.
    pub fn available_on(self, version: FirmwareVersion) -> bool {
        CAPABILITIES
            .iter()
            .filter(|entry| entry.feature == self)
            .any(|entry| {
                version >= entry.since && entry.until.is_none_or(|until| version < until)
            })
    }

    /// Short name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::AbnormalMode => "abnormal mode",
            Self::PayloadLength => "payload length",
            Self::TestModeMacCommands => "test-mode MAC commands",
        }
    }
}
