//! Tester command facade.
//!
//! [`Tester`] wraps anything implementing [`Transceive`] and exposes the
//! part of the command vocabulary the certification sequences use. Every
//! method validates its arguments first and returns the classified reply;
//! `Err` means nothing was transmitted.

use std::time::Duration;

use log::debug;

use crate::capability::{Feature, FirmwareVersion};
use crate::command::{Command, check_choice, check_range};
use crate::error::{Error, Result};
use crate::response::Response;
use crate::transport::Transceive;

/// Default processing time the tester needs after `EXEC:LINK:SEND_MAC`.
pub const DEFAULT_MAC_SETTLE: Duration = Duration::from_secs(1);

/// Tester operating modes.
pub const TEST_MODES: &[&str] = &["EDT", "GWT", "NST_TX", "NST_RX", "NST_MFG"];

/// Sub screens selectable in EDT/GWT mode.
pub const SCREENS: &[&str] = &["LINK", "POWER_TIME", "POWER_CHANNEL", "SENSITIVITY"];

/// Downlink receive windows.
pub const DOWNLINK_SLOTS: &[&str] = &["RX1", "RX2", "PING"];

/// MAC command frame types.
pub const MAC_COMMAND_TYPES: &[&str] = &["UNCONFIRMED", "CONFIRMED"];

/// Where MAC commands are carried in the downlink frame.
pub const MAC_COMMAND_FIELDS: &[&str] = &["PAYLOAD", "FOPTS"];

/// Instant MAC commands.
pub const INSTANT_MAC_COMMANDS: &[&str] = &[
    "LINK_CHECK",
    "LINK_ADR",
    "DUTY_CYCLE",
    "RX_PARAM_SETUP",
    "DEV_STATUS",
    "NEW_CHANNEL",
    "RX_TIMING_SETUP",
    "TX_PARAM_SETUP",
    "DL_CHANNEL",
    "DEVICE_TIME",
    "DEVICE_MODE",
    "RESET_IND",
    "FORCE_REJOIN",
    "REJOIN_SETUP",
    "ADR_SETUP",
    "BEACON_FREQ",
    "PING_SLOT_CH",
    "USER_DEFINED",
    "ACTIVATE_TM",
    "DEACTIVATE_TM",
    "CONFIRMED_TM",
    "UNCONFIRMED_TM",
    "ECHO_REQUEST_TM",
    "TRIGGER_JOIN_REQ_TM",
    "ENABLE_CW_MODE_TM",
];

/// RX2 data rates.
pub const RX2_DATA_RATES: &[&str] = &[
    "DR0_SF12BW125",
    "DR1_SF11BW125",
    "DR2_SF10BW125",
    "DR3_SF9BW125",
    "DR4_SF8BW125",
    "DR5_SF7BW125",
    "DR6_SF7BW250",
    "DR7_FSK50",
];

/// Abnormal-frame injection modes.
pub const ABNORMAL_MODES: &[&str] = &["OFF", "MIC_ERR", "FCNT_ERR", "DEVADDR_ERR", "PORT_ERR"];

/// Command facade over a [`Transceive`] link.
pub struct Tester<T> {
    link: T,
    firmware: Option<FirmwareVersion>,
    mac_settle: Duration,
}

impl<T: Transceive> Tester<T> {
    /// Wrap `link`. The firmware version is unknown until set.
    pub fn new(link: T) -> Self {
        Self {
            link,
            firmware: None,
            mac_settle: DEFAULT_MAC_SETTLE,
        }
    }

    /// Record the caller-supplied firmware version used for feature gating.
    #[must_use]
    pub fn with_firmware(mut self, firmware: FirmwareVersion) -> Self {
        self.firmware = Some(firmware);
        self
    }

    /// Processing time awaited after sending a MAC command.
    #[must_use]
    pub fn with_mac_settle(mut self, settle: Duration) -> Self {
        self.mac_settle = settle;
        self
    }

    /// Firmware version, if one was supplied.
    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &T {
        &self.link
    }

    /// Mutably borrow the underlying link.
    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }

    /// Unwrap the underlying link.
    pub fn into_inner(self) -> T {
        self.link
    }

    fn send(&mut self, command: &Command) -> Response {
        self.send_settled(command, Duration::ZERO)
    }

    fn send_settled(&mut self, command: &Command, settle: Duration) -> Response {
        let reply = self
            .link
            .transceive(command.as_str(), settle);
        debug!("{command} -> {reply}");
        reply
    }

    fn require(&self, feature: Feature) -> Result<()> {
        match self.firmware {
            Some(version) if !feature.available_on(version) => Err(Error::Unsupported(format!(
                "{} is not available on firmware {version}",
                feature.name()
            ))),
            _ => Ok(()),
        }
    }

    // Common commands

    /// `*IDN?`
    pub fn identification(&mut self) -> Result<Response> {
        Ok(self.send(&Command::raw("*IDN?")))
    }

    /// `*RST`
    pub fn reset(&mut self) -> Result<Response> {
        Ok(self.send(&Command::raw("*RST")))
    }

    /// Tester software version, e.g. `1.222`.
    pub fn system_version(&mut self) -> Result<Response> {
        Ok(self.send(&Command::query("SYS", "VERSION")))
    }

    /// Switch the tester operating mode.
    pub fn set_mode(&mut self, mode: &str) -> Result<Response> {
        let mode = check_choice("mode", mode, TEST_MODES)?;
        Ok(self.send(&Command::set("SYS", "MODE", mode)))
    }

    /// Select a sub screen.
    pub fn set_screen(&mut self, screen: &str) -> Result<Response> {
        let screen = check_choice("screen", screen, SCREENS)?;
        Ok(self.send(&Command::set("SYS", "SCREEN", screen)))
    }

    // Link control

    /// Start the link test.
    pub fn link_run(&mut self) -> Result<Response> {
        Ok(self.send(&Command::exec("LINK", "RUN")))
    }

    /// Stop the link test.
    pub fn link_stop(&mut self) -> Result<Response> {
        Ok(self.send(&Command::exec("LINK", "STOP")))
    }

    /// Clear buffered link messages.
    pub fn link_clear(&mut self) -> Result<Response> {
        Ok(self.send(&Command::exec("LINK", "CLEAR")))
    }

    /// `YES` when the DUT has joined.
    pub fn activation_status(&mut self) -> Result<Response> {
        Ok(self.send(&Command::query("LINK", "ACTIVATION")))
    }

    /// Oldest buffered link message, or `NA` when none is buffered.
    pub fn read_link_message(&mut self) -> Result<Response> {
        Ok(self.send(&Command::query("LINK", "MSG")))
    }

    /// Reset the link message buffer.
    pub fn reset_link_message(&mut self) -> Result<Response> {
        Ok(self.send(&Command::exec("LINK", "MSG_RESET")))
    }

    /// Transmit the configured MAC command, then wait for the tester to
    /// process it before reading the acknowledgement.
    pub fn send_mac(&mut self) -> Result<Response> {
        let settle = self.mac_settle;
        Ok(self.send_settled(&Command::exec("LINK", "SEND_MAC"), settle))
    }

    // Protocol and MAC configuration

    /// Downlink window used for MAC commands.
    pub fn set_downlink_slot(&mut self, slot: &str) -> Result<Response> {
        let slot = check_choice("downlink slot", slot, DOWNLINK_SLOTS)?;
        Ok(self.send(&Command::set("PROTOCOL", "DL_SLOT", slot)))
    }

    /// Confirmed or unconfirmed MAC command frames.
    pub fn set_mac_command_type(&mut self, kind: &str) -> Result<Response> {
        let kind = check_choice("MAC command type", kind, MAC_COMMAND_TYPES)?;
        Ok(self.send(&Command::set("LINK", "MAC_CMD_TYPE", kind)))
    }

    /// Carry MAC commands in the payload or in FOpts.
    pub fn set_mac_command_field(&mut self, field: &str) -> Result<Response> {
        let field = check_choice("MAC command field", field, MAC_COMMAND_FIELDS)?;
        Ok(self.send(&Command::set("LINK", "MAC_CMD_FIELD", field)))
    }

    /// Number of MAC commands per downlink (1..=5).
    pub fn set_mac_command_count(&mut self, count: u8) -> Result<Response> {
        let count = check_range("number of MAC commands", count, 1..=5)?;
        Ok(self.send(&Command::set("LINK", "NUM_MAC_CMD", count)))
    }

    /// Assign an instant MAC command to slot `index` (1..=5).
    pub fn set_instant_mac_command(&mut self, index: u8, command: &str) -> Result<Response> {
        let index = check_range("instant MAC command index", index, 1..=5)?;
        let command = check_choice("instant MAC command", command, INSTANT_MAC_COMMANDS)?;
        if command.ends_with("_TM") {
            self.require(Feature::TestModeMacCommands)?;
        }
        Ok(self.send(&Command::set(
            "LINK",
            "INSTANT_MAC_CMD",
            format!("{index},{command}"),
        )))
    }

    /// Payload length of MAC command slot `index` (1..=5) in bytes (1..=242).
    pub fn set_payload_length(&mut self, index: u8, length: u8) -> Result<Response> {
        self.require(Feature::PayloadLength)?;
        let index = check_range("payload index", index, 1..=5)?;
        let length = check_range("payload length", length, 1..=242)?;
        Ok(self.send(&Command::set(
            "LINK",
            "PAYLOAD_LEN",
            format!("{index},{length}"),
        )))
    }

    /// RX1 data rate offset (0..=7).
    pub fn set_rx1_dr_offset(&mut self, offset: u8) -> Result<Response> {
        let offset = check_range("RX1 DR offset", offset, 0..=7)?;
        Ok(self.send(&Command::set("PROTOCOL", "RX1_DR_OFFSET", offset)))
    }

    /// RX2 data rate.
    pub fn set_rx2_data_rate(&mut self, rate: &str) -> Result<Response> {
        let rate = check_choice("RX2 data rate", rate, RX2_DATA_RATES)?;
        Ok(self.send(&Command::set("PROTOCOL", "RX2_DR", rate)))
    }

    /// Abnormal-frame injection.
    pub fn set_abnormal_mode(&mut self, mode: &str) -> Result<Response> {
        self.require(Feature::AbnormalMode)?;
        let mode = check_choice("abnormal mode", mode, ABNORMAL_MODES)?;
        Ok(self.send(&Command::set("LINK", "ABNORMAL", mode)))
    }
}
