//! EU certification scenarios.

use std::fmt;
use std::str::FromStr;

use log::info;

use super::{MacExchange, Sequencer, Sleeper, TestFailure};
use crate::error::Error;
use crate::transport::Transceive;

/// Link message field carrying the MAC command name.
const MAC_FIELD: usize = 17;

/// Instant MAC command slot used by every step.
const SLOT_INDEX: u8 = 1;

/// Echo payload lengths swept by 5.5.
const ECHO_SWEEP: std::ops::RangeInclusive<u8> = 2..=18;

/// A predefined certification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// EU certification 5.3: activation, join trigger, echo on RX1/RX2.
    Eu53,
    /// EU certification 5.5: echo payload sweep and MIC error injection.
    Eu55,
}

impl Scenario {
    /// Every scenario.
    pub const ALL: [Scenario; 2] = [Scenario::Eu53, Scenario::Eu55];

    /// Command-line name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Eu53 => "eu-5.3",
            Self::Eu55 => "eu-5.5",
        }
    }

    /// Human-readable title.
    pub fn title(self) -> &'static str {
        match self {
            Self::Eu53 => "EU Certification(5.3)",
            Self::Eu55 => "EU Certification(5.5)",
        }
    }

    /// Run the scenario to completion; `Ok` is a pass.
    pub fn run<T, S>(self, seq: &mut Sequencer<T, S>) -> Result<(), TestFailure>
    where
        T: Transceive,
        S: Sleeper,
    {
        match self {
            Self::Eu53 => eu_5_3(seq)?,
            Self::Eu55 => eu_5_5(seq)?,
        }
        info!("{} Test Finished", self.title());
        Ok(())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL
                    .iter()
                    .map(|scenario| scenario.name())
                    .collect();
                Error::Config(format!("unknown scenario '{s}' (expected {})", names.join(", ")))
            })
    }
}

fn activate_tm<T: Transceive, S: Sleeper>(seq: &mut Sequencer<T, S>) -> Result<(), TestFailure> {
    seq.configure_mac_step("RX1", SLOT_INDEX, "ACTIVATE_TM")?;
    seq.run_step(
        "ACTIVATE-TM MAC CMD REQUEST",
        &MacExchange::in_field(MAC_FIELD, "ActivateTM", "DlCounter"),
    )
}

fn echo_request<T: Transceive, S: Sleeper>(
    seq: &mut Sequencer<T, S>,
    slot: &str,
    length: u8,
) -> Result<(), TestFailure> {
    seq.set_payload_length(length)?;
    seq.configure_mac_step(slot, SLOT_INDEX, "ECHO_REQUEST_TM")?;
    seq.run_step(
        &format!("ECHO REQUEST MAC CMD REQUEST (Bytes - {length}, {slot})"),
        &MacExchange::in_field(MAC_FIELD, "EchoRequest", "EchoResponse"),
    )
}

fn eu_5_3<T: Transceive, S: Sleeper>(seq: &mut Sequencer<T, S>) -> Result<(), TestFailure> {
    seq.clear_link()?;
    seq.run_link()?;
    info!("Start EU Certification(5.3) Test");
    seq.poll_link_status()?;

    activate_tm(seq)?;

    seq.set_rx1_dr_offset(2)?;
    seq.set_rx2_data_rate("DR2_SF10BW125")?;
    seq.configure_mac_step("RX1", SLOT_INDEX, "TRIGGER_JOIN_REQ_TM")?;
    seq.run_step(
        "TRIGGER JOIN MAC CMD REQUEST",
        &MacExchange::in_field(MAC_FIELD, "TriggerJoinReq", "Join-request"),
    )?;

    seq.poll_link_status()?;
    activate_tm(seq)?;

    echo_request(seq, "RX1", 2)?;
    echo_request(seq, "RX2", 2)
}

fn eu_5_5<T: Transceive, S: Sleeper>(seq: &mut Sequencer<T, S>) -> Result<(), TestFailure> {
    seq.run_link()?;
    info!("Start EU Certification(5.5) Test");
    seq.clear_link()?;
    seq.poll_link_status()?;

    activate_tm(seq)?;

    for length in ECHO_SWEEP {
        echo_request(seq, "RX1", length)?;
    }

    let step = "ECHO REQUEST MAC CMD REQUEST (Abnormal mode - MIC_ERR)";
    seq.set_abnormal_mode("MIC_ERR")?;
    seq.configure_mac_step("RX1", SLOT_INDEX, "ECHO_REQUEST_TM")?;
    // With a corrupted MIC any uplink counts as the DUT's answer.
    seq.run_step(step, &MacExchange::new(MAC_FIELD, "EchoRequest", 0, "U"))?;
    seq.expect_no_response(step, MAC_FIELD, "EchoResponse")?;

    seq.set_abnormal_mode("OFF")
}
