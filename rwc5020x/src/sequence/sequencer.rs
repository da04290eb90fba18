//! Retry/poll state machine over a [`Tester`].

use log::{debug, info, warn};

use super::{
    ACTIVE, ExchangeOutcome, LINK_STATUS_CHECKS, LinkStatus, MacExchange, NOT_AVAILABLE,
    PollPolicy, RetryPolicy, Sleeper, TestFailure, ThreadSleeper, Timing, message_field,
};
use crate::response::Response;
use crate::tester::Tester;
use crate::transport::Transceive;

/// `Ok` for [`Response::Ack`], a terminal failure for anything else.
pub fn require_ack(response: Response, what: &str) -> Result<(), TestFailure> {
    match response {
        Response::Ack => Ok(()),
        Response::Absent => Err(TestFailure::NoReply {
            what: what.to_string(),
        }),
        other => Err(TestFailure::Rejected {
            what: what.to_string(),
            reply: other.to_string(),
        }),
    }
}

/// Drives test steps against one tester.
pub struct Sequencer<T, S = ThreadSleeper> {
    tester: Tester<T>,
    sleeper: S,
    timing: Timing,
    poll: PollPolicy,
    retry: RetryPolicy,
}

impl<T: Transceive> Sequencer<T, ThreadSleeper> {
    /// Sequencer that really sleeps between polls.
    pub fn new(tester: Tester<T>) -> Self {
        Self::with_sleeper(tester, ThreadSleeper)
    }
}

impl<T: Transceive, S: Sleeper> Sequencer<T, S> {
    /// Sequencer with a custom [`Sleeper`].
    pub fn with_sleeper(tester: Tester<T>, sleeper: S) -> Self {
        Self {
            tester,
            sleeper,
            timing: Timing::default(),
            poll: PollPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the pause durations.
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the link message poll policy.
    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Replace the exchange retry budget.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Borrow the tester.
    pub fn tester(&self) -> &Tester<T> {
        &self.tester
    }

    /// Mutably borrow the tester.
    pub fn tester_mut(&mut self) -> &mut Tester<T> {
        &mut self.tester
    }

    /// Borrow the sleeper.
    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Give back the tester.
    pub fn into_tester(self) -> Tester<T> {
        self.tester
    }

    // Acknowledged commands

    /// Start the link test.
    pub fn run_link(&mut self) -> Result<(), TestFailure> {
        require_ack(self.tester.link_run()?, "Link execution")?;
        info!("Link Status: Running");
        Ok(())
    }

    /// Clear old link messages.
    pub fn clear_link(&mut self) -> Result<(), TestFailure> {
        require_ack(self.tester.link_clear()?, "Clear link message")?;
        info!("Old link messages cleared");
        Ok(())
    }

    /// Stop the link test.
    pub fn stop_link(&mut self) -> Result<(), TestFailure> {
        require_ack(self.tester.link_stop()?, "Link stop")?;
        info!("Link Status: Stopped");
        Ok(())
    }

    /// Prepare one MAC command: downlink slot, unconfirmed frame, command
    /// carried in the payload, a single command at `index`.
    pub fn configure_mac_step(
        &mut self,
        slot: &str,
        index: u8,
        mac_command: &str,
    ) -> Result<(), TestFailure> {
        require_ack(self.tester.set_downlink_slot(slot)?, "Configuring downlink slot")?;
        info!("Protocol Downlink Slot: {slot}");
        require_ack(
            self.tester.set_mac_command_type("UNCONFIRMED")?,
            "Configuring MAC command type",
        )?;
        info!("Link MAC Command Type: UNCONFIRMED");
        require_ack(
            self.tester.set_mac_command_field("PAYLOAD")?,
            "Configuring MAC command field",
        )?;
        info!("Link MAC Command Field: PAYLOAD");
        require_ack(
            self.tester.set_mac_command_count(1)?,
            "Configuring no. of commands",
        )?;
        info!("Link Number of Command: 1");
        require_ack(
            self.tester.set_instant_mac_command(index, mac_command)?,
            "Configuring instant MAC command",
        )?;
        info!("Link Instant MAC Command: {mac_command}");
        Ok(())
    }

    /// Echo payload length of MAC command slot 1.
    pub fn set_payload_length(&mut self, length: u8) -> Result<(), TestFailure> {
        require_ack(
            self.tester.set_payload_length(1, length)?,
            "Configuring bytes length",
        )?;
        info!("Set Bytes: {length}");
        Ok(())
    }

    /// RX1 data rate offset.
    pub fn set_rx1_dr_offset(&mut self, offset: u8) -> Result<(), TestFailure> {
        require_ack(
            self.tester.set_rx1_dr_offset(offset)?,
            "Configuring RX1_DR_OFFSET",
        )?;
        info!("Protocol RX1_DR_OFFSET value: {offset}");
        Ok(())
    }

    /// RX2 data rate.
    pub fn set_rx2_data_rate(&mut self, rate: &str) -> Result<(), TestFailure> {
        require_ack(self.tester.set_rx2_data_rate(rate)?, "Configuring RX2_DR")?;
        info!("Protocol RX2_DR value: {rate}");
        Ok(())
    }

    /// Abnormal-frame injection mode.
    pub fn set_abnormal_mode(&mut self, mode: &str) -> Result<(), TestFailure> {
        require_ack(
            self.tester.set_abnormal_mode(mode)?,
            "Configuring abnormal mode",
        )?;
        info!("Set Abnormal Mode: {mode}");
        Ok(())
    }

    /// Pause, then transmit the configured MAC command.
    pub fn send_mac(&mut self) -> Result<(), TestFailure> {
        self.sleeper
            .sleep(self.timing.settle_before_send);
        require_ack(self.tester.send_mac()?, "Send MAC command")?;
        debug!("MAC command sent");
        Ok(())
    }

    /// Reset the tester's link message buffer.
    pub fn reset_link_message(&mut self) -> Result<(), TestFailure> {
        require_ack(self.tester.reset_link_message()?, "Link message reset")?;
        debug!("Link message reset");
        Ok(())
    }

    // Link status

    /// One activation check. No reply and an empty line are both
    /// [`LinkStatus::Unknown`].
    pub fn link_status(&mut self) -> Result<LinkStatus, TestFailure> {
        let status = match self.tester.activation_status()? {
            Response::Absent => LinkStatus::Unknown,
            Response::Data(text) if text.is_empty() => LinkStatus::Unknown,
            Response::Data(text) if text == ACTIVE => LinkStatus::Active,
            _ => LinkStatus::Inactive,
        };
        debug!("Link activation status: {status:?}");
        Ok(status)
    }

    /// Wait for the DUT to join. An inactive link is re-checked once after
    /// [`Timing::link_retry`]; no answer is fatal immediately.
    pub fn poll_link_status(&mut self) -> Result<(), TestFailure> {
        for check in 0..LINK_STATUS_CHECKS {
            match self.link_status()? {
                LinkStatus::Active => {
                    info!("Link status: Active");
                    return Ok(());
                },
                LinkStatus::Unknown => {
                    return Err(TestFailure::NoReply {
                        what: "Link activation status".to_string(),
                    });
                },
                LinkStatus::Inactive => {
                    if check == 0 {
                        warn!("Link status: In-active. Please make sure the link is active");
                        info!("Trying again...");
                        self.sleeper
                            .sleep(self.timing.link_retry);
                    }
                },
            }
        }
        Err(TestFailure::LinkInactive)
    }

    // Link messages

    /// Poll `READ:LINK:MSG?` until a message is buffered.
    ///
    /// No reply and `NA` are polled again after [`Timing::poll_interval`]
    /// (for as long as the [`PollPolicy`] allows); any other non-message
    /// reply is fatal.
    pub fn read_link_message(&mut self) -> Result<String, TestFailure> {
        let mut polls = 0u32;
        loop {
            if let PollPolicy::Bounded(max) = self.poll {
                if polls >= max {
                    return Err(TestFailure::PollExhausted { polls });
                }
            }

            let reply = self.tester.read_link_message()?;
            polls += 1;
            self.sleeper
                .sleep(self.timing.poll_interval);

            match reply {
                Response::Absent => debug!("No link message yet (poll {polls})"),
                Response::Data(text) if text == NOT_AVAILABLE => {
                    debug!("Link message not available (poll {polls})");
                },
                Response::Data(text) if !text.is_empty() => return Ok(text),
                other => {
                    return Err(TestFailure::MessageRejected {
                        reply: other.to_string(),
                    });
                },
            }
        }
    }

    /// Run one MAC command exchange to a decision.
    ///
    /// Each round sends the command, resets the message buffer and examines
    /// up to [`RetryPolicy::attempts`] messages for the request tag. A
    /// request is followed by one read for the response tag. A round that
    /// runs out of attempts hands over to the next round; when no round is
    /// left the outcome is [`ExchangeOutcome::Failed`].
    pub fn mac_exchange(&mut self, exchange: &MacExchange) -> Result<ExchangeOutcome, TestFailure> {
        let rounds = self.retry.rounds;
        let attempts = self.retry.attempts;

        for round in 1..=rounds {
            if round > 1 {
                info!("MAC exchange round {round}/{rounds}");
            }
            self.send_mac()?;
            self.sleeper
                .sleep(self.timing.after_send);
            self.reset_link_message()?;

            let mut attempt = 0;
            while attempt < attempts {
                let message = self.read_link_message()?;
                let request = message_field(&message, exchange.request_field).unwrap_or_default();
                if !request.contains(&exchange.request_tag) {
                    debug!(
                        "No {} in field {}: {request:?}",
                        exchange.request_tag, exchange.request_field
                    );
                    attempt += 1;
                    continue;
                }
                info!("MAC Request: {request}");
                let request = request.to_string();

                let message = self.read_link_message()?;
                let response = message_field(&message, exchange.response_field).unwrap_or_default();
                if response.contains(&exchange.response_tag) {
                    info!("Response: {response}");
                    return Ok(ExchangeOutcome::Matched {
                        request,
                        response: response.to_string(),
                    });
                }

                attempt += 1;
                if attempt < attempts {
                    warn!("Invalid Response: {response}. Trying again...");
                    self.sleeper
                        .sleep(self.timing.poll_interval);
                } else {
                    warn!("Invalid Response: {response}");
                }
            }
            self.sleeper
                .sleep(self.timing.between_rounds);
        }
        Ok(ExchangeOutcome::Failed)
    }

    /// [`Sequencer::mac_exchange`] where anything but a match fails `step`.
    pub fn run_step(&mut self, step: &str, exchange: &MacExchange) -> Result<(), TestFailure> {
        info!("{step}");
        match self.mac_exchange(exchange)? {
            ExchangeOutcome::Matched { .. } => Ok(()),
            ExchangeOutcome::Failed => Err(TestFailure::StepFailed {
                step: step.to_string(),
            }),
        }
    }

    /// Read the next message and fail when `field` equals `forbidden`.
    /// Returns the field value that was seen.
    pub fn expect_no_response(
        &mut self,
        step: &str,
        field: usize,
        forbidden: &str,
    ) -> Result<String, TestFailure> {
        let message = self.read_link_message()?;
        let value = message_field(&message, field).unwrap_or_default();
        if value == forbidden {
            return Err(TestFailure::UnexpectedMessage {
                step: step.to_string(),
                field,
                tag: forbidden.to_string(),
            });
        }
        info!("Response: {value}");
        Ok(value.to_string())
    }
}
