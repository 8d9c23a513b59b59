//! One physical session with the heater.
//!
//! A [`HeaterLink`] owns a transport and the notification [`Mailbox`] and runs
//! one request/response exchange at a time. It never retries: every miss or
//! failure goes back to the caller, which owns the retry policy.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::ble::connection::ConnectionState;
use crate::ble::mailbox::Mailbox;
use crate::error::{Error, Result};
use crate::protocol::frame::{CommandFrame, Opcode};
use crate::protocol::status::StatusSnapshot;

/// Highest level/temperature argument the heater accepts.
pub const MAX_LEVEL_OR_TEMPERATURE: u16 = 36;

/// Byte-level access to the heater characteristic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Write a frame, requesting delivery confirmation.
    async fn write_frame(&self, frame: &[u8]) -> Result<()>;

    /// Tear the session down. Must not fail.
    async fn close(&self);
}

/// Operations the supervisor performs on a live link.
#[async_trait]
pub trait HeaterControl: Send {
    /// Request a status notification.
    async fn get_status(&mut self) -> Result<Option<StatusSnapshot>>;

    /// Start the heater.
    async fn start(&mut self) -> Result<Option<StatusSnapshot>>;

    /// Stop the heater.
    async fn stop(&mut self) -> Result<Option<StatusSnapshot>>;

    /// Set the power level or the temperature setpoint (1..=36).
    async fn set_level_or_temperature(&mut self, value: u16) -> Result<Option<StatusSnapshot>>;

    /// Select level (1) or temperature (2) mode.
    async fn set_mode(&mut self, mode: u8) -> Result<Option<StatusSnapshot>>;

    /// Best-effort teardown.
    async fn disconnect(&mut self);

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;
}

/// Establishes links. The supervisor asks for a fresh one after every failure.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The link type produced.
    type Link: HeaterControl + 'static;

    /// Connect to the configured heater.
    async fn connect(&self) -> Result<Self::Link>;

    /// Reset the underlying adapter after repeated reconnect failures.
    async fn reset_adapter(&self) -> Result<()> {
        Ok(())
    }
}

/// A heater session over some [`FrameTransport`].
pub struct HeaterLink<T> {
    transport: T,
    mailbox: Mailbox,
    passkey: u16,
    response_timeout: Duration,
    state: ConnectionState,
    /// Set once the transport has been released.
    closed: bool,
}

impl<T: FrameTransport> HeaterLink<T> {
    /// Wrap an open transport and the mailbox its listener feeds.
    pub fn new(transport: T, mailbox: Mailbox, passkey: u16, response_timeout: Duration) -> Self {
        Self {
            transport,
            mailbox,
            passkey,
            response_timeout,
            state: ConnectionState::Connected,
            closed: false,
        }
    }

    /// Send one command and wait for its notification.
    ///
    /// Returns `Ok(None)` when nothing arrived within the response timeout.
    /// Write failures and a vanished notification stream are
    /// [`Error::LinkDisconnected`]; an undecodable reply is [`Error::Decode`].
    pub async fn send_command(
        &mut self,
        opcode: Opcode,
        argument: u16,
    ) -> Result<Option<StatusSnapshot>> {
        if !self.state.is_connected() {
            return Err(Error::NotConnected);
        }

        let frame = CommandFrame::command(opcode, argument, self.passkey);

        let stale = self.mailbox.clear();
        if stale > 0 {
            debug!("Discarded {} stale notification(s)", stale);
        }

        trace!("> {:02X?}", frame.as_bytes());
        if let Err(e) = self.transport.write_frame(frame.as_ref()).await {
            self.state = ConnectionState::Disconnected;
            return Err(Error::LinkDisconnected {
                reason: format!("write failed: {}", e),
            });
        }

        match self.mailbox.wait(self.response_timeout).await {
            Ok(Some(data)) => {
                trace!("< {:02X?}", &data[..]);
                Ok(Some(StatusSnapshot::decode(&data)?))
            }
            Ok(None) => {
                debug!("No notification received for {:?} (timeout)", opcode);
                Ok(None)
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<T: FrameTransport> HeaterControl for HeaterLink<T> {
    async fn get_status(&mut self) -> Result<Option<StatusSnapshot>> {
        self.send_command(Opcode::GetStatus, 0).await
    }

    async fn start(&mut self) -> Result<Option<StatusSnapshot>> {
        self.send_command(Opcode::StartStop, 1).await
    }

    async fn stop(&mut self) -> Result<Option<StatusSnapshot>> {
        self.send_command(Opcode::StartStop, 0).await
    }

    async fn set_level_or_temperature(&mut self, value: u16) -> Result<Option<StatusSnapshot>> {
        if !(1..=MAX_LEVEL_OR_TEMPERATURE).contains(&value) {
            return Err(Error::InvalidParameter {
                name: "level".to_string(),
                value: value.to_string(),
            });
        }
        self.send_command(Opcode::SetLevelOrTemperature, value).await
    }

    async fn set_mode(&mut self, mode: u8) -> Result<Option<StatusSnapshot>> {
        if !(1..=2).contains(&mode) {
            return Err(Error::InvalidParameter {
                name: "mode".to_string(),
                value: mode.to_string(),
            });
        }
        self.send_command(Opcode::SetMode, mode as u16).await
    }

    async fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        if self.closed {
            return;
        }
        // A failed exchange marks the link down but leaves the transport open.
        self.transport.close().await;
        self.closed = true;
        info!("Heater link closed");
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }
}
