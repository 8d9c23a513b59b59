//! Error types for the vevor-ble-bridge crate.

use thiserror::Error;

use crate::supervisor::SupervisorState;

/// Reasons a status notification could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The notification is shorter than the fixed status layout.
    #[error("Status frame too short: {len} bytes (need at least {needed})")]
    Truncated {
        /// Length of the received frame.
        len: usize,
        /// Minimum length of the layout.
        needed: usize,
    },

    /// The two-byte header does not select a supported layout.
    #[error("Unrecognized payload header: {header:02X?}")]
    UnrecognizedPayload {
        /// The first two bytes of the frame.
        header: [u8; 2],
    },

    /// The running mode byte is outside 0..=2.
    #[error("Unrecognized running mode: {mode}")]
    UnrecognizedRunningMode {
        /// The raw mode byte.
        mode: u8,
    },

    /// The running step byte is outside 0..=4.
    #[error("Unrecognized running step: {step}")]
    UnrecognizedRunningStep {
        /// The raw step byte.
        step: u8,
    },
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The heater could not be reached before the connect deadline.
    #[error("BLE connect to {address} timed out after {timeout_secs}s")]
    ConnectTimeout {
        /// The BLE address that was being connected.
        address: String,
        /// The connect deadline in seconds.
        timeout_secs: u64,
    },

    /// The link dropped during a write or while waiting for a notification.
    #[error("BLE link disconnected: {reason}")]
    LinkDisconnected {
        /// Description of where the link was lost.
        reason: String,
    },

    /// Operation requires a live link but none is established.
    #[error("Heater not connected")]
    NotConnected,

    /// Too many consecutive polls went unanswered.
    #[error("Device not responding after {attempts} attempts")]
    NotResponding {
        /// Number of consecutive unanswered polls.
        attempts: u32,
    },

    /// No successful poll within the watchdog window.
    #[error("Watchdog timeout: no successful poll for {elapsed_secs:.1}s (limit {limit_secs}s)")]
    WatchdogTimeout {
        /// Seconds since the last successful poll.
        elapsed_secs: f64,
        /// The configured watchdog window in seconds.
        limit_secs: u64,
    },

    /// A status notification could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// A command payload could not be interpreted.
    #[error("Invalid command payload for {command}: {payload:?}")]
    InvalidCommand {
        /// The command kind the payload was addressed to.
        command: String,
        /// The payload as received.
        payload: String,
    },

    /// The telemetry publisher rejected a message.
    #[error("Publish failed: {reason}")]
    Publish {
        /// Description of the failure.
        reason: String,
    },
}

impl Error {
    /// Wrong hardware: the vendor service or characteristic is missing.
    ///
    /// These are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound { .. } | Self::CharacteristicNotFound { .. }
        )
    }

    /// Caller-side mistakes that say nothing about the link.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. } | Self::InvalidCommand { .. }
        )
    }

    /// The observable state a routed failure leaves the supervisor in.
    pub fn supervisor_state(&self) -> SupervisorState {
        match self {
            Self::LinkDisconnected { .. } | Self::NotConnected => SupervisorState::Disconnected,
            Self::ConnectTimeout { .. } => SupervisorState::Timeout,
            Self::NotResponding { .. } | Self::WatchdogTimeout { .. } => {
                SupervisorState::WatchdogTriggered
            }
            _ => SupervisorState::Error,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
