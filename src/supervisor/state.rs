//! Observable supervisor state.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::ble::connection::ConnectionState;
use crate::protocol::status::StatusSnapshot;

/// What the supervisor is doing, as shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SupervisorState {
    /// Link up, no protection active.
    Connected,
    /// Establishing a new link.
    Reconnecting,
    /// No link, either not yet connected or dropped.
    #[default]
    Disconnected,
    /// The connect deadline passed.
    Timeout,
    /// Polls went unanswered or the watchdog fired.
    WatchdogTriggered,
    /// Any other routed failure (decode errors included).
    Error,
    /// Repeated recoveries failed; waiting with an extended backoff.
    ConnectionFailed,
    /// Link up, level capped by case temperature.
    TemperatureLimiting {
        /// The current cap.
        max_level: u16,
    },
    /// Link up, overheat lockout in force.
    OverheatActive,
}

impl SupervisorState {
    /// Check if the state implies a live link.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::TemperatureLimiting { .. } | Self::OverheatActive
        )
    }

    /// Check if the heater is being throttled on purpose (as opposed to unreachable).
    pub fn is_protective(&self) -> bool {
        matches!(self, Self::TemperatureLimiting { .. } | Self::OverheatActive)
    }
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Timeout => write!(f, "Timeout"),
            Self::WatchdogTriggered => write!(f, "Watchdog Triggered"),
            Self::Error => write!(f, "Error"),
            Self::ConnectionFailed => write!(f, "Connection Failed"),
            Self::TemperatureLimiting { max_level } => {
                write!(f, "Temperature limiting: max level {}", max_level)
            }
            Self::OverheatActive => write!(f, "Overheat Active"),
        }
    }
}

/// Overheat guard as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OverheatStatus {
    /// Lockout in force.
    pub active: bool,
    /// Time left until controls are re-enabled.
    pub remaining: Duration,
    /// Lockout length currently applied.
    pub lockout: Duration,
    /// "Still rising" events seen during this lockout.
    pub rising_count: u32,
}

/// Point-in-time view of the supervisor for the telemetry side.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SupervisorStatus {
    /// Current state.
    pub state: SupervisorState,
    /// Link state.
    pub connection: ConnectionState,
    /// Overheat guard.
    pub overheat: OverheatStatus,
    /// Current level cap (36 means unrestricted).
    pub level_cap: u16,
    /// Last reported case temperature in °C.
    pub case_temperature: i16,
    /// Last reported level.
    pub device_level: Option<u16>,
    /// Unanswered polls in a row.
    pub consecutive_failures: u32,
    /// Failed connects since the last success.
    pub failed_reconnects: u32,
    /// Recoveries since the last successful connect.
    pub reconnect_attempts: u32,
    /// Time since the last successful poll.
    pub since_last_poll: Duration,
    /// Wall-clock time of the last successful poll.
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Most recent decoded status.
    pub last_snapshot: Option<StatusSnapshot>,
}
