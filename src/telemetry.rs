//! Telemetry surface.
//!
//! The supervisor does not know about topics or brokers. It hands
//! `(TopicRole, value)` pairs to a [`TelemetryPublisher`] and the publisher
//! maps roles onto whatever transport it speaks.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::status::{RunningMode, RunningStep, StatusSnapshot};
use crate::supervisor::SupervisorState;

/// Availability payload for an enabled control.
pub const ONLINE: &str = "online";
/// Availability payload for a disabled control.
pub const OFFLINE: &str = "offline";

/// What a published value means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TopicRole {
    /// Running step and supervisor state, human readable.
    Status,
    /// Cabin temperature in °C.
    RoomTemperature,
    /// Case temperature in °C.
    HeaterTemperature,
    /// Supply voltage in volts.
    Voltage,
    /// Altitude in meters.
    Altitude,
    /// Running mode name.
    Mode,
    /// Power level.
    Level,
    /// Temperature setpoint.
    Temperature,
    /// Whether "start" is currently meaningful.
    StartAvailability,
    /// Whether "stop" is currently meaningful.
    StopAvailability,
    /// Whether the level control is enabled.
    LevelAvailability,
    /// Whether the setpoint control is enabled.
    TemperatureAvailability,
    /// Whether the mode control is enabled.
    ModeAvailability,
    /// Overheat lockout state.
    OverheatLockout,
    /// Temperature-based level cap.
    LevelCap,
    /// Operator notices such as rejected commands.
    Notice,
}

impl TopicRole {
    /// Every availability role, in publishing order.
    pub const AVAILABILITY: [TopicRole; 5] = [
        Self::StartAvailability,
        Self::StopAvailability,
        Self::LevelAvailability,
        Self::TemperatureAvailability,
        Self::ModeAvailability,
    ];

    /// Short name, usable as a topic suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::RoomTemperature => "room_temperature",
            Self::HeaterTemperature => "heater_temperature",
            Self::Voltage => "voltage",
            Self::Altitude => "altitude",
            Self::Mode => "mode",
            Self::Level => "level",
            Self::Temperature => "temperature",
            Self::StartAvailability => "start/availability",
            Self::StopAvailability => "stop/availability",
            Self::LevelAvailability => "level/availability",
            Self::TemperatureAvailability => "temperature/availability",
            Self::ModeAvailability => "mode/availability",
            Self::OverheatLockout => "overheat_lockout",
            Self::LevelCap => "level_cap",
            Self::Notice => "notice",
        }
    }
}

impl std::fmt::Display for TopicRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for telemetry values.
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    /// Publish one value.
    async fn publish(&self, role: TopicRole, value: String) -> Result<()>;
}

#[async_trait]
impl<T: TelemetryPublisher + ?Sized> TelemetryPublisher for Arc<T> {
    async fn publish(&self, role: TopicRole, value: String) -> Result<()> {
        (**self).publish(role, value).await
    }
}

/// Human-readable status line: the running step, the fault if any, and the
/// supervisor state unless it is plain "Connected".
pub fn status_line(snapshot: &StatusSnapshot, state: &SupervisorState) -> String {
    let mut line = snapshot.running_step_message().to_string();
    if let Some(error) = snapshot.error_message().filter(|_| snapshot.has_error()) {
        line.push_str(&format!(" ({})", error));
    }
    if *state != SupervisorState::Connected {
        line.push_str(&format!(" [{}]", state));
    }
    line
}

/// Values to publish for a poll or command result.
///
/// Controls are only marked online when they make sense for the reported
/// step and mode; every availability role not marked online is published
/// offline. Without a snapshot every control goes offline.
pub fn snapshot_messages(
    snapshot: Option<&StatusSnapshot>,
    state: &SupervisorState,
) -> Vec<(TopicRole, String)> {
    let mut messages = Vec::new();
    let mut online = Vec::new();

    if let Some(s) = snapshot {
        messages.push((TopicRole::Status, status_line(s, state)));
        messages.push((TopicRole::RoomTemperature, s.cab_temperature.to_string()));

        if s.running_mode != RunningMode::LevelBasic {
            online.push(TopicRole::ModeAvailability);
            messages.push((TopicRole::Mode, s.running_mode.name().to_string()));
        }

        if s.running_step != RunningStep::Standby {
            messages.push((TopicRole::Voltage, format!("{:.1}", s.supply_voltage)));
            messages.push((TopicRole::Altitude, s.altitude.to_string()));
            messages.push((TopicRole::HeaterTemperature, s.case_temperature.to_string()));
            messages.push((TopicRole::Level, s.set_level.to_string()));
            if let Some(setpoint) = s.set_temperature {
                messages.push((TopicRole::Temperature, setpoint.to_string()));
            }

            let adjustable = s.running_step != RunningStep::Cooldown;
            match s.running_mode {
                RunningMode::LevelBasic | RunningMode::Level if adjustable => {
                    online.push(TopicRole::LevelAvailability)
                }
                RunningMode::Temperature => online.push(TopicRole::TemperatureAvailability),
                _ => {}
            }
            if adjustable {
                online.push(TopicRole::StopAvailability);
            }
        } else {
            online.push(TopicRole::StartAvailability);
        }
    }

    for role in TopicRole::AVAILABILITY {
        let value = if online.contains(&role) { ONLINE } else { OFFLINE };
        messages.push((role, value.to_string()));
    }
    messages
}

/// Overheat lockout value.
pub fn lockout_message(remaining_secs: Option<u64>) -> String {
    match remaining_secs {
        Some(secs) => format!("Active ({}s remaining)", secs),
        None => "Inactive".to_string(),
    }
}

/// Level cap value.
pub fn level_cap_message(cap: Option<u16>) -> String {
    match cap {
        Some(level) => format!("Active: max level {}", level),
        None => "Inactive".to_string(),
    }
}
