//! Command parsing and admission.
//!
//! Commands arrive as raw payloads from the telemetry side. The gate turns
//! them into [`Command`]s and decides, before the transport is touched,
//! whether each one is forwarded, clamped, suppressed or rejected.

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::link::MAX_LEVEL_OR_TEMPERATURE;
use crate::protocol::status::{RunningMode, StatusSnapshot};
use crate::supervisor::level_cap::LevelCapPolicy;
use crate::supervisor::overheat::OverheatGuard;

/// Which command topic a payload arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Start the heater.
    Start,
    /// Stop the heater.
    Stop,
    /// Set the power level.
    Level,
    /// Set the temperature setpoint.
    Temperature,
    /// Select level or temperature mode.
    Mode,
}

impl CommandKind {
    /// Parse a command name (`"start"`, `"stop"`, `"level"`, `"temperature"`, `"mode"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "level" => Some(Self::Level),
            "temperature" => Some(Self::Temperature),
            "mode" => Some(Self::Mode),
            _ => None,
        }
    }

    /// Command name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Level => "level",
            Self::Temperature => "temperature",
            Self::Mode => "mode",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed heater command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the heater.
    Start,
    /// Stop the heater.
    Stop,
    /// Set the power level (1..=36).
    SetLevel(u16),
    /// Set the temperature setpoint (1..=36).
    SetTemperature(u16),
    /// Switch running mode.
    SetMode(RunningMode),
}

impl Command {
    /// Parse a payload addressed to `kind`.
    ///
    /// Start/stop ignore the payload. Level and temperature take a decimal
    /// number in 1..=36 (`"5"` and `"5.0"` are both accepted). Mode takes a
    /// mode name (`"Power Level"`, `"Temperature"`).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCommand`] if the payload is not valid for `kind`.
    pub fn parse(kind: CommandKind, payload: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim();
        let invalid = || Error::InvalidCommand {
            command: kind.name().to_string(),
            payload: text.to_string(),
        };

        match kind {
            CommandKind::Start => Ok(Self::Start),
            CommandKind::Stop => Ok(Self::Stop),
            CommandKind::Level => parse_argument(text)
                .map(Self::SetLevel)
                .ok_or_else(invalid),
            CommandKind::Temperature => parse_argument(text)
                .map(Self::SetTemperature)
                .ok_or_else(invalid),
            CommandKind::Mode => parse_mode(text).map(Self::SetMode).ok_or_else(invalid),
        }
    }

    /// The kind this command belongs to.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Start => CommandKind::Start,
            Self::Stop => CommandKind::Stop,
            Self::SetLevel(_) => CommandKind::Level,
            Self::SetTemperature(_) => CommandKind::Temperature,
            Self::SetMode(_) => CommandKind::Mode,
        }
    }

    /// Check if the command changes a setting (level, setpoint or mode).
    ///
    /// Start and stop are always allowed through, even during a lockout.
    pub fn is_setting(&self) -> bool {
        matches!(
            self,
            Self::SetLevel(_) | Self::SetTemperature(_) | Self::SetMode(_)
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::SetLevel(level) => write!(f, "level {}", level),
            Self::SetTemperature(temp) => write!(f, "temperature {}°C", temp),
            Self::SetMode(mode) => write!(f, "mode {}", mode.name()),
        }
    }
}

fn parse_argument(text: &str) -> Option<u16> {
    let value = match text.parse::<u16>() {
        Ok(v) => v,
        Err(_) => {
            let v = text.parse::<f64>().ok()?;
            if v.fract() != 0.0 || !(0.0..=u16::MAX as f64).contains(&v) {
                return None;
            }
            v as u16
        }
    };
    (1..=MAX_LEVEL_OR_TEMPERATURE)
        .contains(&value)
        .then_some(value)
}

fn parse_mode(text: &str) -> Option<RunningMode> {
    [RunningMode::Level, RunningMode::Temperature]
        .into_iter()
        .find(|mode| mode.name().eq_ignore_ascii_case(text))
}

/// Why a command was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No live link.
    Disconnected,
    /// Setting commands are locked out.
    OverheatLockout {
        /// Seconds until the lockout expires.
        remaining_secs: u64,
    },
    /// The transport stayed busy past the command lock timeout.
    Busy,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected - command ignored"),
            Self::OverheatLockout { remaining_secs } => {
                write!(f, "OVERHEAT LOCKOUT: {}s remaining", remaining_secs)
            }
            Self::Busy => write!(f, "BLE busy - command ignored"),
        }
    }
}

/// What the gate decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Send this command, possibly clamped.
    Forward {
        /// The command to send.
        command: Command,
        /// The requested value, if it was lowered to the cap.
        clamped_from: Option<u16>,
    },
    /// The heater already reports the requested value.
    Suppress {
        /// The value that is already set.
        value: u16,
    },
    /// Refuse the command.
    Reject(Rejection),
}

/// What happened to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Sent; carries the status the heater replied with, if any.
    Applied(Option<StatusSnapshot>),
    /// Not sent because the heater already reports the requested value.
    Suppressed {
        /// The value that is already set.
        value: u16,
    },
    /// Refused.
    Rejected(Rejection),
}

/// What the gate knows about the heater when a command arrives.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// The overheat guard.
    pub guard: &'a OverheatGuard,
    /// Last reported case temperature.
    pub case_temperature: i16,
    /// Last reported level.
    pub device_level: Option<u16>,
    /// Last reported setpoint (temperature mode only).
    pub device_setpoint: Option<u8>,
    /// Current time.
    pub now: Instant,
}

/// Admission rules for incoming commands.
#[derive(Debug, Clone, Copy)]
pub struct CommandGate {
    policy: LevelCapPolicy,
}

impl CommandGate {
    /// Create a gate enforcing `policy`.
    pub fn new(policy: LevelCapPolicy) -> Self {
        Self { policy }
    }

    /// The level cap policy.
    pub fn policy(&self) -> &LevelCapPolicy {
        &self.policy
    }

    /// Decide what to do with `command`.
    ///
    /// Setting commands are rejected until the overheat lockout expires.
    /// Level and setpoint values are clamped to the current cap, then
    /// dropped if the heater already reports that value.
    pub fn admit(&self, command: Command, ctx: &GateContext<'_>) -> Admission {
        if command.is_setting() && ctx.guard.is_locked(ctx.now) {
            return Admission::Reject(Rejection::OverheatLockout {
                remaining_secs: ctx.guard.remaining_secs(ctx.now),
            });
        }

        let (requested, current) = match command {
            Command::SetLevel(v) => (v, ctx.device_level),
            Command::SetTemperature(v) => (v, ctx.device_setpoint.map(u16::from)),
            _ => {
                return Admission::Forward {
                    command,
                    clamped_from: None,
                }
            }
        };

        let cap = self.policy.max_allowed(ctx.case_temperature);
        let value = requested.min(cap);
        if current == Some(value) {
            return Admission::Suppress { value };
        }

        let command = match command {
            Command::SetLevel(_) => Command::SetLevel(value),
            _ => Command::SetTemperature(value),
        };
        Admission::Forward {
            command,
            clamped_from: (value != requested).then_some(requested),
        }
    }
}
