//! Heater status parsing.
//!
//! Parses the status notifications the heater sends after every command.

use tracing::trace;

use crate::error::DecodeError;
use crate::protocol::frame::FRAME_START;
use crate::utils::{le_i16, le_u16};

/// Fault descriptions for the standard (`AA 55`) layout, indexed by error code.
const STANDARD_ERRORS: [Option<&str>; 11] = [
    Some("No fault"),
    Some("Startup failure"),
    Some("Lack of fuel"),
    Some("Supply voltage overrun"),
    Some("Outlet sensor fault"),
    Some("Inlet sensor fault"),
    Some("Pulse pump fault"),
    Some("Fan fault"),
    Some("Ignition unit fault"),
    Some("Overheating"),
    Some("Overheat sensor fault"),
];

/// Fault descriptions for the alternate (`AA 66`) layout. Slots 2 and 7 are unassigned.
const ALTERNATE_ERRORS: [Option<&str>; 11] = [
    Some("No fault"),
    Some("Supply voltage overrun"),
    None,
    Some("Ignition unit fault"),
    Some("Pulse pump fault"),
    Some("Overheating"),
    Some("Fan fault"),
    None,
    Some("Lack of fuel"),
    Some("Overheat sensor fault"),
    Some("Startup failure"),
];

/// Which header family a status frame uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeaderVariant {
    /// `AA 55`: error code at byte 4.
    Standard,
    /// `AA 66`: error code at byte 17, alternate fault table.
    Alternate,
}

impl HeaderVariant {
    /// Second header byte of the standard layout.
    pub const STANDARD_MARKER: u8 = 0x55;
    /// Second header byte of the alternate layout.
    pub const ALTERNATE_MARKER: u8 = 0x66;
    /// Second header byte of the extended layout, which is not supported.
    pub const EXTENDED_MARKER: u8 = 0x88;

    /// Select a variant from the two header bytes.
    pub fn from_header(header: [u8; 2]) -> Result<Self, DecodeError> {
        match header {
            [FRAME_START, Self::STANDARD_MARKER] => Ok(Self::Standard),
            [FRAME_START, Self::ALTERNATE_MARKER] => Ok(Self::Alternate),
            _ => Err(DecodeError::UnrecognizedPayload { header }),
        }
    }

    /// The fixed layout for this variant.
    pub fn layout(&self) -> &'static FrameLayout {
        match self {
            Self::Standard => &STANDARD_LAYOUT,
            Self::Alternate => &ALTERNATE_LAYOUT,
        }
    }
}

/// Where the two supported layouts differ.
#[derive(Debug)]
pub struct FrameLayout {
    /// Byte offset of the error code.
    pub error_offset: usize,
    /// Error code to description table.
    pub error_table: &'static [Option<&'static str>; 11],
    /// Error code meaning the heater tripped its own overheat protection.
    pub overheat_code: u8,
    /// Minimum frame length covering every field.
    pub min_len: usize,
}

static STANDARD_LAYOUT: FrameLayout = FrameLayout {
    error_offset: 4,
    error_table: &STANDARD_ERRORS,
    overheat_code: 9,
    min_len: 17,
};

static ALTERNATE_LAYOUT: FrameLayout = FrameLayout {
    error_offset: 17,
    error_table: &ALTERNATE_ERRORS,
    overheat_code: 5,
    min_len: 18,
};

/// Heater running mode (byte 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RunningMode {
    /// Level mode as reported by older controllers; level in byte 10 (+1).
    LevelBasic = 0,
    /// Power level mode; level in byte 9.
    Level = 1,
    /// Thermostat mode; setpoint in byte 9, level in byte 10 (+1).
    Temperature = 2,
}

impl RunningMode {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::LevelBasic),
            1 => Ok(Self::Level),
            2 => Ok(Self::Temperature),
            mode => Err(DecodeError::UnrecognizedRunningMode { mode }),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Name used on the command/telemetry surface.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LevelBasic | Self::Level => "Power Level",
            Self::Temperature => "Temperature",
        }
    }
}

/// Detailed step while the heater is running (byte 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RunningStep {
    /// Heater idle.
    Standby = 0,
    /// Self-test before ignition.
    SelfTest = 1,
    /// Glow plug ignition.
    Ignition = 2,
    /// Stable combustion.
    Running = 3,
    /// Shutdown cooling.
    Cooldown = 4,
}

impl RunningStep {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Standby),
            1 => Ok(Self::SelfTest),
            2 => Ok(Self::Ignition),
            3 => Ok(Self::Running),
            4 => Ok(Self::Cooldown),
            step => Err(DecodeError::UnrecognizedRunningStep { step }),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Human-readable step name.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Standby => "Standby",
            Self::SelfTest => "Self-test",
            Self::Ignition => "Ignition",
            Self::Running => "Running",
            Self::Cooldown => "Cooldown",
        }
    }
}

impl std::fmt::Display for RunningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Decoded status notification.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusSnapshot {
    /// Header family the frame arrived with.
    pub variant: HeaderVariant,
    /// Whether the heater is running at all (byte 3).
    pub running_state: u8,
    /// Raw fault code.
    pub error_code: u8,
    /// Detailed running step.
    pub running_step: RunningStep,
    /// Altitude in meters.
    pub altitude: u16,
    /// Running mode.
    pub running_mode: RunningMode,
    /// Power level (tracked in every mode).
    pub set_level: u16,
    /// Temperature setpoint in °C, only in temperature mode.
    pub set_temperature: Option<u8>,
    /// Supply voltage in volts.
    pub supply_voltage: f32,
    /// Heater case temperature in °C.
    pub case_temperature: i16,
    /// Cabin temperature in °C.
    pub cab_temperature: i16,
}

impl StatusSnapshot {
    /// Decode a status notification.
    ///
    /// Layout (0-indexed), shared by the standard and alternate variants:
    /// - Bytes 0-1: Header (`AA 55` or `AA 66`)
    /// - Byte 3: Running state
    /// - Byte 4 (standard) / 17 (alternate): Error code
    /// - Byte 5: Running step
    /// - Bytes 6-7: Altitude (LE16)
    /// - Byte 8: Running mode
    /// - Bytes 9-10: Level / setpoint, depending on mode
    /// - Bytes 11-12: Supply voltage (LE16, tenths of a volt)
    /// - Bytes 13-14: Case temperature (LE16, signed)
    /// - Bytes 15-16: Cabin temperature (LE16, signed)
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        trace!("Decoding status frame ({} bytes): {:02X?}", data.len(), data);

        if data.len() < 2 {
            return Err(DecodeError::Truncated {
                len: data.len(),
                needed: 2,
            });
        }

        let variant = HeaderVariant::from_header([data[0], data[1]])?;
        let layout = variant.layout();

        if data.len() < layout.min_len {
            return Err(DecodeError::Truncated {
                len: data.len(),
                needed: layout.min_len,
            });
        }

        let running_mode = RunningMode::from_raw(data[8])?;
        let (set_level, set_temperature) = match running_mode {
            RunningMode::LevelBasic => (data[10] as u16 + 1, None),
            RunningMode::Level => (data[9] as u16, None),
            RunningMode::Temperature => (data[10] as u16 + 1, Some(data[9])),
        };

        Ok(Self {
            variant,
            running_state: data[3],
            error_code: data[layout.error_offset],
            running_step: RunningStep::from_raw(data[5])?,
            altitude: le_u16(data, 6),
            running_mode,
            set_level,
            set_temperature,
            supply_voltage: le_u16(data, 11) as f32 / 10.0,
            case_temperature: le_i16(data, 13),
            cab_temperature: le_i16(data, 15),
        })
    }

    /// Description of the fault code, if the table in use defines it.
    pub fn error_message(&self) -> Option<&'static str> {
        self.variant
            .layout()
            .error_table
            .get(self.error_code as usize)
            .copied()
            .flatten()
    }

    /// Description of the running step.
    pub fn running_step_message(&self) -> &'static str {
        self.running_step.message()
    }

    /// Check if a fault is reported.
    pub fn has_error(&self) -> bool {
        self.error_code != 0
    }

    /// Check if the heater reports its own overheat fault.
    pub fn reports_overheat(&self) -> bool {
        self.error_code == self.variant.layout().overheat_code
    }
}
