//! Command frame construction.
//!
//! Every host-to-heater message is a fixed 8-byte frame:
//!
//! `[0xAA, tag, key_hi, key_lo, opcode, arg_lo, arg_hi, checksum]`
//!
//! The checksum is the byte sum of `key_hi..=arg_hi` modulo 256. It is always
//! computed here, never taken from a caller.

use rand::Rng;

/// First byte of every frame in both directions.
pub const FRAME_START: u8 = 0xAA;

/// Length of a command frame in bytes.
pub const COMMAND_FRAME_LEN: usize = 8;

/// Second byte of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SequenceTag {
    /// Operational command keyed with the device passkey (85).
    Normal = 0x55,
    /// Pairing handshake keyed with a random pair (136).
    Handshake = 0x88,
}

impl SequenceTag {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0x55 => Some(Self::Normal),
            0x88 => Some(Self::Handshake),
            _ => None,
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

/// Heater opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Request a status notification (argument 0).
    GetStatus = 1,
    /// Select running mode (argument 1 = level, 2 = temperature).
    SetMode = 2,
    /// Start (argument 1) or stop (argument 0) the heater.
    StartStop = 3,
    /// Set level or temperature setpoint (argument = value).
    SetLevelOrTemperature = 4,
}

impl Opcode {
    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

/// Split a decimal passkey into the two key bytes (`passkey / 100`, `passkey % 100`).
pub fn passkey_bytes(passkey: u16) -> [u8; 2] {
    [((passkey / 100) % 256) as u8, (passkey % 100) as u8]
}

/// Byte sum of `frame[2..=6]` modulo 256.
pub fn checksum(frame: &[u8]) -> u8 {
    frame[2..7].iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Check that a command frame is well formed and its checksum matches.
pub fn verify_checksum(frame: &[u8]) -> bool {
    frame.len() == COMMAND_FRAME_LEN && frame[0] == FRAME_START && frame[7] == checksum(frame)
}

/// An encoded command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame([u8; COMMAND_FRAME_LEN]);

impl CommandFrame {
    /// Encode a frame from raw parts.
    ///
    /// `opcode` is taken modulo 256 and `argument` modulo 65536, matching
    /// what the heater does with oversized values. Encoding cannot fail.
    pub fn encode(opcode: u16, argument: u32, tag: SequenceTag, key: [u8; 2]) -> Self {
        let [arg_lo, arg_hi] = ((argument % 65536) as u16).to_le_bytes();
        let mut bytes = [
            FRAME_START,
            tag.to_raw(),
            key[0],
            key[1],
            (opcode % 256) as u8,
            arg_lo,
            arg_hi,
            0,
        ];
        bytes[7] = checksum(&bytes);
        Self(bytes)
    }

    /// Encode an operational command keyed with the device passkey.
    pub fn command(opcode: Opcode, argument: u16, passkey: u16) -> Self {
        Self::encode(
            opcode.to_raw() as u16,
            argument as u32,
            SequenceTag::Normal,
            passkey_bytes(passkey),
        )
    }

    /// Encode a handshake frame keyed with a random pair.
    ///
    /// Reserved: no link operation sends this today.
    pub fn handshake(opcode: Opcode, argument: u16) -> Self {
        let key: [u8; 2] = rand::thread_rng().gen();
        Self::encode(
            opcode.to_raw() as u16,
            argument as u32,
            SequenceTag::Handshake,
            key,
        )
    }

    /// The raw frame bytes.
    pub fn as_bytes(&self) -> &[u8; COMMAND_FRAME_LEN] {
        &self.0
    }

    /// The sequence tag byte.
    pub fn tag(&self) -> Option<SequenceTag> {
        SequenceTag::from_raw(self.0[1])
    }

    /// The key pair.
    pub fn key(&self) -> [u8; 2] {
        [self.0[2], self.0[3]]
    }

    /// The opcode byte.
    pub fn opcode(&self) -> u8 {
        self.0[4]
    }

    /// The 16-bit little-endian argument.
    pub fn argument(&self) -> u16 {
        u16::from_le_bytes([self.0[5], self.0[6]])
    }

    /// The checksum byte.
    pub fn checksum(&self) -> u8 {
        self.0[7]
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
