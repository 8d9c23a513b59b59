//! Utility functions for the vevor-ble-bridge crate.

/// Read an unsigned little-endian 16-bit word at `offset`.
///
/// # Panics
///
/// Panics if `offset + 1` is out of bounds; callers check the frame length first.
#[inline]
pub fn le_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Read a two's-complement little-endian 16-bit word at `offset`.
///
/// Words of 32768 and above come out negative.
///
/// # Example
///
/// ```
/// use vevor_ble_bridge::utils::le_i16;
///
/// assert_eq!(le_i16(&[0xFF, 0xFF], 0), -1);
/// assert_eq!(le_i16(&[0x00, 0x80], 0), -32768);
/// ```
#[inline]
pub fn le_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Interpret an on/off setting such as an environment variable.
///
/// `true`, `1` and `yes` (any case) switch it on; anything else is off.
///
/// ```
/// use vevor_ble_bridge::utils::parse_flag;
///
/// assert!(parse_flag("Yes"));
/// assert!(!parse_flag("off"));
/// ```
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
