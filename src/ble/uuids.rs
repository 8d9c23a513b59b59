//! BLE Service and Characteristic UUIDs.
//!
//! The heater exposes one vendor service with a single characteristic used
//! for both directions: commands are written to it and status frames arrive
//! as notifications on it.

use uuid::Uuid;

/// Heater vendor service UUID.
pub const HEATER_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_ffe0_0000_1000_8000_00805f9b34fb);
/// Heater command/status characteristic UUID (Write, Notify).
pub const HEATER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe1_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID is the heater vendor service.
pub fn is_heater_service(uuid: &Uuid) -> bool {
    *uuid == HEATER_SERVICE_UUID
}
