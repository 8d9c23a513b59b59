//! BLE communication module.
//!
//! This module provides the btleplug-backed session with the heater:
//! locating the peripheral, connecting within a deadline, and moving frames
//! over the single vendor characteristic.

pub mod characteristics;
pub mod connection;
pub mod mailbox;
pub mod scanner;
pub mod uuids;

pub use characteristics::BleTransport;
pub use connection::{BleConnector, ConnectionState};
pub use mailbox::{mailbox, Mailbox, MailboxSender};
pub use uuids::*;
