// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # vevor-ble-bridge
//!
//! A supervised Bluetooth Low Energy bridge for Vevor-style diesel heaters.
//!
//! The heater speaks a small request/response protocol over a single GATT
//! characteristic: every 8-byte command is answered by one status
//! notification. This crate keeps one link to the heater alive, polls it,
//! and forwards decoded status to a telemetry sink of your choosing.
//!
//! ## Features
//!
//! - **Frame codec**: Command frame encoding and status notification decoding
//!   for both header variants
//! - **Self-healing link**: Soft timeouts, consecutive-miss detection, a
//!   watchdog and escalating reconnect backoff
//! - **Temperature limiting**: Stepwise level cap as the case temperature
//!   approaches the critical threshold
//! - **Overheat lockout**: Forces the lowest level and rejects setting
//!   commands, extended while the temperature keeps rising
//! - **Serialized access**: Commands and polls never overlap on the link
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vevor_ble_bridge::{
//!     BleConnector, Result, Supervisor, SupervisorConfig, TelemetryPublisher, TopicRole,
//! };
//!
//! struct Stdout;
//!
//! #[async_trait::async_trait]
//! impl TelemetryPublisher for Stdout {
//!     async fn publish(&self, role: TopicRole, value: String) -> Result<()> {
//!         println!("{}: {}", role, value);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(SupervisorConfig::new("AA:BB:CC:DD:EE:FF"));
//!     let connector = BleConnector::new(config.clone());
//!     let supervisor = Supervisor::new(config, connector, Stdout);
//!
//!     supervisor
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### macOS
//! Requires Bluetooth permission. Peripheral addresses are not exposed on
//! macOS, so address matching relies on what CoreBluetooth reports.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration, status
//!   and state types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod link;
pub mod protocol;
pub mod supervisor;
pub mod telemetry;
pub mod utils;

// Re-exports for convenience
pub use ble::connection::{BleConnector, ConnectionState};
pub use config::SupervisorConfig;
pub use error::{DecodeError, Error, Result};
pub use link::{Connector, FrameTransport, HeaterControl, HeaterLink, MAX_LEVEL_OR_TEMPERATURE};
pub use protocol::{CommandFrame, HeaderVariant, Opcode, RunningMode, RunningStep, StatusSnapshot};
pub use supervisor::{
    Command, CommandKind, CommandOutcome, LevelCapPolicy, OverheatGuard, Rejection, Supervisor,
    SupervisorState, SupervisorStatus,
};
pub use telemetry::{TelemetryPublisher, TopicRole};
