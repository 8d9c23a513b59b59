//! BLE connection management.
//!
//! Handles establishing a session with the heater within a deadline.

use async_trait::async_trait;
use btleplug::api::{Central, Peripheral as _};
use btleplug::platform::Adapter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::characteristics::BleTransport;
use crate::ble::scanner::{find_peripheral, first_adapter};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::link::{Connector, HeaterLink};

/// Connection state of the heater link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No link.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Link established.
    Connected,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Produces [`HeaterLink`]s over btleplug.
pub struct BleConnector {
    config: Arc<SupervisorConfig>,
    /// Cached adapter, dropped on reset.
    adapter: tokio::sync::Mutex<Option<Adapter>>,
}

impl BleConnector {
    /// Create a connector for the heater named in `config`.
    pub fn new(config: Arc<SupervisorConfig>) -> Self {
        Self {
            config,
            adapter: tokio::sync::Mutex::new(None),
        }
    }

    async fn adapter(&self) -> Result<Adapter> {
        let mut cached = self.adapter.lock().await;
        if let Some(adapter) = cached.as_ref() {
            return Ok(adapter.clone());
        }
        let adapter = first_adapter().await?;
        *cached = Some(adapter.clone());
        Ok(adapter)
    }

    /// Connect to `address`, retrying every `retry_delay` until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectTimeout`] when the deadline passes, or a fatal
    /// [`Error::ServiceNotFound`]/[`Error::CharacteristicNotFound`] when the
    /// peripheral is not a heater.
    pub async fn connect_with(
        &self,
        address: &str,
        timeout: Duration,
        retry_delay: Duration,
    ) -> Result<HeaterLink<BleTransport>> {
        let adapter = self.adapter().await?;
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;

        let peripheral = loop {
            attempts += 1;
            debug!("Connection attempt {} to {}", attempts, address);

            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt = match find_peripheral(&adapter, address, remaining).await {
                Ok(Some(peripheral)) => peripheral
                    .connect()
                    .await
                    .map(|_| peripheral)
                    .map_err(Error::Bluetooth),
                Ok(None) => Err(Error::LinkDisconnected {
                    reason: format!("{} not seen while scanning", address),
                }),
                Err(e) => Err(e),
            };

            match attempt {
                Ok(peripheral) => break peripheral,
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempts, e);
                    if Instant::now() >= deadline {
                        return Err(Error::ConnectTimeout {
                            address: address.to_string(),
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(retry_delay).await;
                }
            }
        };

        info!("Connected to {} after {} attempt(s)", address, attempts);

        let (transport, mailbox) = BleTransport::open(peripheral).await?;
        Ok(HeaterLink::new(
            transport,
            mailbox,
            self.config.passkey,
            self.config.response_timeout,
        ))
    }
}

#[async_trait]
impl Connector for BleConnector {
    type Link = HeaterLink<BleTransport>;

    async fn connect(&self) -> Result<Self::Link> {
        self.connect_with(
            &self.config.ble_address,
            self.config.connect_timeout,
            self.config.connect_retry_delay,
        )
        .await
    }

    /// Drop the cached adapter so the next connect starts from a fresh manager.
    async fn reset_adapter(&self) -> Result<()> {
        if let Some(adapter) = self.adapter.lock().await.take() {
            if let Err(e) = adapter.stop_scan().await {
                debug!("Failed to stop scan during reset: {}", e);
            }
        }
        info!("Bluetooth adapter reset");
        Ok(())
    }
}
