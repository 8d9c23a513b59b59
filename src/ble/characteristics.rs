//! GATT characteristic handling.
//!
//! Resolves the heater characteristic on a connected peripheral, writes
//! command frames to it and forwards its notifications into the link's
//! mailbox.

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, Service, WriteType};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::future::Future;
use tracing::{debug, error, trace, warn};

use crate::ble::mailbox::{mailbox, Mailbox, MailboxSender};
use crate::ble::uuids::*;
use crate::error::{Error, Result};
use crate::link::FrameTransport;

/// Find the heater characteristic among discovered services.
///
/// A missing service or characteristic means this is not a heater, which is
/// reported as a fatal error rather than a transient one.
pub fn find_heater_characteristic(services: &BTreeSet<Service>) -> Result<Characteristic> {
    let service = services
        .iter()
        .find(|s| is_heater_service(&s.uuid))
        .ok_or_else(|| Error::ServiceNotFound {
            uuid: HEATER_SERVICE_UUID.to_string(),
        })?;

    service
        .characteristics
        .iter()
        .find(|c| c.uuid == HEATER_CHARACTERISTIC_UUID)
        .cloned()
        .ok_or_else(|| {
            for c in &service.characteristics {
                debug!("  Available characteristic: {}", c.uuid);
            }
            Error::CharacteristicNotFound {
                uuid: HEATER_CHARACTERISTIC_UUID.to_string(),
            }
        })
}

/// Await `setup`; if it fails, await `teardown` before returning the error.
async fn setup_or_teardown<T, S, D>(setup: S, teardown: D) -> Result<T>
where
    S: Future<Output = Result<T>>,
    D: Future<Output = ()>,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            if e.is_fatal() {
                error!("Peripheral is not a supported heater: {}", e);
            } else {
                warn!("Session setup failed, disconnecting: {}", e);
            }
            teardown.await;
            Err(e)
        }
    }
}

/// The heater characteristic on a connected peripheral.
pub struct BleTransport {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// The resolved heater characteristic.
    characteristic: Characteristic,
    /// Handle to the notification listener task.
    listener_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BleTransport {
    /// Resolve the characteristic, subscribe to it and start forwarding notifications.
    ///
    /// On any failure the peripheral is disconnected before returning, so no
    /// half-open session keeps holding the heater.
    pub async fn open(peripheral: Peripheral) -> Result<(Self, Mailbox)> {
        let teardown = async {
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnect after failed setup failed: {}", e);
            }
        };
        let (characteristic, handle, rx) =
            setup_or_teardown(Self::prepare(&peripheral), teardown).await?;

        Ok((
            Self {
                peripheral,
                characteristic,
                listener_handle: Mutex::new(Some(handle)),
            },
            rx,
        ))
    }

    async fn prepare(
        peripheral: &Peripheral,
    ) -> Result<(Characteristic, tokio::task::JoinHandle<()>, Mailbox)> {
        peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let characteristic = find_heater_characteristic(&peripheral.services())?;
        debug!(
            "Found characteristic {}, properties: {:?}",
            characteristic.uuid, characteristic.properties
        );

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        let (tx, rx) = mailbox();
        let handle = Self::spawn_listener(peripheral, tx).await?;
        Ok((characteristic, handle, rx))
    }

    /// Forward heater notifications into the mailbox until the stream ends.
    ///
    /// The sender is dropped with the task, which the waiting link sees as a disconnect.
    async fn spawn_listener(
        peripheral: &Peripheral,
        tx: MailboxSender,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let mut notifications = peripheral.notifications().await.map_err(Error::Bluetooth)?;

        Ok(tokio::spawn(async move {
            debug!("Notification listener started");

            while let Some(notification) = notifications.next().await {
                if notification.uuid != HEATER_CHARACTERISTIC_UUID {
                    trace!("Ignoring notification from {}", notification.uuid);
                    continue;
                }
                trace!(
                    "Notification: {} bytes, data: {:02X?}",
                    notification.value.len(),
                    notification.value
                );
                tx.offer(Bytes::from(notification.value));

                if tx.is_closed() {
                    break;
                }
            }

            debug!("Notification listener stopped");
        }))
    }

    fn stop_listener(&self) {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl FrameTransport for BleTransport {
    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, frame, WriteType::WithResponse)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to characteristic {}", frame.len(), self.characteristic.uuid);

        Ok(())
    }

    async fn close(&self) {
        self.stop_listener();

        if let Err(e) = self.peripheral.unsubscribe(&self.characteristic).await {
            debug!("Unsubscribe failed (link may already be gone): {}", e);
        }
        if let Err(e) = self.peripheral.disconnect().await {
            debug!("Disconnect failed (link may already be gone): {}", e);
        }
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.stop_listener();
    }
}
