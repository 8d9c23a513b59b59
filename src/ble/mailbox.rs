//! Single-slot notification handoff.
//!
//! The heater answers every command with exactly one notification. The
//! notification listener task pushes frames through a [`MailboxSender`]; the
//! link that issued the command waits on the [`Mailbox`]. The slot holds at
//! most one frame, and waiting needs `&mut Mailbox`, so only one exchange can
//! be in flight per link.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::error::{Error, Result};

/// Create a connected sender/receiver pair.
pub fn mailbox() -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::channel(1);
    (MailboxSender { tx }, Mailbox { rx })
}

/// Producer half, owned by the notification listener.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Bytes>,
}

impl MailboxSender {
    /// Deliver a frame. Returns `false` if the slot was occupied or the link is gone.
    pub fn offer(&self, frame: Bytes) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                trace!("Mailbox occupied, dropping {} byte frame", frame.len());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Check if the receiving link has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the link.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Bytes>,
}

impl Mailbox {
    /// Discard any stale frame. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` is a soft miss. A closed channel means the listener ended
    /// with the link and is reported as [`Error::LinkDisconnected`].
    pub async fn wait(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => Err(Error::LinkDisconnected {
                reason: "notification stream closed".to_string(),
            }),
            Err(_) => Ok(None),
        }
    }
}
