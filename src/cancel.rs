//! Write-once broadcast shutdown signal.
//!
//! The signal is a zero-capacity channel on which nothing is ever sent.
//! Closing it means dropping the only sender, after which every receiver
//! is permanently ready with a disconnection. That readiness is what lets
//! stages put cancellation into the same `select!` as their data channels.

use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError};

/// Create a linked close-once handle and observe-only token
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = bounded(0);
    (CancelHandle { _tx: tx }, CancelToken { rx })
}

/// The single capability that can close the signal.
///
/// Not `Clone`: whoever owns it is the only shutdown origin. Dropping the
/// handle closes the signal as well.
#[derive(Debug)]
pub struct CancelHandle {
    _tx: Sender<()>,
}

impl CancelHandle {
    /// Close the signal for every token
    pub fn cancel(self) {
        drop(self);
    }
}

/// Observe-only view of the signal, freely cloned into stages
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// Check without blocking whether the signal has been closed
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block until the signal is closed
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Receiver that becomes ready once the signal is closed, for use in `select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
