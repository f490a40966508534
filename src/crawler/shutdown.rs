//! Cooperative cancellation
//!
//! The binary feeds Ctrl+C / SIGTERM into a [`ShutdownHandle`]; the crawl core
//! observes the matching [`ShutdownSignal`] between page attempts and while
//! sleeping.

use std::time::Duration;
use tokio::sync::watch;

/// Creates a connected handle/signal pair
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// Sending side; triggering it is permanent
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        // send_replace succeeds even when every receiver is gone
        self.tx.send_replace(true);
    }
}

/// Receiving side, cheap to clone into each component
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // An error means the handle was dropped without triggering
        if rx.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps for `duration` unless shutdown is requested first
    ///
    /// Returns true if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_trigger() {
        let (_handle, signal) = shutdown_channel();
        assert!(signal.sleep(Duration::from_secs(600)).await);
        assert!(!signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_interrupts_sleep() {
        let (handle, signal) = shutdown_channel();
        let sleeper = signal.clone();

        let task = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(600)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.trigger();

        assert!(!task.await.unwrap());
        assert!(signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_never_triggers() {
        let (handle, signal) = shutdown_channel();
        drop(handle);
        assert!(signal.sleep(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal() {
        let signal = ShutdownSignal::never();
        assert!(signal.sleep(Duration::from_secs(5)).await);
        assert!(!signal.is_triggered());
    }
}
