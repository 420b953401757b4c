use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::watch;

use crate::error::Result;

/// Cloneable stop token shared by the interrupt handler, the render loop and
/// the HTTP server.
///
/// Async waiters watch `tx`. Blocking sleepers park on `woken`, a channel
/// nobody ever sends on; triggering drops its only sender, which disconnects
/// every receiver at once.
#[derive(Clone, Debug)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    wake: Arc<Mutex<Option<Sender<()>>>>,
    woken: Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        let (wake, woken) = crossbeam_channel::bounded(0);
        Self {
            tx: Arc::new(tx),
            wake: Arc::new(Mutex::new(Some(wake))),
            woken,
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
        self.wake.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleeps for `duration`, returning early when triggered. Returns `false`
    /// if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        matches!(self.woken.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }

    /// Routes Ctrl-C to this token. Can only be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log::info!("Interrupt received, stopping playback");
            token.trigger();
        })
        .map_err(std::io::Error::other)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn clones_share_state() {
        let a = Shutdown::new();
        let b = a.clone();
        assert!(!b.is_triggered());
        a.trigger();
        assert!(b.is_triggered());
    }

    #[test]
    fn sleep_returns_early_when_triggered() {
        let token = Shutdown::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.trigger();
        });
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn sleep_wakes_promptly_on_trigger() {
        let token = Shutdown::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let triggered_at = Instant::now();
            remote.trigger();
            triggered_at
        });
        assert!(!token.sleep(Duration::from_secs(10)));
        let woke_at = Instant::now();
        let triggered_at = handle.join().unwrap();
        assert!(woke_at.saturating_duration_since(triggered_at) < Duration::from_millis(100));
    }

    #[test]
    fn sleep_after_trigger_returns_immediately() {
        let token = Shutdown::new();
        token.trigger();
        token.trigger();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(!token.sleep(Duration::ZERO));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_completes_when_untouched() {
        assert!(Shutdown::new().sleep(Duration::from_millis(5)));
    }

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let token = Shutdown::new();
        let remote = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.trigger();
        });
        tokio::time::timeout(Duration::from_secs(5), token.wait())
            .await
            .expect("wait did not resolve");
    }

    #[tokio::test]
    async fn wait_resolves_immediately_if_already_triggered() {
        let token = Shutdown::new();
        token.trigger();
        tokio::time::timeout(Duration::from_secs(1), token.wait()).await.unwrap();
    }
}
