use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::{sync::Mutex, time::Instant};

/// Suppresses repeated self-reports about the same recurring failure.
///
/// The first caller in a window wins; everyone else is turned away until the
/// window has elapsed. Uses tokio's clock so paused-time tests can advance it.
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    origin: Instant,
    // Milliseconds after `origin` at which the open window closes; 0 = none.
    reported_until_ms: AtomicU64,
    lock: Mutex<()>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            origin: Instant::now(),
            reported_until_ms: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn now_ms(&self) -> u64 {
        // +1 keeps "opened at origin" distinct from "never opened".
        self.origin.elapsed().as_millis() as u64 + 1
    }

    fn open_at(&self, now_ms: u64) -> bool {
        now_ms < self.reported_until_ms.load(Ordering::Acquire)
    }

    /// Returns `true` if the caller should emit a self-report now.
    pub async fn try_acquire(&self) -> bool {
        if self.open_at(self.now_ms()) {
            return false;
        }

        let _guard = self.lock.lock().await;
        // Re-check under the lock: another task may have just opened a window.
        let now = self.now_ms();
        if self.open_at(now) {
            return false;
        }
        self.reported_until_ms
            .store(now + self.window.as_millis() as u64, Ordering::Release);
        true
    }

    pub fn is_cooling(&self) -> bool {
        self.open_at(self.now_ms())
    }
}
