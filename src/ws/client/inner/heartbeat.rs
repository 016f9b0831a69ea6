use std::time::Duration;

use tokio::time::Instant;

/// Ping timer of a connected session.
///
/// A pong is never required, liveness is left to the transport.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    next: Option<Instant>,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    /// first ping fires one interval later, no-op if already running
    pub fn start(&mut self) {
        if self.next.is_none() {
            let next = Instant::now() + self.interval;
            log::trace!("Heartbeat start, first ping at {:?}", next);
            self.next = Some(next);
        }
    }

    pub fn stop(&mut self) {
        if self.next.take().is_some() {
            log::trace!("Heartbeat stop");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    /// Resolves when a ping is due, never resolves when stopped.
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) {
        match self.next {
            Some(next) => {
                tokio::time::sleep_until(next).await;
                self.next = Some(Instant::now() + self.interval);
            }
            None => futures_util::future::pending().await,
        }
    }
}
