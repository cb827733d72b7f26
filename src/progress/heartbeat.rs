// src/progress/heartbeat.rs

//! Low-frequency keep-alive broadcast.
//!
//! Long silent steps (a deploy can take minutes) would otherwise look like a
//! dead connection. One ticker task serves every observer; it starts with
//! the first connection and runs for the rest of the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use super::ProgressEvent;

const SPINNER: [char; 4] = ['/', '-', '\\', '|'];

pub struct Heartbeat {
    tx: broadcast::Sender<ProgressEvent>,
    interval: Duration,
    started: AtomicBool,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self {
            tx,
            interval,
            started: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Start the ticker unless it already runs. Returns `true` for the one
    /// call that started it.
    pub fn ensure_started(&self) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let tx = self.tx.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            info!(?interval, "heartbeat started");
            let mut pos = 0;
            loop {
                tokio::time::sleep(interval).await;
                // No subscribers right now is fine; the next observer picks
                // up from the following tick.
                if tx.send(ProgressEvent::KeepAlive { chr: SPINNER[pos] }).is_err() {
                    debug!("heartbeat tick with no observers attached");
                }
                pos = (pos + 1) % SPINNER.len();
            }
        });
        true
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("interval", &self.interval)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_only_once() {
        let heartbeat = Heartbeat::new(Duration::from_secs(60));
        assert!(heartbeat.ensure_started());
        assert!(!heartbeat.ensure_started());
        assert!(!heartbeat.ensure_started());
    }

    #[tokio::test]
    async fn ticks_cycle_through_the_spinner() {
        let heartbeat = Heartbeat::new(Duration::from_millis(5));
        let mut rx = heartbeat.subscribe();
        heartbeat.ensure_started();

        let mut seen = Vec::new();
        for _ in 0..5 {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Ok(ProgressEvent::KeepAlive { chr })) => seen.push(chr),
                other => panic!("expected a keep-alive, got {other:?}"),
            }
        }

        assert_eq!(seen, vec!['/', '-', '\\', '|', '/']);
    }
}
