//! Periodic background refresh.
//!
//! A `Poller` runs a task every `period` on the tokio runtime until it is
//! stopped or dropped. The first tick fires one period after `start`; the
//! caller performs the initial load in the foreground.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Poller {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn start<F, Fut>(name: &'static str, period: Duration, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            // A slow refresh pushes the schedule back instead of bursting
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("Poller {} tick", name);
                        // Cancellation also abandons a refresh in progress
                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = task() => {}
                        }
                    }
                }
            }
            debug!("Poller {} stopped", name);
        });

        debug!("Poller {} started (every {:?})", name, period);
        Self { name, cancel, handle: Some(handle) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the background task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(period_ms: u64) -> (Poller, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let poller = Poller::start("test", Duration::from_millis(period_ms), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        (poller, count)
    }

    #[tokio::test]
    async fn test_first_tick_waits_one_period() {
        let (poller, count) = counting(200);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(poller.is_running());
        poller.shutdown().await;
    }

    #[tokio::test]
    async fn test_ticks_until_stopped() {
        let (poller, count) = counting(10);
        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.stop();
        assert!(!poller.is_running());
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {}", seen);

        poller.shutdown().await;
        let after = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn test_drop_stops_polling() {
        let (poller, count) = counting(10);
        tokio::time::sleep(Duration::from_millis(40)).await;
        drop(poller);
        // Let the task observe cancellation
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }
}
