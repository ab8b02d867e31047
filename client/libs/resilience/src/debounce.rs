/// Debounce for bursty callers such as search-as-you-type
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Runs only the most recent of a burst of calls.
///
/// Every call waits `delay`; if another call arrived meanwhile, the earlier
/// one is dropped. A call whose work finishes after a newer call started is
/// also discarded, so callers never observe stale results.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Invalidate any pending call without scheduling a new one
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Wait out the debounce window, then run `f` if this is still the latest call
    pub async fn call<F, Fut, T>(&self, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(self.delay).await;
        if !self.is_current(ticket) {
            trace!(ticket, "Debounced call superseded before running");
            return None;
        }

        let output = f().await;
        if !self.is_current(ticket) {
            trace!(ticket, "Debounced call superseded while running");
            return None;
        }

        Some(output)
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn test_single_call_runs_after_delay() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let start = tokio::time::Instant::now();

        let result = debouncer.call(|| async { 7 }).await;

        assert_eq!(result, Some(7));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_call_wins() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let runs = Arc::new(AtomicU32::new(0));

        let first = {
            let debouncer = debouncer.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                debouncer
                    .call(|| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        "ad"
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;

        let runs_second = runs.clone();
        let second = debouncer
            .call(|| async move {
                runs_second.fetch_add(1, Ordering::SeqCst);
                "ada"
            })
            .await;

        assert_eq!(first.await.unwrap(), None);
        assert_eq!(second, Some("ada"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_discarded() {
        let debouncer = Debouncer::new(Duration::from_millis(10));

        let slow = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move {
                debouncer
                    .call(|| async {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        "stale"
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        let fresh = debouncer.call(|| async { "fresh" }).await;

        assert_eq!(fresh, Some("fresh"));
        assert_eq!(slow.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_call() {
        let debouncer = Debouncer::new(Duration::from_millis(50));

        let pending = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move { debouncer.call(|| async { 1 }).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        debouncer.cancel();

        assert_eq!(pending.await.unwrap(), None);
    }
}
