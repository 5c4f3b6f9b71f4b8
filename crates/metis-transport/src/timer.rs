//! Cancellable timers (spec.md §5, "Timers are cancellable by id"), used
//! for accept/connect timeouts per listener. The PIT's own expiry is
//! driven separately by a plain recurring tick (§4.3 already maintains its
//! own expiry index); this wheel is for the transport layer's
//! connection-lifecycle timeouts.

use std::time::Duration;

use tokio_util::time::delay_queue::Key as DelayKey;
use tokio_util::time::DelayQueue;

/// A `DelayQueue` wrapper whose `cancel` is a no-op on an already-fired or
/// already-cancelled key, matching "timers are cancellable by id" without
/// requiring callers to track whether a given timer already fired.
pub struct TimerWheel<T> {
    queue: DelayQueue<T>,
}

impl<T> TimerWheel<T> {
    pub fn new() -> Self {
        Self { queue: DelayQueue::new() }
    }

    pub fn schedule(&mut self, item: T, after: Duration) -> DelayKey {
        self.queue.insert(item, after)
    }

    pub fn cancel(&mut self, key: DelayKey) {
        let _ = self.queue.try_remove(&key);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Resolves once the next scheduled item fires; pending forever (never
    /// resolving) when the wheel is empty, so callers select! it alongside
    /// other readiness sources rather than polling it unconditionally.
    pub async fn next(&mut self) -> Option<T> {
        if self.queue.is_empty() {
            std::future::pending::<()>().await;
        }
        std::future::poll_fn(|cx| self.queue.poll_expired(cx)).await.map(|expired| expired.into_inner())
    }
}

impl<T> Default for TimerWheel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scheduled_item_fires_after_its_delay() {
        let mut wheel = TimerWheel::new();
        wheel.schedule("hello", Duration::from_millis(5));
        assert_eq!(wheel.next().await, Some("hello"));
    }

    #[tokio::test]
    async fn cancelled_item_never_fires() {
        let mut wheel = TimerWheel::new();
        let key = wheel.schedule("hello", Duration::from_millis(5));
        wheel.cancel(key);
        wheel.schedule("world", Duration::from_millis(10));
        assert_eq!(wheel.next().await, Some("world"));
    }
}
