//! Sliding-window request limiter
//!
//! Caps the number of outbound requests inside a trailing time window. Unlike a
//! token bucket this never allows a burst above `max_requests` within any window of
//! `window` length, which is what keeps the traffic looking like light browsing.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window limiter owned by a single sync run
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Maximum permitted requests inside any trailing window
    max_requests: usize,

    /// Length of the trailing window
    window: Duration,

    /// Extra wait added on top of the computed expiry of the oldest entry
    margin: Duration,

    /// Timestamps of recent permitted requests, oldest first
    requests: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter allowing `max_requests` per `window`
    pub fn new(max_requests: usize, window: Duration, margin: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            margin,
            requests: Mutex::new(VecDeque::with_capacity(max_requests.max(1))),
        }
    }

    /// Wait until one more request fits in the window, then record it
    ///
    /// Returns the instant recorded for the permitted request. The lock is released
    /// before sleeping and every waiter re-checks the window after waking, so several
    /// queued callers can never act on the same stale decision.
    pub async fn acquire(&self) -> Instant {
        loop {
            let wait = {
                let mut requests = self.lock();
                let now = Instant::now();
                Self::prune(&mut requests, now, self.window);

                if requests.len() < self.max_requests {
                    requests.push_back(now);
                    return now;
                }

                // Non-empty: len >= max_requests >= 1
                let oldest = requests.front().copied().unwrap_or(now);
                self.window
                    .saturating_sub(now.duration_since(oldest))
                    .saturating_add(self.margin)
            };

            tracing::info!(
                wait_secs = wait.as_secs(),
                max_requests = self.max_requests,
                window_secs = self.window.as_secs(),
                "Request window full, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of requests currently inside the window
    pub fn in_window(&self) -> usize {
        let mut requests = self.lock();
        Self::prune(&mut requests, Instant::now(), self.window);
        requests.len()
    }

    fn prune(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        // The deque is always left consistent, so a poisoned lock is still usable
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// No window of `window` length may contain more than `max` timestamps
    fn assert_window_invariant(stamps: &[Instant], max: usize, window: Duration) {
        for (i, start) in stamps.iter().enumerate() {
            let inside = stamps[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) < window)
                .count();
            assert!(
                inside <= max,
                "{inside} requests inside one window, cap is {max}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_under_cap_does_not_wait() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60), Duration::ZERO);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.in_window(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_oldest_to_expire() {
        let limiter =
            SlidingWindowLimiter::new(2, Duration::from_secs(60), Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire().await;

        let third = limiter.acquire().await;
        // oldest at t=0 expires at t=60, plus one second margin
        assert_eq!(third.duration_since(start), Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prunes_stale_entries() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60), Duration::ZERO);

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_window(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.in_window(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_recheck() {
        let limiter = std::sync::Arc::new(SlidingWindowLimiter::new(
            2,
            Duration::from_secs(30),
            Duration::from_millis(10),
        ));

        let mut handles = Vec::new();
        for _ in 0..7 {
            let limiter = std::sync::Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        assert_window_invariant(&stamps, 2, Duration::from_secs(30));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn window_never_exceeds_cap(
            max in 1usize..5,
            window_secs in 1u64..120,
            gaps in proptest::collection::vec(0u64..90, 1..30),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let stamps = runtime.block_on(async {
                let window = Duration::from_secs(window_secs);
                let limiter = SlidingWindowLimiter::new(max, window, Duration::ZERO);
                let mut stamps = Vec::new();
                for gap in &gaps {
                    tokio::time::advance(Duration::from_secs(*gap)).await;
                    stamps.push(limiter.acquire().await);
                }
                stamps
            });

            assert_window_invariant(&stamps, max, Duration::from_secs(window_secs));
        }
    }
}
