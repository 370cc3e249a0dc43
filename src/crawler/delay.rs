//! Pacing policies
//!
//! All randomized waits the engine takes (pre-request "human" delay, inter-event
//! pause, inter-area cooldown, backoff jitter) come from a [`DelayPolicy`], so tests
//! can run the full orchestration with [`NoDelay`].

use rand::Rng;
use std::ops::Range;
use std::time::Duration;

use crate::utils::retry::FailureClass;

/// Source of pacing delays
pub trait DelayPolicy: Send + Sync {
    /// Wait before issuing a network request
    fn request_delay(&self) -> Duration;

    /// Wait between two events of the same area
    fn event_pause(&self) -> Duration;

    /// Wait between two areas
    fn area_cooldown(&self) -> Duration;

    /// Additive noise on top of a backoff delay
    fn jitter(&self, class: FailureClass) -> Duration;
}

/// Uniformly random delays drawn from configured ranges
#[derive(Debug, Clone)]
pub struct RandomDelay {
    pub request_delay: Range<Duration>,
    pub event_pause: Range<Duration>,
    pub area_cooldown: Range<Duration>,
    pub jitter: Duration,
    pub block_jitter: Duration,
}

impl Default for RandomDelay {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(1000)..Duration::from_millis(3000),
            event_pause: Duration::from_millis(200)..Duration::from_millis(800),
            area_cooldown: Duration::from_secs(5)..Duration::from_secs(10),
            jitter: Duration::from_secs(1),
            block_jitter: Duration::from_secs(5),
        }
    }
}

impl RandomDelay {
    fn sample(range: &Range<Duration>) -> Duration {
        if range.end <= range.start {
            return range.start;
        }
        rand::thread_rng().gen_range(range.clone())
    }
}

impl DelayPolicy for RandomDelay {
    fn request_delay(&self) -> Duration {
        Self::sample(&self.request_delay)
    }

    fn event_pause(&self) -> Duration {
        Self::sample(&self.event_pause)
    }

    fn area_cooldown(&self) -> Duration {
        Self::sample(&self.area_cooldown)
    }

    fn jitter(&self, class: FailureClass) -> Duration {
        let max = match class {
            FailureClass::Blocked => self.block_jitter,
            FailureClass::Transient | FailureClass::RateLimited => self.jitter,
        };
        Self::sample(&(Duration::ZERO..max))
    }
}

/// Zero delay everywhere
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayPolicy for NoDelay {
    fn request_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn event_pause(&self) -> Duration {
        Duration::ZERO
    }

    fn area_cooldown(&self) -> Duration {
        Duration::ZERO
    }

    fn jitter(&self, _class: FailureClass) -> Duration {
        Duration::ZERO
    }
}

/// Sleep unless the duration is zero
pub async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_delay_stays_in_range() {
        let policy = RandomDelay::default();
        for _ in 0..100 {
            let d = policy.request_delay();
            assert!(d >= Duration::from_millis(1000) && d < Duration::from_millis(3000));

            let d = policy.area_cooldown();
            assert!(d >= Duration::from_secs(5) && d < Duration::from_secs(10));

            assert!(policy.jitter(FailureClass::Transient) < Duration::from_secs(1));
            assert!(policy.jitter(FailureClass::Blocked) < Duration::from_secs(5));
        }
    }

    #[test]
    fn test_cooldown_longer_than_request_delay() {
        let policy = RandomDelay::default();
        assert!(policy.area_cooldown.start >= policy.request_delay.end);
    }

    #[test]
    fn test_empty_range_returns_start() {
        let policy = RandomDelay {
            request_delay: Duration::from_secs(2)..Duration::from_secs(2),
            jitter: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(policy.request_delay(), Duration::from_secs(2));
        assert_eq!(policy.jitter(FailureClass::RateLimited), Duration::ZERO);
    }

    #[test]
    fn test_no_delay() {
        let policy = NoDelay;
        assert_eq!(policy.request_delay(), Duration::ZERO);
        assert_eq!(policy.area_cooldown(), Duration::ZERO);
        assert_eq!(policy.jitter(FailureClass::Blocked), Duration::ZERO);
    }
}
