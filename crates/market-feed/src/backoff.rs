//! 선형 재연결 백오프.
//!
//! n번째 재연결 시도는 `n × base`만큼 대기하며, `max_attempts`회 이후에는 포기합니다.
//! 연결에 성공하면 [`ReconnectPolicy::reset`]으로 카운터를 0으로 되돌립니다.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempts: 0,
        }
    }

    /// 다음 재연결까지의 대기 시간. 한도를 넘으면 `None`.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.base.saturating_mul(self.attempts))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// 지금까지 예약된 연속 재연결 시도 횟수.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear_delays_then_give_up() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(5000), 5);
        let delays: Vec<u64> = std::iter::from_fn(|| policy.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![5000, 10000, 15000, 20000, 25000]);
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1), 3);
        policy.next_delay();
        policy.next_delay();
        policy.reset();

        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_attempts_never_retries() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1), 0);
        assert_eq!(policy.next_delay(), None);
    }

    proptest! {
        #[test]
        fn prop_delays_non_decreasing_and_capped(base_ms in 1u64..60_000, max in 0u32..20) {
            let mut policy = ReconnectPolicy::new(Duration::from_millis(base_ms), max);
            let mut previous = Duration::ZERO;
            let mut count = 0u32;

            while let Some(delay) = policy.next_delay() {
                prop_assert!(delay >= previous);
                prop_assert_eq!(delay, Duration::from_millis(base_ms) * (count + 1));
                previous = delay;
                count += 1;
            }

            prop_assert_eq!(count, max);
            prop_assert!(policy.next_delay().is_none());
        }
    }
}
