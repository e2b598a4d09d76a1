//! Per-key requeue delays with exponential backoff and jitter.

use crate::error::ErrorClass;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    attempts: Mutex<HashMap<String, u32>>,
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before retrying `key`. Fatal failures wait the full ceiling.
    pub fn next(&self, key: &str, class: ErrorClass) -> Duration {
        if class == ErrorClass::Fatal {
            return self.max_delay;
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            let n = attempts.entry(key.to_string()).or_insert(0);
            let attempt = *n;
            *n = n.saturating_add(1);
            attempt
        };

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        // Jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64((base * jitter).min(self.max_delay.as_secs_f64()))
    }

    /// Forget the failure history of `key` after a successful reconcile.
    pub fn reset(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_millis(100), Duration::from_secs(10))
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let b = backoff();
        let first = b.next("default/demo", ErrorClass::Retryable);
        assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(150));

        let second = b.next("default/demo", ErrorClass::Retryable);
        assert!(second >= Duration::from_millis(100) && second <= Duration::from_millis(300));

        for _ in 0..50 {
            assert!(b.next("default/demo", ErrorClass::Retryable) <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_keys_are_independent_and_reset() {
        let b = backoff();
        for _ in 0..5 {
            b.next("default/a", ErrorClass::Retryable);
        }
        assert!(b.next("default/b", ErrorClass::Retryable) <= Duration::from_millis(150));

        b.reset("default/a");
        assert!(b.next("default/a", ErrorClass::Retryable) <= Duration::from_millis(150));
    }

    #[test]
    fn test_fatal_waits_the_ceiling() {
        let b = backoff();
        assert_eq!(b.next("default/a", ErrorClass::Fatal), Duration::from_secs(10));
    }
}
