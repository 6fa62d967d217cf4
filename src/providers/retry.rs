// src/providers/retry.rs
use crate::domain::errors::ProviderError;
use rand::Rng;
use std::time::Duration;

/// Delay schedule between attempts against an external provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed {
        delay: Duration,
    },
    /// `base * factor^attempt`, capped at `max`, optionally jittered by +/- 50%
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, factor, max, jitter } => {
                let seconds = base.as_secs_f64() * factor.powi(attempt as i32);
                let delay = Duration::from_secs_f64(seconds.min(max.as_secs_f64()));
                if !jitter {
                    return delay;
                }

                let millis = delay.as_millis() as f64;
                let offset = rand::thread_rng().gen_range(-0.5..=0.5) * millis;
                Duration::from_millis((millis + offset).max(0.0) as u64)
            }
        }
    }
}

/// Bounded retry policy; total attempts = `max_retries + 1`
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Backoff,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Transport failures and timeouts always qualify; HTTP errors only for listed statuses
    pub fn should_retry(&self, error: &ProviderError) -> bool {
        match error {
            ProviderError::Status { status, .. } => self.retry_on_status.contains(status),
            other => other.is_transient(),
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_half_the_delay() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(2),
            jitter: true,
        };

        for attempt in 0..4 {
            let expected = (200.0 * 2f64.powi(attempt as i32)).min(2000.0);
            let millis = backoff.delay(attempt).as_millis() as f64;
            assert!(millis >= expected * 0.49 && millis <= expected * 1.51, "attempt={} delay={}", attempt, millis);
        }
    }

    #[test]
    fn retries_only_transient_failures() {
        let config = RetryConfig::default();
        assert!(config.should_retry(&ProviderError::Timeout(30)));
        assert!(config.should_retry(&ProviderError::Status { status: 429, message: String::new() }));
        assert!(config.should_retry(&ProviderError::Status { status: 503, message: String::new() }));
        assert!(!config.should_retry(&ProviderError::Status { status: 404, message: String::new() }));
        assert!(!config.should_retry(&ProviderError::RateLimit("Note".into())));
        assert_eq!(RetryConfig::no_retry().max_retries, 0);
    }
}
