//! Circuit breaker for the history fetcher
//!
//! Each symbol's fetch counts as one call. After `failure_threshold`
//! consecutive failed calls the breaker opens and the fetcher stops issuing
//! requests until `cooldown` has passed, then lets one probe through.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    /// Cooldown elapsed; the next call decides
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether a call may be made now. Moves Open to HalfOpen once the cooldown is over.
    pub fn can_attempt(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = self
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.cooldown);
                if cooled {
                    tracing::info!("Circuit breaker half-open, probing exchange");
                    self.state = CircuitState::HalfOpen;
                }
                cooled
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!("Circuit breaker closed after successful call");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        let trip = self.state == CircuitState::HalfOpen
            || self.consecutive_failures >= self.config.failure_threshold;

        if trip && self.state != CircuitState::Open {
            tracing::warn!(
                "Circuit breaker opened after {} consecutive failures",
                self.consecutive_failures
            );
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig::default().with_failure_threshold(3));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_attempt());

        cb.record_failure();
        assert!(cb.is_open());
        assert!(!cb.can_attempt());
    }

    #[test]
    fn test_success_resets_count() {
        let mut cb = CircuitBreaker::new(CircuitBreakerConfig::default().with_failure_threshold(2));

        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_half_open_probe() {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(1)
            .with_cooldown(Duration::from_millis(1));
        let mut cb = CircuitBreaker::new(config);

        cb.record_failure();
        assert!(cb.is_open());

        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.can_attempt());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // a failed probe reopens immediately
        cb.record_failure();
        assert!(cb.is_open());

        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.can_attempt());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }
}
