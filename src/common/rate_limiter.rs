//! Request pacing derived from the exchange's published rate limits
//!
//! Binance reports its limits in `exchangeInfo` (e.g. 6000 REQUEST_WEIGHT per
//! minute). For a request of weight `w` the allowed frequency under a weight
//! limit is `limit / window / w` calls per second; RAW_REQUESTS limits count
//! every call as one. The pacer spaces calls by the inverse of the smallest
//! allowed frequency.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::binance::RateLimit;

/// One request limit reduced to calls per second
#[derive(Debug, Clone, PartialEq)]
struct RequestBudget {
    weighted: bool,
    per_second: f64,
}

/// Blocking request pacer
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use binance_monitor::common::RequestPacer;
/// use binance_monitor::binance::RateLimit;
///
/// let limits = vec![RateLimit {
///     rate_limit_type: "REQUEST_WEIGHT".to_string(),
///     interval: "MINUTE".to_string(),
///     interval_num: 1,
///     limit: 1200,
/// }];
/// let pacer = RequestPacer::from_rate_limits(&limits);
///
/// // 1200 weight per minute at weight 5 is 4 calls per second
/// assert_eq!(pacer.min_interval(5), Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct RequestPacer {
    budgets: Vec<RequestBudget>,
    last_call: Option<Instant>,
}

impl RequestPacer {
    /// A pacer that never waits
    pub fn unlimited() -> Self {
        Self {
            budgets: Vec::new(),
            last_call: None,
        }
    }

    /// Build from the `rateLimits` array of `exchangeInfo`, ignoring order limits
    pub fn from_rate_limits(limits: &[RateLimit]) -> Self {
        let budgets: Vec<RequestBudget> = limits
            .iter()
            .filter(|l| l.is_request_limit() && l.limit > 0)
            .filter_map(|l| {
                let window = l.window()?.as_secs_f64();
                Some(RequestBudget {
                    weighted: l.rate_limit_type == "REQUEST_WEIGHT",
                    per_second: f64::from(l.limit) / window,
                })
            })
            .collect();

        info!("Request pacer using {} exchange limit(s)", budgets.len());
        Self {
            budgets,
            last_call: None,
        }
    }

    /// Highest permitted call frequency (calls/second) for requests of `weight`
    pub fn max_frequency(&self, weight: u32) -> Option<f64> {
        let weight = f64::from(weight.max(1));
        self.budgets
            .iter()
            .map(|b| {
                if b.weighted {
                    b.per_second / weight
                } else {
                    b.per_second
                }
            })
            .fold(None, |min: Option<f64>, f| Some(min.map_or(f, |m| m.min(f))))
    }

    /// Minimum spacing between consecutive requests of `weight`
    pub fn min_interval(&self, weight: u32) -> Duration {
        match self.max_frequency(weight) {
            Some(freq) if freq > 0.0 => Duration::from_secs_f64(1.0 / freq),
            _ => Duration::ZERO,
        }
    }

    /// Block until a request of `weight` may be sent, then mark it sent
    pub fn wait(&mut self, weight: u32) {
        let interval = self.min_interval(weight);
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < interval {
                let pause = interval - elapsed;
                debug!("Pacing request for {}ms", pause.as_millis());
                std::thread::sleep(pause);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(kind: &str, interval: &str, num: u32, limit: u32) -> RateLimit {
        RateLimit {
            rate_limit_type: kind.to_string(),
            interval: interval.to_string(),
            interval_num: num,
            limit,
        }
    }

    #[test]
    fn test_unlimited_never_waits() {
        let pacer = RequestPacer::unlimited();
        assert_eq!(pacer.max_frequency(20), None);
        assert_eq!(pacer.min_interval(20), Duration::ZERO);
    }

    #[test]
    fn test_weight_limit_scales_with_weight() {
        let pacer = RequestPacer::from_rate_limits(&[limit("REQUEST_WEIGHT", "MINUTE", 1, 6000)]);
        assert_eq!(pacer.max_frequency(1), Some(100.0));
        assert_eq!(pacer.max_frequency(20), Some(5.0));
        assert_eq!(pacer.min_interval(20), Duration::from_millis(200));
    }

    #[test]
    fn test_strictest_limit_wins() {
        let pacer = RequestPacer::from_rate_limits(&[
            limit("REQUEST_WEIGHT", "MINUTE", 1, 6000),
            limit("RAW_REQUESTS", "MINUTE", 5, 600),
            limit("ORDERS", "SECOND", 10, 1),
        ]);
        // raw: 600 / 300s = 2/s regardless of weight; weight 1 allows 100/s
        assert_eq!(pacer.max_frequency(1), Some(2.0));
        // weight 100: 6000 / 60 / 100 = 1/s, stricter than raw
        assert_eq!(pacer.max_frequency(100), Some(1.0));
    }

    #[test]
    fn test_zero_weight_treated_as_one() {
        let pacer = RequestPacer::from_rate_limits(&[limit("REQUEST_WEIGHT", "SECOND", 1, 10)]);
        assert_eq!(pacer.max_frequency(0), pacer.max_frequency(1));
    }

    #[test]
    fn test_wait_spaces_calls() {
        let mut pacer =
            RequestPacer::from_rate_limits(&[limit("REQUEST_WEIGHT", "SECOND", 1, 50)]);
        let start = Instant::now();
        pacer.wait(1);
        pacer.wait(1);
        pacer.wait(1);
        // two gaps of 20ms each
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
