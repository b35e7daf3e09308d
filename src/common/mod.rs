//! Reliability helpers for exchange access
//!
//! - Request pacing derived from the exchange's published limits
//! - Retry with exponential backoff
//! - Circuit breaker across symbols and polling cycles

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::RequestPacer;
pub use retry::RetryPolicy;
