use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;

use crate::configuration::types::RateLimitConfig;
use crate::error_handling::types::ConfigError;

type InnerRateLimiter<C> =
    governor::RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Process-wide token bucket shared by every HTTP handler.
///
/// Holds at most `burst_capacity` tokens and gains one every `refill_interval`. Admission is a
/// single atomic check-and-decrement inside governor, so concurrent callers cannot both take the
/// last token.
pub struct RateLimiter<C: Clock = DefaultClock> {
    inner: InnerRateLimiter<C>,
    refill_interval: Duration,
    burst_capacity: NonZeroU32,
}

impl RateLimiter<DefaultClock> {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Result<Self, ConfigError> {
        let refill_interval = Duration::from_millis(config.refill_interval_ms);
        let burst_capacity = NonZeroU32::new(config.burst_capacity).ok_or_else(|| {
            ConfigError::NotInRange("rate_limit.burst_capacity must be at least 1".to_string())
        })?;
        let quota = Quota::with_period(refill_interval)
            .ok_or_else(|| {
                ConfigError::NotInRange(
                    "rate_limit.refill_interval_ms must be greater than 0".to_string(),
                )
            })?
            .allow_burst(burst_capacity);

        Ok(Self {
            inner: governor::RateLimiter::direct_with_clock(quota, clock),
            refill_interval,
            burst_capacity,
        })
    }

    /// Takes one token if available.
    pub fn try_admit(&self) -> bool {
        self.inner.check().is_ok()
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity.get()
    }
}
