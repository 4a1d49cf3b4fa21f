//! Token bucket rate limiting for sensor API calls.

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct TokenBucket {
    /// Current number of tokens.
    tokens: f64,
    /// Burst capacity.
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket of `capacity` tokens, refilled at `refill_rate` per second.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// One request per `period`, no burst.
    pub fn every(period: Duration) -> Self {
        let secs = period.as_secs_f64().max(f64::EPSILON);
        Self::new(1, 1.0 / secs)
    }

    /// Take a token if one is available.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take a token, sleeping until one is available. Returns the time waited.
    pub async fn acquire(&mut self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            if self.try_acquire() {
                return waited;
            }
            let wait = self.time_until_available();
            tracing::trace!("Rate limited, waiting {wait:?}");
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    /// Time until the next token is available.
    pub fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}
