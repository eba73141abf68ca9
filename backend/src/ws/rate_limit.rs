use std::time::Instant;

/// Per-connection token bucket for inbound WebSocket messages.
pub struct RateLimiter {
    tokens: f64,
    capacity: f64,
    per_second: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// `per_second` steady-state messages, bursts of up to `capacity`.
    pub fn new(per_second: f64, capacity: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            per_second,
            refilled_at: Instant::now(),
        }
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
        self.refilled_at = now;

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}
