use std::time::{Duration, Instant};

/// Per-source token bucket. Each request takes one token; when the bucket
/// runs dry the caller owes a wait of `(1 - tokens) / rate` seconds.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

/// Refill rate and burst capacity for a source key.
pub fn source_rates(source: &str) -> (f64, f64) {
    match source {
        "openalex" => (10.0, 10.0),
        "s2" => (1.0, 1.0),
        "openai" => (5.0, 5.0),
        "ollama" => (100.0, 100.0),
        _ => (5.0, 5.0),
    }
}

impl TokenBucket {
    pub fn new(rate: f64, capacity: f64) -> Self {
        TokenBucket {
            rate,
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    pub fn for_source(source: &str) -> Self {
        let (rate, capacity) = source_rates(source);
        Self::new(rate, capacity)
    }

    /// Take one token, returning how long the caller must sleep before the
    /// request may go out. The wait itself is credited as refill time.
    pub fn acquire(&mut self) -> Duration {
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Duration::ZERO
        } else {
            let wait = Duration::from_secs_f64((1.0 - self.tokens) / self.rate);
            self.tokens = 0.0;
            self.last_refill += wait;
            wait
        }
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}
