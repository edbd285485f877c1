use rand::Rng;
use std::time::Duration;

/// Exponential retry delay with jitter, doubling from `base` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.min(max);
        Backoff {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait before the next retry. Each call doubles the step; the
    /// returned delay is the step plus up to 20% jitter, never above `max`.
    pub fn next_delay(&mut self) -> Duration {
        let step = self.current;
        self.current = (self.current * 2).min(self.max);

        let jitter_ms = (step.as_millis() as u64) / 5;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        (step + jitter).min(self.max)
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
