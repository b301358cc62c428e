//! Pacing between triggering actions.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;

/// Enforces a minimum spacing between requests against the target service.
/// Sequential by design; one limiter per run.
pub struct RateLimiter {
    delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        RateLimiter {
            delay,
            last_request: None,
        }
    }

    /// Sleeps until at least the configured delay (or `override_delay`, when
    /// given) has passed since the previous call, then marks this request.
    pub fn apply(&mut self, override_delay: Option<Duration>) {
        let delay = override_delay.unwrap_or(self.delay);

        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < delay {
                let wait = delay - elapsed;
                debug!("rate limit: waiting {wait:?}");
                thread::sleep(wait);
            }
        }

        self.last_request = Some(Instant::now());
    }
}
