//! Client-side sliding-window rate limiter for endpoint requests.
//!
//! Throttles outbound queries so that no more than `max_calls` start within
//! any `period`. Callers over budget wait; nothing is rejected or dropped.
//! The limiter is shared by every worker of a run, so its window lives
//! behind an async mutex.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Call-count window shared by concurrent callers.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    /// Start instants of calls still inside the window.
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_calls == 0` disables limiting.
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls,
            period,
            window: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, config.period())
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn has_limits(&self) -> bool {
        self.max_calls > 0
    }

    /// How long a call arriving at `now` must wait, or `None` if it may
    /// start. Prunes expired entries as a side effect.
    fn check(&self, window: &mut VecDeque<Instant>, now: Instant) -> Option<Duration> {
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.period)
        {
            window.pop_front();
        }
        if window.len() < self.max_calls {
            return None;
        }
        window
            .front()
            .map(|oldest| self.period.saturating_sub(now.duration_since(*oldest)))
    }

    /// Wait until a call slot is free, then claim it.
    pub async fn acquire(&self) {
        if !self.has_limits() {
            return;
        }
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                match self.check(&mut window, now) {
                    None => {
                        window.push_back(now);
                        return;
                    }
                    Some(wait) => wait,
                }
            };
            trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Run `call` once a slot is free.
    pub async fn run<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        call().await
    }
}
