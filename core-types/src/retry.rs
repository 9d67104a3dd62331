// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{future::Future, time::Duration};

use rand::Rng;
use tokio::time::sleep;

/// Jittered exponential backoff shared by the store fetches and the live-source reconnect loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration, jitter_pct: f64) -> Self {
        let base_delay = base_delay.max(Duration::from_millis(1));
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    /// Policy for one-shot store requests at startup.
    pub fn store_fetch(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::from_millis(250), Duration::from_secs(2), 0.2)
    }

    /// Policy for websocket reconnects; attempts are unbounded at the call site.
    pub fn reconnect() -> Self {
        Self::new(usize::MAX, Duration::from_millis(500), Duration::from_secs(30), 0.25)
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay` before jitter.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = 2_u32.saturating_pow(attempt.min(31) as u32);
        let capped = self.base_delay.saturating_mul(exp).min(self.max_delay);
        if self.jitter_pct == 0.0 {
            return capped;
        }
        let capped_ms = capped.as_millis() as i64;
        let spread = (capped_ms as f64 * self.jitter_pct) as i64;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((capped_ms + delta).max(0) as u64)
    }

    /// Runs `op` until it succeeds or `max_attempts` is exhausted, returning the last error.
    pub async fn retry_async<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) if attempt + 1 >= self.max_attempts => return Err(err),
                Err(_) => {
                    sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::store_fetch(3)
    }
}
