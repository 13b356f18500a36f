//! Pacing for sequential outbound loops.
//!
//! Every loop that calls an external API (subscriber broadcast, webhook
//! updates, holder fetches, registry page walks) keeps one call in flight at a
//! time and asks a [`RateLimiter`] before each call. The limiter decides how
//! long to wait; the loop never decides on its own.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Paces calls to an external API.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until the next call may be issued.
    async fn acquire(&self);
}

/// No pacing at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn acquire(&self) {}
}

/// Minimum spacing between consecutive calls. The first call is immediate.
#[derive(Debug)]
pub struct FixedInterval {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// Configured spacing.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl RateLimiter for FixedInterval {
    async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Token bucket configuration.
#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    /// Maximum calls per window.
    pub max_calls: u32,
    /// Window in milliseconds.
    pub window_ms: u64,
    /// Minimum delay between calls in milliseconds.
    pub min_delay_ms: u64,
}

impl BucketConfig {
    pub const fn new(max_calls: u32, window_ms: u64, min_delay_ms: u64) -> Self {
        Self {
            max_calls,
            window_ms,
            min_delay_ms,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_update: Instant,
    last_call: Option<Instant>,
}

/// Token bucket limiter: bursts up to `max_calls`, refilled evenly over the window.
#[derive(Debug)]
pub struct TokenBucket {
    config: BucketConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: BucketConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: config.max_calls as f64,
                last_update: Instant::now(),
                last_call: None,
            }),
            config,
        }
    }

    fn replenish(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_update).as_millis() as f64;
        let window_ms = self.config.window_ms.max(1) as f64;
        let to_add = (elapsed_ms / window_ms) * self.config.max_calls as f64;

        state.tokens = (state.tokens + to_add).min(self.config.max_calls as f64);
        state.last_update = now;
    }

    fn wait_time(&self, state: &mut BucketState) -> Duration {
        self.replenish(state);

        if let Some(last) = state.last_call {
            let min_delay = Duration::from_millis(self.config.min_delay_ms);
            let since_last = last.elapsed();
            if since_last < min_delay {
                return min_delay - since_last;
            }
        }

        if state.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let per_token = self.config.window_ms as f64 / self.config.max_calls.max(1) as f64;
            Duration::from_millis(((1.0 - state.tokens) * per_token).ceil() as u64)
        }
    }

    /// Tokens currently available.
    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.replenish(&mut state);
        state.tokens
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn acquire(&self) {
        // Holding the lock across the sleep keeps waiters in FIFO order.
        let mut state = self.state.lock().await;
        loop {
            let wait = self.wait_time(&mut state);
            if wait.is_zero() {
                state.tokens -= 1.0;
                state.last_call = Some(Instant::now());
                return;
            }
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}
