use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Client-side throttle for the search API: a soft per-minute budget plus a
/// cool-down after the server answers 429.
pub struct RateLimiter {
    state: Arc<Mutex<RateLimitState>>,
    per_minute: u32,
}

struct RateLimitState {
    blocked_until: Option<Instant>,
    requests_this_minute: u32,
    minute_start: Instant,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateLimitState {
                blocked_until: None,
                requests_this_minute: 0,
                minute_start: Instant::now(),
            })),
            per_minute: per_minute.max(1),
        }
    }

    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        // Every waiter honours the cool-down; it is cleared only once it has
        // passed, and a later 429 may have extended it meanwhile
        while let Some(until) = state.blocked_until {
            let now = Instant::now();
            if until <= now {
                state.blocked_until = None;
                break;
            }
            let wait_duration = until - now;
            drop(state);
            tracing::info!("Search API throttled, waiting {:?}", wait_duration);
            sleep(wait_duration).await;
            state = self.state.lock().await;
        }

        let minute_elapsed = state.minute_start.elapsed();
        if minute_elapsed < Duration::from_secs(60) {
            if state.requests_this_minute >= self.per_minute {
                let wait_time = Duration::from_secs(60) - minute_elapsed;
                drop(state);
                tracing::debug!("Soft rate limiting, waiting {:?}", wait_time);
                sleep(wait_time).await;
                state = self.state.lock().await;
                state.requests_this_minute = 0;
                state.minute_start = Instant::now();
            }
        } else {
            state.requests_this_minute = 0;
            state.minute_start = Instant::now();
        }

        state.requests_this_minute += 1;
    }

    /// Hold further requests for `retry_after` after a 429.
    pub async fn throttled(&self, retry_after: Duration) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + retry_after;
        state.blocked_until = Some(state.blocked_until.map_or(until, |b| b.max(until)));
    }

    pub async fn requests_this_minute(&self) -> u32 {
        self.state.lock().await.requests_this_minute
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(30)
    }
}
