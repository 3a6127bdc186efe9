//! Per-app fixed-window request limiter.
//!
//! Windows are tracked atomically with moka's entry API. The remaining quota
//! goes negative once a caller exceeds its limit, which lets the HTTP layer
//! report how far over the limit a client is.

use chrono::{DateTime, Utc};
use moka::ops::compute::Op;
use moka::sync::Cache as MokaCache;
use std::sync::Arc;
use std::time::Duration;

/// One counting window of a limitee.
#[derive(Debug, Clone, Copy)]
struct Window {
    count: i64,
    expires: DateTime<Utc>,
}

/// Outcome of a limited request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Configured limit of the window.
    pub limit: i64,
    /// Requests left; negative once the limit is exceeded.
    pub remaining: i64,
    /// End of the current window.
    pub reset: DateTime<Utc>,
}

impl Quota {
    /// Whether the request must be rejected.
    pub fn exceeded(&self) -> bool {
        self.remaining < 0
    }
}

/// Fixed-window limiter keyed by an opaque hash (the app token).
#[derive(Clone)]
pub struct RateLimiter {
    windows: MokaCache<Arc<str>, Window>,
    window_size: Duration,
}

impl RateLimiter {
    /// Create a limiter with the given window length.
    pub fn new(window_size: Duration) -> Self {
        let windows = MokaCache::builder()
            .max_capacity(100_000)
            .time_to_idle(window_size * 2)
            .build();
        Self { windows, window_size }
    }

    /// Count one request for `hash` against `limit`.
    pub fn request(&self, hash: &str, limit: i64) -> Quota {
        self.request_at(hash, limit, Utc::now())
    }

    fn request_at(&self, hash: &str, limit: i64, now: DateTime<Utc>) -> Quota {
        let window_size = chrono::Duration::from_std(self.window_size).unwrap_or(chrono::Duration::minutes(1));
        let key: Arc<str> = Arc::from(hash);

        let mut current = Window {
            count: 1,
            expires: now + window_size,
        };

        self.windows.entry_by_ref(&key).and_compute_with(|entry| {
            if let Some(entry) = entry {
                let window = entry.into_value();
                if window.expires > now {
                    current = Window {
                        count: window.count + 1,
                        expires: window.expires,
                    };
                }
            }
            Op::Put(current)
        });

        Quota {
            limit,
            remaining: limit - current.count,
            reset: current.expires,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::constants::RATE_LIMIT_WINDOW_SECS))
    }
}
