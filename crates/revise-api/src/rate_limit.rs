use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::routes::user_fingerprint;

/// Fixed-window request counter per endpoint and user.
///
/// Users are keyed by fingerprint so raw ids never sit in the table.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    windows: Arc<Mutex<HashMap<(ProtectedEndpoint, u64), RateWindow>>>,
    window: Duration,
    sync_limit: u32,
    profile_limit: u32,
    ai_limit: u32,
    sync_counters: Arc<Counters>,
    profile_counters: Arc<Counters>,
    ai_counters: Arc<Counters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectedEndpoint {
    Sync,
    Profile,
    Generation,
}

#[derive(Default)]
struct Counters {
    allowed: AtomicU64,
    limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub sync_allowed: u64,
    pub sync_limited: u64,
    pub profile_allowed: u64,
    pub profile_limited: u64,
    pub ai_allowed: u64,
    pub ai_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    opened_at: Instant,
    used: u32,
}

impl RateWindow {
    /// Count one request, reopening the window once it has elapsed.
    /// Returns the seconds to wait when the limit is already reached.
    fn admit(&mut self, now: Instant, window: Duration, limit: u32) -> Result<(), u64> {
        let elapsed = now.duration_since(self.opened_at);
        if elapsed >= window {
            self.opened_at = now;
            self.used = 0;
        } else if self.used >= limit {
            return Err(window.saturating_sub(elapsed).as_secs().max(1));
        }
        self.used += 1;
        Ok(())
    }
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.sync_rate_limit_per_window,
            config.profile_rate_limit_per_window,
            config.ai_rate_limit_per_window,
        )
    }

    fn new(window: Duration, sync_limit: u32, profile_limit: u32, ai_limit: u32) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            window,
            sync_limit,
            profile_limit,
            ai_limit,
            sync_counters: Arc::default(),
            profile_counters: Arc::default(),
            ai_counters: Arc::default(),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, user_id: &str) -> Result<(), AppError> {
        let (limit, counters) = match endpoint {
            ProtectedEndpoint::Sync => (self.sync_limit, &self.sync_counters),
            ProtectedEndpoint::Profile => (self.profile_limit, &self.profile_counters),
            ProtectedEndpoint::Generation => (self.ai_limit, &self.ai_counters),
        };
        let user = user_fingerprint(user_id);
        let now = Instant::now();

        let admitted = {
            let mut windows = self.windows.lock().await;
            windows
                .entry((endpoint, user))
                .or_insert(RateWindow {
                    opened_at: now,
                    used: 0,
                })
                .admit(now, self.window, limit)
        };

        match admitted {
            Ok(()) => {
                counters.allowed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(retry_after_secs) => {
                counters.limited.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    endpoint = endpoint.label(),
                    user,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                Err(AppError::too_many_requests(
                    format!("Too many {} requests; slow down", endpoint.label()),
                    retry_after_secs,
                ))
            }
        }
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            sync_allowed: self.sync_counters.allowed.load(Ordering::Relaxed),
            sync_limited: self.sync_counters.limited.load(Ordering::Relaxed),
            profile_allowed: self.profile_counters.allowed.load(Ordering::Relaxed),
            profile_limited: self.profile_counters.limited.load(Ordering::Relaxed),
            ai_allowed: self.ai_counters.allowed.load(Ordering::Relaxed),
            ai_limited: self.ai_counters.limited.load(Ordering::Relaxed),
        }
    }
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Profile => "profile",
            Self::Generation => "ai",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 2, 2, 2);

        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();
        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();

        let err = limiter
            .check(ProtectedEndpoint::Sync, "user-a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, _)));

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.sync_allowed, 2);
        assert_eq!(metrics.sync_limited, 1);
    }

    #[test]
    fn window_reopens_after_it_elapses() {
        let start = Instant::now();
        let window = Duration::from_secs(10);
        let mut state = RateWindow {
            opened_at: start,
            used: 0,
        };

        assert_eq!(state.admit(start, window, 1), Ok(()));
        assert_eq!(state.admit(start + Duration::from_secs(4), window, 1), Err(6));
        assert_eq!(state.admit(start + window, window, 1), Ok(()));
        assert_eq!(state.used, 1);
    }

    #[tokio::test]
    async fn limits_are_tracked_per_user_and_endpoint() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1, 1, 1);

        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();
        limiter.check(ProtectedEndpoint::Sync, "user-b").await.unwrap();
        limiter
            .check(ProtectedEndpoint::Generation, "user-a")
            .await
            .unwrap();
        assert!(limiter
            .check(ProtectedEndpoint::Generation, "user-a")
            .await
            .is_err());
        assert_eq!(limiter.metrics_snapshot().ai_limited, 1);
    }

    #[tokio::test]
    async fn profile_requests_do_not_spend_sync_budget() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1, 2, 1);

        limiter.check(ProtectedEndpoint::Profile, "user-a").await.unwrap();
        limiter.check(ProtectedEndpoint::Profile, "user-a").await.unwrap();
        assert!(limiter
            .check(ProtectedEndpoint::Profile, "user-a")
            .await
            .is_err());
        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.profile_allowed, 2);
        assert_eq!(metrics.profile_limited, 1);
        assert_eq!(metrics.sync_allowed, 1);
        assert_eq!(metrics.sync_limited, 0);
    }
}
