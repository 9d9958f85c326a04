use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::error::AppError;

/// Per-user fixed-window limiter for the authenticated routes.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<HashMap<(ProtectedEndpoint, String), RateWindow>>>,
    window: Duration,
    limits: [u32; ProtectedEndpoint::COUNT],
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectedEndpoint {
    Upload,
    Prompt,
    UserSync,
}

#[derive(Default)]
struct RateLimitMetrics {
    allowed: [AtomicU64; ProtectedEndpoint::COUNT],
    limited: [AtomicU64; ProtectedEndpoint::COUNT],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointCounts {
    pub allowed: u64,
    pub limited: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub upload: EndpointCounts,
    pub prompt: EndpointCounts,
    pub user_sync: EndpointCounts,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            [
                config.upload_rate_limit_per_window,
                config.prompt_rate_limit_per_window,
                config.user_sync_rate_limit_per_window,
            ],
        )
    }

    fn new(window: Duration, limits: [u32; ProtectedEndpoint::COUNT]) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            limits,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, user_id: &str) -> Result<(), AppError> {
        let limit = self.limits[endpoint.index()];
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let entry = guard
            .entry((endpoint, user_id.to_string()))
            .or_insert(RateWindow {
                started_at: now,
                count: 0,
            });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs()
                .max(1);
            self.metrics.limited[endpoint.index()].fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                format!("Too many {} requests, retry later", endpoint.label()),
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.metrics.allowed[endpoint.index()].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        let counts = |endpoint: ProtectedEndpoint| EndpointCounts {
            allowed: self.metrics.allowed[endpoint.index()].load(Ordering::Relaxed),
            limited: self.metrics.limited[endpoint.index()].load(Ordering::Relaxed),
        };
        RateLimitMetricsSnapshot {
            upload: counts(ProtectedEndpoint::Upload),
            prompt: counts(ProtectedEndpoint::Prompt),
            user_sync: counts(ProtectedEndpoint::UserSync),
        }
    }
}

impl ProtectedEndpoint {
    const COUNT: usize = 3;

    pub const fn label(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Prompt => "prompt",
            Self::UserSync => "user_sync",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Upload => 0,
            Self::Prompt => 1,
            Self::UserSync => 2,
        }
    }
}

/// Stable per-process hash so logs never carry raw user ids.
pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
