use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nd_core::{to_chrono, Error, Result};
use nd_storage::{spawn_periodic, SweepHandle};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Requests admitted per caller within `window`.
    pub max_requests: usize,
    pub window: Duration,
    pub sweep_interval: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Check the sliding window for one caller. Returns true if the request is
/// allowed. Prunes expired entries and records the new request only if allowed.
pub fn check_rate_limit(
    entries: &mut Vec<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: chrono::Duration,
    max_requests: usize,
) -> bool {
    let cutoff = now - window;
    entries.retain(|t| *t > cutoff);
    if entries.len() >= max_requests {
        return false;
    }
    entries.push(now);
    true
}

/// Per-caller sliding-window quota for interactive queries.
#[derive(Debug)]
pub struct QueryRateLimiter {
    windows: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    config: QuotaConfig,
}

impl QueryRateLimiter {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<DateTime<Utc>>>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn check(&self, caller: &str) -> Result<()> {
        self.check_at(caller, Utc::now())
    }

    pub fn check_at(&self, caller: &str, now: DateTime<Utc>) -> Result<()> {
        let window = to_chrono(self.config.window);
        let mut windows = self.lock();
        let entries = windows.entry(caller.to_string()).or_default();
        if check_rate_limit(entries, now, window, self.config.max_requests) {
            return Ok(());
        }

        let oldest = entries.iter().min().copied().unwrap_or(now);
        let retry_after_secs = (oldest + window - now).num_seconds().max(1) as u64;
        debug!(caller, retry_after_secs, "Query quota exhausted");
        Err(Error::RateLimited { retry_after_secs })
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Forget callers with no request left inside the window.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - to_chrono(self.config.window);
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, entries| {
            entries.retain(|t| *t > cutoff);
            !entries.is_empty()
        });
        before - windows.len()
    }

    pub fn tracked_callers(&self) -> usize {
        self.lock().len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> SweepHandle {
        let limiter = Arc::clone(self);
        spawn_periodic("rate-windows", self.config.sweep_interval, move || {
            limiter.sweep()
        })
    }
}
