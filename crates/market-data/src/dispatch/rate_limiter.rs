//! Global rolling-window rate limiter for upstream calls.
//!
//! Keeps the instants of every admission inside the current window and admits a
//! new call only while fewer than `max_per_window` remain. Admissions age out as
//! the window rolls forward, so no more than `max_per_window` calls are ever
//! admitted inside any window of length `window`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Default quota: 5 requests per minute (free-tier aggregates plans).
const DEFAULT_MAX_PER_WINDOW: u32 = 5;

/// Default window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum admissions inside one window.
    pub max_per_window: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_per_window: DEFAULT_MAX_PER_WINDOW,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Rolling-window rate limiter shared by every dispatcher in the engine.
///
/// Thread-safe: admission checks and the increment happen under one lock, so
/// concurrent callers can never push the count past the quota.
pub struct RateLimiter {
    /// Admission instants inside the current window, oldest first.
    admissions: Mutex<VecDeque<Instant>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self::with_config(RateLimiterConfig::default())
    }

    /// Create a rate limiter with custom settings.
    pub fn with_config(config: RateLimiterConfig) -> Self {
        Self {
            admissions: Mutex::new(VecDeque::with_capacity(config.max_per_window as usize)),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Lock the admissions mutex, recovering from poison if necessary.
    ///
    /// Recovering is safe here: the worst case is a slightly stale window.
    fn lock_admissions(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.admissions.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn prune(&self, admissions: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = admissions.front() {
            if now.duration_since(*oldest) >= self.config.window {
                admissions.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to admit one call now.
    ///
    /// Returns true and records the admission if the quota allows it.
    /// A denial has no side effects.
    pub fn try_admit(&self) -> bool {
        let now = Instant::now();
        let mut admissions = self.lock_admissions();
        self.prune(&mut admissions, now);

        if (admissions.len() as u32) < self.config.max_per_window {
            admissions.push_back(now);
            debug!(
                "Rate limiter: admitted ({}/{})",
                admissions.len(),
                self.config.max_per_window
            );
            true
        } else {
            false
        }
    }

    /// Time until the next admission would succeed. Zero if one is available now.
    pub fn time_until_available(&self) -> Duration {
        let now = Instant::now();
        let mut admissions = self.lock_admissions();
        self.prune(&mut admissions, now);

        if (admissions.len() as u32) < self.config.max_per_window {
            return Duration::ZERO;
        }

        admissions
            .front()
            .map(|oldest| (*oldest + self.config.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Admissions still available in the current window.
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let mut admissions = self.lock_admissions();
        self.prune(&mut admissions, now);
        self.config
            .max_per_window
            .saturating_sub(admissions.len() as u32)
    }

    /// Wait (asynchronously) until a call is admitted.
    pub async fn acquire(&self) {
        loop {
            if self.try_admit() {
                return;
            }
            let wait_time = self.time_until_available();
            debug!("Rate limiter: waiting {:?} for next window slot", wait_time);
            tokio::time::sleep(wait_time.max(Duration::from_millis(1))).await;
        }
    }

    /// Forget every admission.
    pub fn reset(&self) {
        self.lock_admissions().clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
