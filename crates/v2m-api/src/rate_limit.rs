//! Per-client admission control.
//!
//! A fixed window per client key: the first request opens a window of
//! `window` width, at most `limit` requests are admitted inside it, and
//! the next request after it closes starts a fresh one. State is
//! process-local.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Width of the admission window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Time until the window reopens; zero when admitted
    pub retry_after: Duration,
}

impl Decision {
    /// `Retry-After` value: whole seconds rounded to nearest, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        let rounded = (self.retry_after.as_millis() + 500) / 1000;
        (rounded as u64).max(1)
    }
}

/// Decides whether a request from `key` may proceed.
pub trait AdmissionControl: Send + Sync {
    fn allow(&self, key: &str) -> Decision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset: Instant,
}

#[derive(Debug)]
struct LimiterState {
    entries: HashMap<String, Window>,
    last_cleanup: Instant,
}

/// In-memory fixed-window limiter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(LimiterState {
                entries: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// Limiter with the default 60s window.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, DEFAULT_WINDOW)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of tracked client keys.
    pub fn tracked(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Admission check against an explicit clock reading.
    pub fn allow_at(&self, key: &str, now: Instant) -> Decision {
        let mut state = self.state.lock();

        let entry = state
            .entries
            .entry(key.to_string())
            .and_modify(|w| {
                if now > w.reset {
                    *w = Window {
                        count: 0,
                        reset: now + self.window,
                    };
                }
            })
            .or_insert(Window {
                count: 0,
                reset: now + self.window,
            });

        let decision = if entry.count >= self.limit {
            Decision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                retry_after: entry.reset.saturating_duration_since(now),
            }
        } else {
            entry.count += 1;
            Decision {
                allowed: true,
                limit: self.limit,
                remaining: self.limit - entry.count,
                retry_after: Duration::ZERO,
            }
        };

        // Evict closed windows at most once per window width
        if now.saturating_duration_since(state.last_cleanup) >= self.window {
            state.entries.retain(|_, w| now <= w.reset);
            state.last_cleanup = now;
        }

        decision
    }
}

impl AdmissionControl for FixedWindowLimiter {
    fn allow(&self, key: &str) -> Decision {
        self.allow_at(key, Instant::now())
    }
}
