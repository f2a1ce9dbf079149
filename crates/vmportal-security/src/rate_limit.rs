// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window rate limiting per user and operation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::warn;
use vmportal_core::Clock;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Counts attempts per `{user}:{operation}` key in fixed windows.
///
/// The window opens on the first attempt and admits `max_attempts` requests
/// until it expires; the next attempt after expiry opens a fresh window.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max_attempts: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            max_attempts,
            window,
            clock,
        }
    }

    /// Record an attempt. Returns `false` when the caller is over the limit.
    pub fn try_acquire(&self, user: &str, operation: &str) -> bool {
        let now = self.clock.now();
        let key = format!("{user}:{operation}");
        let mut entry = self.windows.entry(key).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now - entry.started_at >= self.window {
            *entry = Window {
                started_at: now,
                count: 0,
            };
        }

        if entry.count >= self.max_attempts {
            warn!(user, operation, "rate limit exceeded");
            return false;
        }

        entry.count += 1;
        true
    }

    /// Forget all attempts for a key.
    pub fn reset(&self, user: &str, operation: &str) {
        self.windows.remove(&format!("{user}:{operation}"));
    }

    /// Drop windows that have fully expired. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now - window.started_at < self.window);
        before.saturating_sub(self.windows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StepClock(Mutex<DateTime<Utc>>);

    impl StepClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn limiter(max: u32) -> (RateLimiter, Arc<StepClock>) {
        let clock = Arc::new(StepClock(Mutex::new(Utc::now())));
        (
            RateLimiter::new(max, Duration::minutes(5), clock.clone()),
            clock,
        )
    }

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let (limiter, _clock) = limiter(3);
        assert!(limiter.try_acquire("alice", "console"));
        assert!(limiter.try_acquire("alice", "console"));
        assert!(limiter.try_acquire("alice", "console"));
        assert!(!limiter.try_acquire("alice", "console"));
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _clock) = limiter(1);
        assert!(limiter.try_acquire("alice", "console"));
        assert!(limiter.try_acquire("alice", "power"));
        assert!(limiter.try_acquire("bob", "console"));
        assert!(!limiter.try_acquire("alice", "console"));
    }

    #[test]
    fn window_expiry_resets_count() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.try_acquire("alice", "console"));
        assert!(!limiter.try_acquire("alice", "console"));
        clock.advance(Duration::minutes(5));
        assert!(limiter.try_acquire("alice", "console"));
    }

    #[test]
    fn reset_and_purge() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.try_acquire("alice", "console"));
        limiter.reset("alice", "console");
        assert!(limiter.try_acquire("alice", "console"));

        assert!(limiter.try_acquire("bob", "console"));
        clock.advance(Duration::minutes(6));
        assert_eq!(limiter.purge_expired(), 2);
    }
}
