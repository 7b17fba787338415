//! Timing attack protection for credential and session comparisons

use std::time::{Duration, Instant};

/// Compares two strings without short-circuiting on the first differing byte.
/// Only the length check leaks, which is acceptable for subjects and codes.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// Holds a request until a minimum amount of time has passed since it started,
/// so that "unknown user" and "wrong password" take the same time to answer
pub struct AuthTimer {
    start: Instant,
    min_duration: Duration,
}

impl AuthTimer {
    pub fn new(min_duration: Duration) -> Self {
        Self {
            start: Instant::now(),
            min_duration,
        }
    }

    /// Wait until minimum duration has elapsed
    pub async fn wait(self) {
        let elapsed = self.start.elapsed();
        if elapsed < self.min_duration {
            tokio::time::sleep(self.min_duration - elapsed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("alice", "alice"));
        assert!(!constant_time_eq("alice", "bob"));
        assert!(!constant_time_eq("alice", "alic"));
        assert!(!constant_time_eq("", "a"));
    }

    #[tokio::test]
    async fn test_auth_timer() {
        let timer = AuthTimer::new(Duration::from_millis(10));
        let start = Instant::now();
        timer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_auth_timer_zero_does_not_wait() {
        let start = Instant::now();
        AuthTimer::new(Duration::ZERO).wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
