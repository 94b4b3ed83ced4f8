//! Time source and TTL computation

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current unix time, in seconds
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Manually driven clock for deterministic tests
#[derive(Debug, Default)]
pub struct FixedClock {
    secs: AtomicU64,
}

impl FixedClock {
    pub fn new(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

/// Absolute expiry for a record written at `now_secs`
pub fn compute_ttl(now_secs: u64, ttl_secs: u64) -> u64 {
    now_secs.saturating_add(ttl_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_ttl() {
        assert_eq!(compute_ttl(1_700_000_000, 100), 1_700_000_100);
        assert_eq!(compute_ttl(1_700_000_000, 0), 1_700_000_000);
        assert_eq!(compute_ttl(u64::MAX - 1, 7200), u64::MAX);
    }

    #[test]
    fn test_system_clock_is_current() {
        let expected = chrono::Utc::now().timestamp() as u64;
        let now = SystemClock.now_secs();
        assert!(now >= expected && now <= expected + 1);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(1_700_000_000);
        assert_eq!(clock.now_secs(), 1_700_000_000);

        clock.advance(60);
        assert_eq!(clock.now_secs(), 1_700_000_060);

        clock.set(5);
        assert_eq!(clock.now_secs(), 5);
    }
}
