//! Time sources
//!
//! Protocol decisions read time through `Clock` so tests can move it by hand.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Timestamp;

/// Source of the current Unix time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Manually driven clock
#[derive(Debug, Default)]
pub struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock() {
        assert!(SystemClock.now() > 1_700_000_000); // After Nov 2023
    }

    #[test]
    fn test_mock_clock() {
        let clock = MockClock::new(1000);
        clock.advance(120);
        assert_eq!(clock.now(), 1120);

        clock.set(5);
        assert_eq!(clock.now(), 5);
    }
}
