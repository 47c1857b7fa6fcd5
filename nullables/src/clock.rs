//! Nullable clock: deterministic time for testing.

use meshgate_types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct NullClock {
    current: Arc<AtomicU64>,
}

impl NullClock {
    pub fn new(initial_secs: u64) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(initial_secs)),
        }
    }

    /// Get the current time.
    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.current.load(Ordering::SeqCst))
    }

    /// Advance time by a number of seconds.
    pub fn advance(&self, secs: u64) {
        self.current.fetch_add(secs, Ordering::SeqCst);
    }

    /// Set the time to a specific value.
    pub fn set(&self, secs: u64) {
        self.current.store(secs, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = NullClock::new(100);
        let other = clock.clone();
        other.advance(5);
        assert_eq!(clock.now(), Timestamp::new(105));
        clock.set(7);
        assert_eq!(other.now().as_secs(), 7);
    }
}
