// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Injectable time source for the caches and scheduler.
//!
//! Every component with time-dependent behavior (the bounded caches, the
//! scheduler) takes a `Clock` at construction instead of calling
//! `Instant::now()` directly, so tests can advance time deterministically
//! instead of racing a real background thread against a real timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The default clock: the OS monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to, for deterministic tests.
///
/// `Instant` has no public constructor for an arbitrary point in time, so
/// this clock anchors itself to a real `Instant` taken at construction and
/// tracks an offset from it.
#[derive(Debug, Clone)]
pub struct TestClock {
    epoch: Instant,
    offset: Arc<AtomicU64>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by `d`.
    pub fn advance(&self, d: Duration) {
        self.offset
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.offset.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_clock_only_moves_on_advance() {
        let clock = TestClock::new();
        let a = clock.now();
        let b = clock.now();
        assert_eq!(a, b);

        clock.advance(Duration::from_millis(500));
        let c = clock.now();
        assert!(c > b);
        assert_eq!(c - b, Duration::from_millis(500));
    }

    #[test]
    fn test_clock_clones_share_state() {
        let clock = TestClock::new();
        let clone = clock.clone();
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), clone.now());
    }
}
