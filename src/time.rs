//! Time abstraction for the compartment engine, allowing for mockable clocks
//! in testing.
//!
//! The protocol model timestamps everything in whole seconds, so the trait
//! hands out seconds directly instead of `Instant`s.

use std::fmt::Debug;
use std::time::Instant;

/// A trait abstracting the concept of "now" to allow for time mocking in tests.
pub trait Clock: Send + Sync + Debug {
    /// Seconds elapsed on some fixed monotonic timeline.
    fn now_secs(&self) -> u32;
}

/// The default system clock, counting seconds since its own construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Creates a clock whose timeline starts now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_secs(&self) -> u32 {
        self.epoch.elapsed().as_secs() as u32
    }
}

/// Test utilities for mocking time.
pub mod mock_clock {
    use super::*;
    use std::sync::Mutex;

    /// A mock clock that allows for manual control over the current time in tests.
    #[derive(Debug)]
    pub struct MockClock {
        current_secs: Mutex<u32>,
    }

    impl MockClock {
        /// Creates a new `MockClock` starting at the given second.
        pub fn new(start_secs: u32) -> Self {
            Self {
                current_secs: Mutex::new(start_secs),
            }
        }

        /// Advances the mock clock's current time by the specified seconds.
        pub fn advance(&self, secs: u32) {
            let mut current = self.current_secs.lock().unwrap();
            *current += secs;
        }

        /// Sets the mock clock's current time to a specific second.
        pub fn set_secs(&self, secs: u32) {
            let mut current = self.current_secs.lock().unwrap();
            *current = secs;
        }
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new(0)
        }
    }

    impl Clock for MockClock {
        fn now_secs(&self) -> u32 {
            *self.current_secs.lock().unwrap()
        }
    }
}
