//! # Enrollment Testing
//!
//! Testing utilities for reducers and services:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - A Given/When/Then builder for reducers (`ReducerTest`)
//! - Effect assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_testing::{ManualClock, ReducerTest};
//!
//! let clock = ManualClock::starting_at_test_epoch();
//! ReducerTest::new(CohortReducer)
//!     .with_env(env_with(clock.clone()))
//!     .given_state(CohortState::new(cohort_id, 1))
//!     .when_action(CohortAction::Initiate { .. })
//!     .then_state(|s| assert_eq!(s.ledger.held(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use enrollment_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock tests can move forward.
    ///
    /// Clones share the same time, so a service and the test driving it see
    /// the same reading after `advance`.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock reading `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Create a clock at [`test_epoch`]
        #[must_use]
        pub fn starting_at_test_epoch() -> Self {
            Self::new(test_epoch())
        }

        /// Move time forward by `by`
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01T00:00:00Z
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_735_689_600)
    }

    /// A [`FixedClock`] at [`test_epoch`]
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};
