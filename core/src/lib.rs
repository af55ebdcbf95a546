//! # Enrollment Core
//!
//! Core traits and types shared by every enrollment crate.
//!
//! Business logic is written as reducers: a reducer takes the current state,
//! one action and an injected environment, mutates the state in place and
//! returns effect descriptions. The runtime executes those effects and feeds
//! any resulting actions back into the reducer.
//!
//! ## Core Concepts
//!
//! - **State**: Owned domain state for one aggregate (for example one cohort)
//! - **Action**: Every input to a reducer (commands and feedback events)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: A description of I/O, never the I/O itself
//! - **Environment**: Collaborators injected through traits
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! impl Reducer for CohortReducer {
//!     type State = CohortState;
//!     type Action = CohortAction;
//!     type Environment = CohortEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CohortState,
//!         action: CohortAction,
//!         env: &CohortEnvironment,
//!     ) -> SmallVec<[Effect<CohortAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Pure state transitions
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Applies one action to owned state and describes the follow-up work.
    ///
    /// Reducers must be deterministic: the same state, action and environment
    /// (including the clock reading) always produce the same result. A reducer
    /// that rejects an action must leave the state untouched apart from its
    /// error slot.
    pub trait Reducer {
        /// Aggregate state, mutated in place
        type State;

        /// Commands and feedback
        type Action;

        /// Clock and collaborators
        type Environment;

        /// Apply `action` to `state`.
        ///
        /// Most actions produce zero to four effects, so the result is kept
        /// inline on the stack.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Deferred side effects
///
/// Effects are values returned by reducers. They do nothing until the
/// runtime executes them.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Work for the runtime to perform after a reducer call. Any `Action`
    /// an effect yields is dispatched back to the same reducer.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run effects one after another, in order
        Sequential(Vec<Effect<Action>>),

        /// Async work yielding an optional feedback action
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Run all of `effects` concurrently
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Run `effects` in order, each after the previous finished
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap an async block as an effect
        #[must_use]
        pub fn future<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Whether this effect does nothing when executed
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_none)
                },
                Effect::Future(_) => false,
            }
        }
    }
}

/// Injected collaborators
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of the current time; tests substitute a controllable clock
    pub trait Clock: Send + Sync {
        /// Current instant
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock used in production
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
