//! # Tourbook Core
//!
//! Core traits and domain types for the Tourbook booking client.
//!
//! This crate provides the abstractions shared by every other Tourbook crate:
//! the Reducer pattern used by the booking flow, the Effect descriptions the
//! runtime executes, injected dependencies (clock, analytics), and the domain
//! model of the storefront (packages, time slots, cart snapshots).
//!
//! ## Core Concepts
//!
//! - **State**: Ephemeral state of a feature (e.g. the booking flow)
//! - **Action**: All possible inputs to a reducer (user intents and API results)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Domain
//!
//! - [`bookability`]: the single cutoff policy for slot booking
//! - [`catalog`]: packages, time slots and availability records
//! - [`cart`]: abandoned-cart snapshots and their identity
//! - [`broadcast`]: explicit pub/sub contract for cart updates across contexts
//! - [`storage`]: durable key-value storage contract
//! - [`dates`]: date and clock-time parsing shared by all of the above
//!
//! ## Example
//!
//! ```ignore
//! use tourbook_core::*;
//!
//! impl Reducer for BookingFlowReducer {
//!     type State = BookingFlowState;
//!     type Action = BookingFlowAction;
//!     type Environment = BookingEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut BookingFlowState,
//!         action: BookingFlowAction,
//!         env: &BookingEnvironment,
//!     ) -> SmallVec<[Effect<BookingFlowAction>; 4]> {
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod bookability;
pub mod broadcast;
pub mod cart;
pub mod catalog;
pub mod dates;
pub mod storage;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for BookingFlowReducer {
    ///     type State = BookingFlowState;
    ///     type Action = BookingFlowAction;
    ///     type Environment = BookingEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut BookingFlowState,
    ///         action: BookingFlowAction,
    ///         env: &BookingEnvironment,
    ///     ) -> SmallVec<[Effect<BookingFlowAction>; 4]> {
    ///         match action {
    ///             BookingFlowAction::Next => smallvec![Effect::None],
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable and cancellable.
pub mod effect {
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identifier grouping cancellable effects.
    ///
    /// Starting a cancellable effect cancels any in-flight effect with the
    /// same id, which is how trailing debounce is expressed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EffectId(pub &'static str);

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for debounce windows and timeouts)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Effect that can be cancelled by id
        ///
        /// Starting it cancels any running effect registered under the same id.
        Cancellable {
            /// Cancellation group
            id: EffectId,
            /// The wrapped effect
            effect: Box<Effect<Action>>,
        },

        /// Cancel the running effect registered under the id, if any
        Cancel(EffectId),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                }
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                }
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Trailing debounce: dispatch `action` after `duration` unless another
        /// effect with the same `id` starts first.
        #[must_use]
        pub fn debounce(id: EffectId, duration: Duration, action: Action) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(Effect::Delay {
                    duration,
                    action: Box::new(action),
                }),
            }
        }

        /// Wrap an async computation
        #[must_use]
        pub fn future<F>(future: F) -> Effect<Action>
        where
            F: std::future::Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(future))
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = FixedClock::new(time);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by the operating system.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Local wall-clock time for the given UTC offset.
    ///
    /// Slot times are local times of day, so every bookability check compares
    /// against this value rather than against UTC.
    #[must_use]
    pub fn local_now(clock: &dyn Clock, offset: FixedOffset) -> NaiveDateTime {
        clock.now().with_timezone(&offset).naive_local()
    }

    /// Product analytics events emitted by the booking flow.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum AnalyticsEvent {
        /// Customer reached the contact step and left the email field
        BookingStarted {
            /// Product being booked
            product_id: String,
            /// Package chosen at the time, if any
            package_id: Option<String>,
        },
        /// Payment was verified and a booking code issued
        BookingCompleted {
            /// Product booked
            product_id: String,
            /// Server-issued booking code
            booking_code: String,
        },
    }

    /// Analytics sink.
    pub trait Analytics: Send + Sync {
        /// Record an event. Must not block and must not fail the caller.
        fn track(&self, event: AnalyticsEvent);
    }
}
