//! # Tourbook Runtime
//!
//! Runtime implementation for the Tourbook booking client.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling, and the clock-driven [`Debouncer`] used by
//! components that batch writes outside a reducer.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation registry**: Tracks cancellable effects by id (trailing debounce)
//! - **Debouncer**: Explicit `schedule`/`cancel`/`flush` state for trailing writes
//!
//! ## Example
//!
//! ```ignore
//! use tourbook_runtime::Store;
//!
//! let store = Store::new(
//!     BookingFlowState::new(product_id),
//!     BookingFlowReducer::new(),
//!     environment,
//! );
//!
//! // Send an action
//! store.send(BookingFlowAction::Next).await?;
//!
//! // Read state
//! let step = store.state(|s| s.step).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tourbook_core::{effect::Effect, reducer::Reducer};

pub mod debounce;

pub use debounce::Debouncer;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// An effect execution failed
        ///
        /// This error is logged but does not halt the store.
        /// Effects are fire-and-forget operations.
        #[error("Effect execution failed: {0}")]
        EffectFailed(String),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects started by
/// that action. Effects started by feedback actions are not included.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle and the tracking context feeding it
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    ///
    /// Cancelled effects count as complete.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed or cancelled)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Aborted tasks drop their future, so the counter stays correct for
/// cancelled effects too.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        Arc, DecrementGuard, Duration, Effect, EffectHandle, EffectTracking, Ordering, Reducer,
        RwLock, StoreError,
    };
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::AtomicU64;
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::broadcast;
    use tokio::task::AbortHandle;
    use tourbook_core::effect::EffectId;

    /// A running cancellable effect
    struct Registration {
        token: u64,
        handle: AbortHandle,
    }

    type Registry = Arc<Mutex<HashMap<EffectId, Registration>>>;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation by id)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        cancellations: Registry,
        next_token: Arc<AtomicU64>,
        /// Actions produced by effects, for observers waiting on results.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast buffers 16 actions; use
        /// [`Store::with_broadcast_capacity`] for chattier flows.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new Store with custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                cancellations: Arc::new(Mutex::new(HashMap::new())),
                next_token: Arc::new(AtomicU64::new(0)),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects asynchronously
        /// 4. Effects may produce more actions (feedback loop)
        ///
        /// `send()` returns after starting effect execution, not completion.
        ///
        /// # Errors
        ///
        /// Currently infallible; the `Result` leaves room for admission control.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            tracing::debug!("Processing action");
            metrics::counter!("store.commands.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();
                self.reducer.reduce(&mut *state, action, &self.environment)
            };

            tracing::trace!("Executing {} effects", effects.len());
            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, so a fast
        /// effect cannot slip its result past the observer.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action within `timeout`
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        }
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let step = store.state(|s| s.step).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Whether a cancellable effect is currently registered under `id`
        #[must_use]
        pub fn is_running(&self, id: EffectId) -> bool {
            self.cancellations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&id)
                .is_some_and(|registration| !registration.handle.is_finished())
        }

        /// Feed an action produced by an effect back into the store
        async fn feedback(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            let _ = self.action_broadcast.send(action.clone());
            let _ = self.send(action).await;
        }

        /// Execute an effect with tracking
        ///
        /// # Effect Types
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        /// - `Cancellable`: Cancels the effect running under the same id, then starts this one
        /// - `Cancel`: Cancels the effect running under the id
        ///
        /// Effect failures are logged and never halt the store.
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                }
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking);
                    }
                }
                Effect::Cancellable { id, effect } => {
                    self.start_cancellable(id, *effect, tracking);
                }
                Effect::Cancel(id) => {
                    self.cancel(id);
                }
                effect @ (Effect::Future(_) | Effect::Delay { .. } | Effect::Sequential(_)) => {
                    tracking.increment();
                    let guard = DecrementGuard(tracking.clone());
                    let tracking = tracking.clone();
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        store.run_inline(effect, tracking).await;
                    });
                }
            }
        }

        /// Run an effect to completion on the current task
        fn run_inline(
            self,
            effect: Effect<A>,
            tracking: EffectTracking,
        ) -> Pin<Box<dyn Future<Output = ()> + Send>>
        where
            R: Clone,
            E: Clone,
        {
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        metrics::counter!("store.effects.executed", "type" => "future")
                            .increment(1);
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action");
                            self.feedback(action).await;
                        }
                    }
                    Effect::Delay { duration, action } => {
                        metrics::counter!("store.effects.executed", "type" => "delay")
                            .increment(1);
                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay elapsed after {:?}", duration);
                        self.feedback(*action).await;
                    }
                    Effect::Parallel(effects) => {
                        let runs = effects
                            .into_iter()
                            .map(|effect| self.clone().run_inline(effect, tracking.clone()));
                        futures::future::join_all(runs).await;
                    }
                    Effect::Sequential(effects) => {
                        metrics::counter!("store.effects.executed", "type" => "sequential")
                            .increment(1);
                        for effect in effects {
                            self.clone().run_inline(effect, tracking.clone()).await;
                        }
                    }
                    Effect::Cancellable { id, effect } => {
                        self.start_cancellable(id, *effect, &tracking);
                    }
                    Effect::Cancel(id) => {
                        self.cancel(id);
                    }
                }
            })
        }

        /// Start `effect` under `id`, cancelling whatever ran under it before
        fn start_cancellable(&self, id: EffectId, effect: Effect<A>, tracking: &EffectTracking)
        where
            R: Clone,
            E: Clone,
        {
            metrics::counter!("store.effects.executed", "type" => "cancellable").increment(1);
            tracking.increment();
            let guard = DecrementGuard(tracking.clone());
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);

            // Held across spawn so the task cannot unregister before it is registered.
            let mut registry = self
                .cancellations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            if let Some(previous) = registry.remove(&id) {
                previous.handle.abort();
                metrics::counter!("store.effects.cancelled").increment(1);
                tracing::debug!(effect_id = %id, "Superseded cancellable effect");
            }

            let store = self.clone();
            let inner_tracking = tracking.clone();
            let registry_ref = Arc::clone(&self.cancellations);
            let task = tokio::spawn(async move {
                let _guard = guard;
                store.run_inline(effect, inner_tracking).await;
                let mut registry = registry_ref.lock().unwrap_or_else(PoisonError::into_inner);
                if registry.get(&id).is_some_and(|r| r.token == token) {
                    registry.remove(&id);
                }
            });

            registry.insert(
                id,
                Registration {
                    token,
                    handle: task.abort_handle(),
                },
            );
        }

        /// Cancel the effect registered under `id`
        fn cancel(&self, id: EffectId) {
            let removed = self
                .cancellations
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            if let Some(registration) = removed {
                registration.handle.abort();
                metrics::counter!("store.effects.cancelled").increment(1);
                tracing::debug!(effect_id = %id, "Cancelled effect");
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                cancellations: Arc::clone(&self.cancellations),
                next_token: Arc::clone(&self.next_token),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
