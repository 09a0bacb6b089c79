//! Cart Sync Engine
//!
//! Keeps the local snapshot, the server shadow copy and other contexts'
//! recovery banners convergent with as little chatter as possible:
//!
//! 1. Changes are deduplicated by [`CartSnapshot::content_hash`]
//! 2. The local copy is written immediately, so closing the context loses nothing
//! 3. The server POST is debounced (3 s) and so is the cross-context broadcast (5 s)
//! 4. A clear cancels both, closes the server copy and suppresses late
//!    changes until re-armed
//! 5. On unload the pending POST bypasses the debounce through an [`UnloadBeacon`]
//!
//! Timers are [`Debouncer`]s over the injected [`Clock`]; nothing fires until
//! [`CartSyncEngine::tick`] runs. Production code drives ticks with
//! [`CartSyncEngine::spawn_driver`], tests call `tick` after moving a manual
//! clock.

use crate::beacon::UnloadBeacon;
use crate::store::CartSnapshotStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tourbook_api::{BookingApi, SaveCartRequest};
use tourbook_core::broadcast::{CartBroadcaster, CartUpdate};
use tourbook_core::cart::{CartKey, CartSnapshot, CartStatus};
use tourbook_core::catalog::ProductId;
use tourbook_core::environment::Clock;
use tourbook_runtime::Debouncer;
use tracing::{debug, info, warn};

/// Debounce windows of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period before the server POST
    pub server_delay: Duration,
    /// Quiet period before the cross-context broadcast
    pub broadcast_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_delay: Duration::from_secs(3),
            broadcast_delay: Duration::from_secs(5),
        }
    }
}

/// What [`CartSyncEngine::record_change`] did with a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Email not blurred yet, or the snapshot belongs to another key
    NotArmed,
    /// The cart was cleared; late changes are dropped
    Suppressed,
    /// Same content as the last recorded snapshot
    Unchanged,
    /// Content changed and both syncs were scheduled
    Saved {
        /// Whether the local write succeeded
        stored_locally: bool,
    },
}

/// What one [`CartSyncEngine::tick`] fired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A broadcast was published
    pub broadcast: bool,
    /// A server POST succeeded
    pub posted: bool,
    /// A server POST failed (logged and dropped)
    pub post_failed: bool,
    /// A cleared cart was closed on the server
    pub closed: bool,
}

/// How [`CartSyncEngine::flush_on_unload`] delivered the pending save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Idle,
    /// Handed to the unload beacon
    Beacon,
    /// Sent as a detached background request
    KeepAlive,
    /// No beacon and no async runtime to send it on
    Dropped,
}

#[derive(Debug)]
struct SyncState {
    armed: Option<CartKey>,
    last_hash: Option<(CartKey, String)>,
    cleared: bool,
    cleared_at: HashMap<CartKey, DateTime<Utc>>,
    closing: Vec<CartSnapshot>,
    broadcast: Debouncer<CartUpdate>,
    server: Debouncer<CartSnapshot>,
}

/// Abandoned-cart synchronization for one booking session.
pub struct CartSyncEngine {
    store: CartSnapshotStore,
    api: Arc<dyn BookingApi>,
    broadcaster: Arc<dyn CartBroadcaster>,
    clock: Arc<dyn Clock>,
    beacon: Option<Arc<dyn UnloadBeacon>>,
    state: Mutex<SyncState>,
    // Serializes server writes so a close never overtakes an older save.
    server_lane: tokio::sync::Mutex<()>,
}

impl CartSyncEngine {
    /// Create an engine with no unload beacon
    #[must_use]
    pub fn new(
        store: CartSnapshotStore,
        api: Arc<dyn BookingApi>,
        broadcaster: Arc<dyn CartBroadcaster>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            api,
            broadcaster,
            state: Mutex::new(SyncState {
                armed: None,
                last_hash: None,
                cleared: false,
                cleared_at: HashMap::new(),
                closing: Vec::new(),
                broadcast: Debouncer::new(config.broadcast_delay, Arc::clone(&clock)),
                server: Debouncer::new(config.server_delay, Arc::clone(&clock)),
            }),
            clock,
            beacon: None,
            server_lane: tokio::sync::Mutex::new(()),
        }
    }

    /// Use `beacon` for [`CartSyncEngine::flush_on_unload`]
    #[must_use]
    pub fn with_beacon(mut self, beacon: Arc<dyn UnloadBeacon>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    /// Snapshot store the engine writes through
    #[must_use]
    pub const fn store(&self) -> &CartSnapshotStore {
        &self.store
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start syncing changes for `key` (the customer left the email field).
    ///
    /// Re-arming lifts a previous clear. The dedup hash is kept when the key
    /// is unchanged.
    pub fn arm(&self, key: CartKey) {
        let mut state = self.state();
        if state.last_hash.as_ref().is_some_and(|(hashed, _)| hashed != &key) {
            state.last_hash = None;
        }
        state.cleared = false;
        debug!(%key, "Cart sync armed");
        state.armed = Some(key);
    }

    /// Key currently armed
    #[must_use]
    pub fn armed_key(&self) -> Option<CartKey> {
        self.state().armed.clone()
    }

    /// Whether the armed cart was cleared
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.state().cleared
    }

    /// Whether a server POST is waiting for its quiet period
    #[must_use]
    pub fn has_pending_server_write(&self) -> bool {
        self.state().server.is_pending()
    }

    /// Record the current form content.
    ///
    /// Stamps `updated_at`, writes locally right away and (re)schedules the
    /// broadcast and the server POST. A local write failure does not stop the
    /// server sync.
    pub fn record_change(&self, mut snapshot: CartSnapshot) -> ChangeOutcome {
        let key = snapshot.key();
        let mut state = self.state();

        if state.cleared {
            metrics::counter!("cart.sync.suppressed").increment(1);
            debug!(%key, "Dropping cart change after clear");
            return ChangeOutcome::Suppressed;
        }
        if state.armed.as_ref() != Some(&key) {
            return ChangeOutcome::NotArmed;
        }

        let hash = snapshot.content_hash();
        if state
            .last_hash
            .as_ref()
            .is_some_and(|(hashed, previous)| hashed == &key && previous == &hash)
        {
            metrics::counter!("cart.sync.deduplicated").increment(1);
            debug!(%key, "Cart content unchanged, skipping sync");
            return ChangeOutcome::Unchanged;
        }
        state.last_hash = Some((key, hash));

        snapshot.updated_at = self.clock.now();
        let stored_locally = self.store.save(&snapshot);
        state.broadcast.schedule(CartUpdate::saved(snapshot.clone()));
        state.server.schedule(snapshot);
        metrics::counter!("cart.sync.saved").increment(1);

        ChangeOutcome::Saved { stored_locally }
    }

    /// Fire whatever debounced work is due.
    ///
    /// Close records of cleared carts are always due and go out before the
    /// next save. Server writes from concurrent ticks never interleave.
    pub async fn tick(&self) -> TickReport {
        let _lane = self.server_lane.lock().await;
        let (update, closing, snapshot) = {
            let mut state = self.state();
            (
                state.broadcast.take_due(),
                std::mem::take(&mut state.closing),
                state.server.take_due(),
            )
        };

        let mut report = TickReport::default();
        if let Some(update) = update {
            self.broadcaster.publish(update);
            report.broadcast = true;
        }
        for closed in closing {
            if self.post(&closed).await {
                report.closed = true;
            } else {
                report.post_failed = true;
            }
        }
        if let Some(snapshot) = snapshot {
            if self.post(&snapshot).await {
                report.posted = true;
            } else {
                report.post_failed = true;
            }
        }
        report
    }

    async fn post(&self, snapshot: &CartSnapshot) -> bool {
        match self.api.save_abandoned_cart(&SaveCartRequest::from(snapshot)).await {
            Ok(()) => {
                metrics::counter!("cart.sync.posted").increment(1);
                true
            }
            Err(error) => {
                metrics::counter!("cart.sync.post_failed").increment(1);
                warn!(key = %snapshot.key(), %error, "Background cart sync failed");
                false
            }
        }
    }

    /// Run [`CartSyncEngine::tick`] every `interval` until the task is aborted.
    pub fn spawn_driver(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.tick().await;
            }
        })
    }

    /// Clear the cart under `key`: delete it locally, cancel pending syncs,
    /// tell other contexts right away, and suppress late changes.
    ///
    /// A closed record stamped now is queued for the server and sent by the
    /// next [`CartSyncEngine::tick`], so the shadow copy cannot bring the cart
    /// back. Until then [`CartSyncEngine::reconcile`] ignores server copies
    /// older than the clear.
    pub fn clear(&self, key: &CartKey) {
        let now = self.clock.now();
        let local = self.store.load_key(key);
        {
            let mut state = self.state();
            state.broadcast.cancel();
            let pending = state.server.cancel().filter(|pending| &pending.key() == key);
            let mut closed = pending.or(local).unwrap_or_else(|| {
                CartSnapshot::new(key.product_id.clone(), key.email.clone(), now)
            });
            closed.status = CartStatus::Closed;
            closed.updated_at = now;
            state.closing.retain(|queued| &queued.key() != key);
            state.closing.push(closed);
            state.cleared_at.insert(key.clone(), now);
            state.cleared = true;
            state.last_hash = None;
        }
        self.store.remove_key(key);
        self.broadcaster.publish(CartUpdate::cleared(key.storage_key()));
        info!(%key, "Cart cleared");
    }

    /// Whether a close record is waiting for the next tick
    #[must_use]
    pub fn has_pending_close(&self) -> bool {
        !self.state().closing.is_empty()
    }

    /// Deliver the pending server save now, bypassing the debounce.
    ///
    /// Uses the unload beacon when one is configured and accepts the body,
    /// otherwise a detached request on the current tokio runtime. Queued close
    /// records go first. A pending broadcast is published immediately as well.
    pub fn flush_on_unload(&self) -> FlushOutcome {
        let (update, mut requests) = {
            let mut state = self.state();
            let mut requests: Vec<SaveCartRequest> =
                state.closing.drain(..).map(|closed| SaveCartRequest::from(&closed)).collect();
            if let Some(snapshot) = state.server.flush() {
                requests.push(SaveCartRequest::from(&snapshot));
            }
            (state.broadcast.flush(), requests)
        };
        if let Some(update) = update {
            self.broadcaster.publish(update);
        }
        if requests.is_empty() {
            return FlushOutcome::Idle;
        }

        if let Some(beacon) = &self.beacon {
            requests.retain(|request| !beacon.send(request));
            if requests.is_empty() {
                metrics::counter!("cart.sync.beacon").increment(1);
                return FlushOutcome::Beacon;
            }
            debug!("Unload beacon refused cart, falling back to keep-alive request");
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let api = Arc::clone(&self.api);
                handle.spawn(async move {
                    for request in requests {
                        if let Err(error) = api.save_abandoned_cart(&request).await {
                            warn!(%error, "Keep-alive cart sync failed");
                        }
                    }
                });
                FlushOutcome::KeepAlive
            }
            Err(_) => {
                warn!(pending = requests.len(), "No runtime to flush cart on unload");
                FlushOutcome::Dropped
            }
        }
    }

    /// Pick the newer of the local and server copies.
    ///
    /// The winner is written back locally. Returns `None` when neither copy
    /// exists or the winner is no longer open. A server failure falls back to
    /// the local copy. Local copies win ties. A server copy no newer than a
    /// clear made by this engine is ignored.
    pub async fn reconcile(&self, product_id: &ProductId, email: &str) -> Option<CartSnapshot> {
        let local = self.store.load(product_id, email);
        let server = match self.api.abandoned_cart_status(email, product_id).await {
            Ok(server) => server.filter(|server| !self.cleared_since(server)),
            Err(error) => {
                warn!(%product_id, %error, "Cart status unavailable, using local copy");
                None
            }
        };

        let winner = match (local, server) {
            (Some(local), Some(server)) if server.updated_at > local.updated_at => {
                self.store.save(&server);
                server
            }
            (Some(local), _) => local,
            (None, Some(server)) => {
                self.store.save(&server);
                server
            }
            (None, None) => return None,
        };

        if !winner.is_open() {
            debug!(key = %winner.key(), "Reconciled cart is closed");
            return None;
        }

        self.state().last_hash = Some((winner.key(), winner.content_hash()));
        Some(winner)
    }

    fn cleared_since(&self, snapshot: &CartSnapshot) -> bool {
        self.state()
            .cleared_at
            .get(&snapshot.key())
            .is_some_and(|cleared_at| snapshot.updated_at <= *cleared_at)
    }

    /// Updates published by any context sharing the broadcaster
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartUpdate> {
        self.broadcaster.subscribe()
    }
}

impl std::fmt::Debug for CartSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSyncEngine")
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}
