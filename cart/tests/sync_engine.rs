//! Integration tests for the Cart Sync Engine
//!
//! Time is driven by a `ManualClock`; debounced work only fires on `tick()`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::TimeDelta;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tourbook_api::{ApiError, SaveCartRequest};
use tourbook_cart::{
    CartSnapshotStore, CartSyncEngine, ChangeOutcome, FlushOutcome, MemoryStorage, SyncConfig,
    UnloadBeacon,
};
use tourbook_core::broadcast::{CartBroadcaster, LocalBroadcastChannel};
use tourbook_core::cart::{CartKey, CartSnapshot, CartStatus};
use tourbook_core::catalog::{PackageId, ProductId};
use tourbook_core::environment::Clock;
use tourbook_testing::{ManualClock, MockBookingApi, test_clock};

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    clock: ManualClock,
    storage: MemoryStorage,
    api: MockBookingApi,
    channel: Arc<LocalBroadcastChannel>,
    engine: CartSyncEngine,
}

fn harness_with(storage: MemoryStorage) -> Harness {
    let clock = ManualClock::new(test_clock().now());
    let api = MockBookingApi::new();
    let channel = Arc::new(LocalBroadcastChannel::default());
    let engine = CartSyncEngine::new(
        CartSnapshotStore::new(Arc::new(storage.clone())),
        Arc::new(api.clone()),
        channel.clone(),
        Arc::new(clock.clone()),
        SyncConfig::default(),
    );
    Harness {
        clock,
        storage,
        api,
        channel,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(MemoryStorage::new())
}

fn key() -> CartKey {
    CartKey::new(ProductId::new("tour-42"), "ada@example.com")
}

fn cart(name: &str) -> CartSnapshot {
    let mut cart =
        CartSnapshot::new(ProductId::new("tour-42"), "ada@example.com", test_clock().now());
    cart.customer_name = name.to_string();
    cart.customer_phone = "+1 555 0100".to_string();
    cart.package_id = Some(PackageId::new("sunrise"));
    cart.selected_date = Some("2025-02-01".to_string());
    cart.adults = 2;
    cart.total_amount = 90.0;
    cart
}

#[derive(Default)]
struct RecordingBeacon {
    refuse: bool,
    sent: Mutex<Vec<SaveCartRequest>>,
}

impl UnloadBeacon for RecordingBeacon {
    fn send(&self, request: &SaveCartRequest) -> bool {
        if self.refuse {
            return false;
        }
        self.sent.lock().unwrap().push(request.clone());
        true
    }
}

// ============================================================================
// Dedup and debounce
// ============================================================================

#[tokio::test]
async fn identical_content_posts_once() {
    let h = harness();
    h.engine.arm(key());

    assert_eq!(
        h.engine.record_change(cart("Ada")),
        ChangeOutcome::Saved {
            stored_locally: true
        }
    );
    assert_eq!(h.engine.record_change(cart("Ada")), ChangeOutcome::Unchanged);

    h.clock.advance(Duration::from_secs(3));
    assert!(h.engine.tick().await.posted);
    h.clock.advance(Duration::from_secs(10));
    assert!(!h.engine.tick().await.posted);

    assert_eq!(h.api.saved_carts().len(), 1);
}

#[tokio::test]
async fn rapid_edits_coalesce_into_latest_post() {
    let h = harness();
    h.engine.arm(key());

    h.engine.record_change(cart("A"));
    h.clock.advance(Duration::from_secs(1));
    h.engine.record_change(cart("Ad"));
    h.clock.advance(Duration::from_secs(1));
    h.engine.record_change(cart("Ada"));

    h.clock.advance(Duration::from_millis(2900));
    assert!(!h.engine.tick().await.posted);
    h.clock.advance(Duration::from_millis(100));
    assert!(h.engine.tick().await.posted);

    let saved = h.api.saved_carts();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].customer_data.name, "Ada");
    assert_eq!(saved[0].updated_at, test_clock().now() + TimeDelta::seconds(2));
}

#[tokio::test]
async fn local_copy_is_written_immediately() {
    let h = harness();
    h.engine.arm(key());
    h.clock.advance(Duration::from_secs(30));
    h.engine.record_change(cart("Ada"));

    let stored = h
        .engine
        .store()
        .load(&ProductId::new("tour-42"), "ada@example.com")
        .unwrap();
    assert_eq!(stored.customer_name, "Ada");
    assert_eq!(stored.updated_at, h.clock.now());
    assert!(h.api.saved_carts().is_empty());
}

#[tokio::test]
async fn broadcast_trails_server_post() {
    let h = harness();
    let mut rx = h.channel.subscribe();
    h.engine.arm(key());
    h.engine.record_change(cart("Ada"));

    h.clock.advance(Duration::from_secs(3));
    let report = h.engine.tick().await;
    assert!(report.posted);
    assert!(!report.broadcast);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    h.clock.advance(Duration::from_secs(2));
    assert!(h.engine.tick().await.broadcast);
    let update = rx.try_recv().unwrap();
    assert_eq!(update.key, "abandoned_cart_tour-42_ada@example.com");
    assert_eq!(update.cart.unwrap().customer_name, "Ada");
}

#[tokio::test]
async fn changes_before_arming_are_ignored() {
    let h = harness();
    assert_eq!(h.engine.record_change(cart("Ada")), ChangeOutcome::NotArmed);

    h.engine.arm(CartKey::new(ProductId::new("tour-42"), "someone@else.com"));
    assert_eq!(h.engine.record_change(cart("Ada")), ChangeOutcome::NotArmed);
    assert!(h.storage.is_empty());
}

// ============================================================================
// Clear wins
// ============================================================================

#[tokio::test]
async fn clear_cancels_pending_work_and_suppresses_late_changes() {
    let h = harness();
    let mut rx = h.channel.subscribe();
    h.engine.arm(key());
    h.engine.record_change(cart("Ada"));
    h.clock.advance(Duration::from_secs(1));

    h.engine.clear(&key());

    let update = rx.try_recv().unwrap();
    assert!(update.cart.is_none());
    assert!(h.storage.is_empty());
    assert!(h.engine.is_cleared());
    assert!(!h.engine.has_pending_server_write());

    // A late change for the same key must not resurrect the cart.
    assert_eq!(h.engine.record_change(cart("Ada L.")), ChangeOutcome::Suppressed);

    h.clock.advance(Duration::from_secs(10));
    let report = h.engine.tick().await;
    assert!(!report.posted);
    assert!(!report.broadcast);
    assert!(report.closed);
    assert!(h.storage.is_empty());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // Only the close record reached the server, carrying the last content.
    let saved = h.api.saved_carts();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].status, CartStatus::Closed);
    assert_eq!(saved[0].customer_data.name, "Ada");
    assert_eq!(saved[0].updated_at, h.clock.now() - TimeDelta::seconds(10));
}

#[tokio::test]
async fn clear_ignores_older_server_copy_on_reconcile() {
    let h = harness();
    h.engine.arm(key());
    h.engine.record_change(cart("Ada"));
    h.clock.advance(Duration::from_secs(3));
    assert!(h.engine.tick().await.posted);

    // The server still holds the open copy posted before the clear.
    let mut server = cart("Ada");
    server.updated_at = h.clock.now();
    h.api.respond_server_cart(Ok(Some(server.clone())));
    h.api
        .respond_save_cart(Err(ApiError::RequestFailed("offline".to_string())));

    h.clock.advance(Duration::from_secs(1));
    h.engine.clear(&key());
    assert!(h.engine.tick().await.post_failed);

    assert!(
        h.engine
            .reconcile(&ProductId::new("tour-42"), "ada@example.com")
            .await
            .is_none()
    );
    assert!(h.storage.is_empty());

    // A copy saved after the clear is recovered normally.
    server.updated_at = h.clock.now() + TimeDelta::minutes(5);
    h.api.respond_server_cart(Ok(Some(server)));
    assert!(
        h.engine
            .reconcile(&ProductId::new("tour-42"), "ada@example.com")
            .await
            .is_some()
    );
}

#[tokio::test]
async fn clear_without_stored_content_still_closes_server_copy() {
    let h = harness();
    h.engine.clear(&key());
    assert!(h.engine.has_pending_close());

    assert!(h.engine.tick().await.closed);
    assert!(!h.engine.has_pending_close());
    let saved = h.api.saved_carts();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].email, "ada@example.com");
    assert_eq!(saved[0].status, CartStatus::Closed);
}

#[tokio::test]
async fn re_arming_after_clear_resumes_sync() {
    let h = harness();
    h.engine.arm(key());
    h.engine.record_change(cart("Ada"));
    h.engine.clear(&key());

    h.engine.arm(key());
    assert_eq!(
        h.engine.record_change(cart("Ada")),
        ChangeOutcome::Saved {
            stored_locally: true
        }
    );
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn storage_quota_does_not_stop_server_sync() {
    let h = harness_with(MemoryStorage::with_quota(16));
    h.engine.arm(key());

    assert_eq!(
        h.engine.record_change(cart("Ada")),
        ChangeOutcome::Saved {
            stored_locally: false
        }
    );

    h.clock.advance(Duration::from_secs(3));
    assert!(h.engine.tick().await.posted);
    assert_eq!(h.api.saved_carts().len(), 1);
}

#[tokio::test]
async fn failed_post_is_swallowed() {
    let h = harness();
    h.api
        .respond_save_cart(Err(ApiError::RequestFailed("offline".to_string())));
    h.engine.arm(key());
    h.engine.record_change(cart("Ada"));

    h.clock.advance(Duration::from_secs(3));
    let report = h.engine.tick().await;
    assert!(report.post_failed);
    assert!(!report.posted);
    assert!(
        h.engine
            .store()
            .load(&ProductId::new("tour-42"), "ada@example.com")
            .is_some()
    );

    // The next edit re-attempts through the debounce window.
    h.api.respond_save_cart(Ok(()));
    h.engine.record_change(cart("Ada Lovelace"));
    h.clock.advance(Duration::from_secs(3));
    assert!(h.engine.tick().await.posted);
}

// ============================================================================
// Unload flush
// ============================================================================

#[tokio::test]
async fn unload_flush_uses_beacon_and_bypasses_debounce() {
    let h = harness();
    let beacon = Arc::new(RecordingBeacon::default());
    let engine = CartSyncEngine::new(
        CartSnapshotStore::new(Arc::new(h.storage.clone())),
        Arc::new(h.api.clone()),
        h.channel.clone(),
        Arc::new(h.clock.clone()),
        SyncConfig::default(),
    )
    .with_beacon(beacon.clone());

    assert_eq!(engine.flush_on_unload(), FlushOutcome::Idle);

    engine.arm(key());
    engine.record_change(cart("Ada"));
    h.clock.advance(Duration::from_millis(500));

    assert_eq!(engine.flush_on_unload(), FlushOutcome::Beacon);
    let sent = beacon.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].customer_data.name, "Ada");

    h.clock.advance(Duration::from_secs(10));
    assert!(!engine.tick().await.posted);
    assert!(h.api.saved_carts().is_empty());
}

#[tokio::test]
async fn unload_flush_falls_back_to_keep_alive_request() {
    let h = harness();
    let engine = CartSyncEngine::new(
        CartSnapshotStore::new(Arc::new(h.storage.clone())),
        Arc::new(h.api.clone()),
        h.channel.clone(),
        Arc::new(h.clock.clone()),
        SyncConfig::default(),
    )
    .with_beacon(Arc::new(RecordingBeacon {
        refuse: true,
        ..RecordingBeacon::default()
    }));

    engine.arm(key());
    engine.record_change(cart("Ada"));
    assert_eq!(engine.flush_on_unload(), FlushOutcome::KeepAlive);

    for _ in 0..100 {
        if !h.api.saved_carts().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.api.saved_carts().len(), 1);
}

#[tokio::test]
async fn unload_flush_sends_pending_close_through_beacon() {
    let h = harness();
    let beacon = Arc::new(RecordingBeacon::default());
    let engine = CartSyncEngine::new(
        CartSnapshotStore::new(Arc::new(h.storage.clone())),
        Arc::new(h.api.clone()),
        h.channel.clone(),
        Arc::new(h.clock.clone()),
        SyncConfig::default(),
    )
    .with_beacon(beacon.clone());

    engine.arm(key());
    engine.record_change(cart("Ada"));
    engine.clear(&key());

    assert_eq!(engine.flush_on_unload(), FlushOutcome::Beacon);
    let sent = beacon.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].status, CartStatus::Closed);
    assert!(!engine.has_pending_close());
}

#[test]
fn unload_flush_without_runtime_or_beacon_drops() {
    let h = harness();
    h.engine.arm(key());
    h.engine.record_change(cart("Ada"));
    assert_eq!(h.engine.flush_on_unload(), FlushOutcome::Dropped);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn newer_server_copy_wins_and_overwrites_local() {
    let h = harness();
    let store = h.engine.store();
    store.save(&cart("Local"));

    let mut server = cart("Server");
    server.updated_at = test_clock().now() + TimeDelta::hours(1);
    h.api.respond_server_cart(Ok(Some(server.clone())));

    let winner = h
        .engine
        .reconcile(&ProductId::new("tour-42"), "ada@example.com")
        .await
        .unwrap();
    assert_eq!(winner, server);
    assert_eq!(
        store.load(&ProductId::new("tour-42"), "ada@example.com"),
        Some(server)
    );
}

#[tokio::test]
async fn newer_local_copy_wins() {
    let h = harness();
    let mut local = cart("Local");
    local.updated_at = test_clock().now() + TimeDelta::hours(2);
    h.engine.store().save(&local);
    h.api.respond_server_cart(Ok(Some(cart("Server"))));

    let winner = h
        .engine
        .reconcile(&ProductId::new("tour-42"), "ada@example.com")
        .await;
    assert_eq!(winner, Some(local));
}

#[tokio::test]
async fn closed_winner_means_no_active_cart() {
    let h = harness();
    h.engine.store().save(&cart("Local"));

    let mut server = cart("Server");
    server.status = CartStatus::Closed;
    server.updated_at = test_clock().now() + TimeDelta::minutes(5);
    h.api.respond_server_cart(Ok(Some(server)));

    assert!(
        h.engine
            .reconcile(&ProductId::new("tour-42"), "ada@example.com")
            .await
            .is_none()
    );
    let stored = h
        .engine
        .store()
        .load(&ProductId::new("tour-42"), "ada@example.com")
        .unwrap();
    assert_eq!(stored.status, CartStatus::Closed);
}

#[tokio::test]
async fn server_failure_falls_back_to_local() {
    let h = harness();
    h.engine.store().save(&cart("Local"));
    h.api.respond_server_cart(Err(ApiError::Status {
        status: 500,
        message: "boom".to_string(),
    }));

    let winner = h
        .engine
        .reconcile(&ProductId::new("tour-42"), "ada@example.com")
        .await
        .unwrap();
    assert_eq!(winner.customer_name, "Local");

    h.api.respond_server_cart(Ok(None));
    h.engine.store().remove(&ProductId::new("tour-42"), "ada@example.com");
    assert!(
        h.engine
            .reconcile(&ProductId::new("tour-42"), "ada@example.com")
            .await
            .is_none()
    );
}

#[tokio::test]
async fn recovered_content_is_not_re_posted() {
    let h = harness();
    h.api.respond_server_cart(Ok(Some(cart("Server"))));
    h.engine
        .reconcile(&ProductId::new("tour-42"), "ada@example.com")
        .await
        .unwrap();

    h.engine.arm(key());
    assert_eq!(h.engine.record_change(cart("Server")), ChangeOutcome::Unchanged);
}

// ============================================================================
// Driver
// ============================================================================

#[tokio::test(start_paused = true)]
async fn driver_ticks_in_background() {
    let h = harness();
    let engine = Arc::new(h.engine);
    let driver = engine.spawn_driver(Duration::from_millis(250));

    engine.arm(key());
    engine.record_change(cart("Ada"));
    h.clock.advance(Duration::from_secs(3));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.api.saved_carts().len(), 1);

    driver.abort();
}
