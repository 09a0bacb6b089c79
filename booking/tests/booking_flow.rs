//! Integration tests for the booking flow running on the Store
//!
//! Time is paused: sleeping lets every spawned effect (debounce timers,
//! mocked backend latency, feedback actions) run to completion in virtual time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use std::time::Duration;
use tourbook_api::{ApiError, BookingApi, PaymentVerification};
use tourbook_booking::{
    BookingEnvironment, BookingFlowAction, BookingFlowReducer, BookingFlowState, BookingLink,
    PackagesOutcome, Query, Step,
};
use tourbook_cart::{CartSnapshotStore, CartSyncEngine, MemoryStorage, SyncConfig};
use tourbook_core::broadcast::LocalBroadcastChannel;
use tourbook_core::cart::{CartSnapshot, CartStatus};
use tourbook_core::catalog::{
    AvailabilityRecord, AvailabilityStatus, PackageId, PackageSummary, ProductId, SlotId, TimeSlot,
};
use tourbook_core::environment::{AnalyticsEvent, Clock};
use tourbook_runtime::Store;
use tourbook_testing::helpers::ymd;
use tourbook_testing::{ApiCall, MockBookingApi, MockPaymentWidget, RecordingAnalytics, test_clock};

// ============================================================================
// Test Fixtures
// ============================================================================

type FlowStore = Store<BookingFlowState, BookingFlowAction, BookingEnvironment, BookingFlowReducer>;

struct Harness {
    store: FlowStore,
    api: MockBookingApi,
    widget: MockPaymentWidget,
    analytics: RecordingAnalytics,
    engine: Arc<CartSyncEngine>,
}

fn harness() -> Harness {
    let api = MockBookingApi::new();
    let widget = MockPaymentWidget::approving();
    let analytics = RecordingAnalytics::new();
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let api_dyn: Arc<dyn BookingApi> = Arc::new(api.clone());

    let engine = Arc::new(CartSyncEngine::new(
        CartSnapshotStore::new(Arc::new(MemoryStorage::new())),
        Arc::clone(&api_dyn),
        Arc::new(LocalBroadcastChannel::default()),
        Arc::clone(&clock),
        SyncConfig::default(),
    ));
    let env = BookingEnvironment::new(
        api_dyn,
        clock,
        Arc::clone(&engine),
        Arc::new(analytics.clone()),
        Arc::new(widget.clone()),
    );
    let store = Store::new(
        BookingFlowState::new(ProductId::new("prod-1")),
        BookingFlowReducer::new(),
        env,
    );

    Harness {
        store,
        api,
        widget,
        analytics,
        engine,
    }
}

fn record(id: &str, name: &str) -> AvailabilityRecord {
    AvailabilityRecord {
        status: AvailabilityStatus::Available,
        package: PackageSummary {
            id: PackageId::new(id),
            name: name.to_string(),
            max_people: 8,
            base_price: 45.0,
            currency: "USD".to_string(),
        },
    }
}

fn friday_morning() -> TimeSlot {
    TimeSlot {
        id: SlotId::new("fri-am"),
        times: vec!["09:00".to_string()],
        days: vec!["Friday".to_string()],
        capacity: 12,
        booked: 3,
        cutoff_hours: None,
    }
}

/// Let timers and effect chains run to completion
async fn settle() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

async fn send(store: &FlowStore, action: BookingFlowAction) {
    store.send(action).await.unwrap();
    settle().await;
}

/// Walk the flow to step 3 for 2025-01-10 (a Friday)
async fn reach_review(h: &Harness) {
    h.api.respond_availability(Ok(vec![record("pkg-1", "Harbour Walk")]));
    h.api.respond_slots(Ok(vec![friday_morning()]));

    send(&h.store, BookingFlowAction::SelectDate(Some(ymd(2025, 1, 10)))).await;
    send(&h.store, BookingFlowAction::SetAdults(2)).await;
    send(&h.store, BookingFlowAction::SelectPackage(PackageId::new("pkg-1"))).await;
    send(
        &h.store,
        BookingFlowAction::SelectSlot {
            slot_id: SlotId::new("fri-am"),
            time: "09:00".to_string(),
        },
    )
    .await;
    send(&h.store, BookingFlowAction::Next).await;

    send(&h.store, BookingFlowAction::SetCustomerName("Ada Lovelace".to_string())).await;
    send(&h.store, BookingFlowAction::SetCustomerEmail("ada@example.com".to_string())).await;
    send(&h.store, BookingFlowAction::EmailBlurred).await;
    send(&h.store, BookingFlowAction::SetCustomerPhone("+1 555 0100".to_string())).await;
    send(&h.store, BookingFlowAction::Next).await;

    let step = h.store.state(|s| s.step).await;
    assert_eq!(step, Step::ReviewAndPayment);
}

// ============================================================================
// Availability
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rapid_participant_changes_issue_one_query() {
    let h = harness();
    h.api.respond_availability(Ok(vec![record("pkg-1", "Harbour Walk")]));

    h.store
        .send(BookingFlowAction::SelectDate(Some(ymd(2025, 1, 10))))
        .await
        .unwrap();
    for adults in 2..=4 {
        h.store.send(BookingFlowAction::SetAdults(adults)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    settle().await;

    assert_eq!(h.api.availability_queries(), 1);
    let packages = h.store.state(|s| s.packages.clone()).await;
    assert!(matches!(packages, Query::Loaded(PackagesOutcome::Available(p)) if p.len() == 1));
}

#[tokio::test(start_paused = true)]
async fn slow_response_for_previous_date_is_discarded() {
    let h = harness();
    let first = ymd(2025, 1, 10);
    let second = ymd(2025, 1, 11);
    h.api.respond_availability_on(
        first,
        Ok(vec![record("old", "Old Date Package")]),
        Duration::from_millis(500),
    );
    h.api.respond_availability_on(
        second,
        Ok(vec![record("new", "New Date Package")]),
        Duration::ZERO,
    );

    h.store
        .send(BookingFlowAction::SelectDate(Some(first)))
        .await
        .unwrap();
    // Debounce elapsed, the first query is in flight
    tokio::time::sleep(Duration::from_millis(250)).await;
    h.store
        .send(BookingFlowAction::SelectDate(Some(second)))
        .await
        .unwrap();
    settle().await;

    assert_eq!(h.api.availability_queries(), 2);
    let (date, packages) = h
        .store
        .state(|s| (s.selected_date, s.available_packages().to_vec()))
        .await;
    assert_eq!(date, Some(second));
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].id, PackageId::new("new"));
}

#[tokio::test(start_paused = true)]
async fn failed_availability_is_explicit() {
    let h = harness();
    h.api.respond_availability(Err(ApiError::Status {
        status: 500,
        message: "internal error".to_string(),
    }));

    send(&h.store, BookingFlowAction::SelectDate(Some(ymd(2025, 1, 10)))).await;

    let packages = h.store.state(|s| s.packages.clone()).await;
    assert!(matches!(packages, Query::Loaded(PackagesOutcome::Failed(_))));
}

// ============================================================================
// Cart capture
// ============================================================================

#[tokio::test(start_paused = true)]
async fn booking_started_fires_once_per_flow() {
    let h = harness();
    reach_review(&h).await;

    // Back to contact info and blur the email again
    send(&h.store, BookingFlowAction::Back).await;
    send(&h.store, BookingFlowAction::EmailBlurred).await;

    assert_eq!(h.analytics.started_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn email_blur_captures_the_cart() {
    let h = harness();
    reach_review(&h).await;

    let stored = h
        .engine
        .store()
        .load(&ProductId::new("prod-1"), "ada@example.com")
        .expect("cart stored locally");
    assert_eq!(stored.customer_phone, "+1 555 0100");
    assert_eq!(stored.package_id, Some(PackageId::new("pkg-1")));
    assert!((stored.total_amount - 90.0).abs() < f64::EPSILON);
    assert_eq!(h.engine.armed_key().unwrap().email, "ada@example.com");
}

// ============================================================================
// Payment
// ============================================================================

#[tokio::test(start_paused = true)]
async fn happy_path_reaches_confirmation() {
    let h = harness();
    reach_review(&h).await;

    send(&h.store, BookingFlowAction::SubmitBooking).await;

    let (step, code, submitting) = h
        .store
        .state(|s| (s.step, s.booking_code.clone(), s.submitting))
        .await;
    assert_eq!(step, Step::Confirmation);
    assert_eq!(code.as_deref(), Some("TB-0001"));
    assert!(!submitting);

    let calls = h.api.calls();
    let booking = calls
        .iter()
        .find_map(|call| match call {
            ApiCall::CreateBooking(request) => Some(request.clone()),
            _ => None,
        })
        .expect("booking created");
    assert_eq!(booking.booking_date, "2025-01-10");
    assert_eq!(booking.time_slot.as_deref(), Some("09:00"));
    assert!(calls.iter().any(|c| matches!(c, ApiCall::CreateOrder(o) if o.booking_id == "bk_1")));
    assert!(calls.iter().any(
        |c| matches!(c, ApiCall::VerifyPayment(v) if v.payment_id == "pay_order_1")
    ));
    assert_eq!(h.widget.checkouts().len(), 1);

    // Cart cleared and completion reported
    assert!(h.engine.store().load(&ProductId::new("prod-1"), "ada@example.com").is_none());
    assert!(h.engine.is_cleared());
    assert!(h.analytics.events().contains(&AnalyticsEvent::BookingCompleted {
        product_id: "prod-1".to_string(),
        booking_code: "TB-0001".to_string(),
    }));

    // Confirmation is terminal
    send(&h.store, BookingFlowAction::Back).await;
    assert_eq!(h.store.state(|s| s.step).await, Step::Confirmation);
}

#[tokio::test(start_paused = true)]
async fn declined_payment_stays_on_review_and_retry_reuses_booking() {
    let h = harness();
    reach_review(&h).await;
    h.widget.set_decline(Some("Customer closed checkout".to_string()));

    send(&h.store, BookingFlowAction::SubmitBooking).await;

    let (step, error, submitting) = h
        .store
        .state(|s| (s.step, s.error.clone(), s.submitting))
        .await;
    assert_eq!(step, Step::ReviewAndPayment);
    assert!(error.unwrap().contains("Customer closed checkout"));
    assert!(!submitting);

    h.widget.set_decline(None);
    send(&h.store, BookingFlowAction::SubmitBooking).await;

    assert_eq!(h.store.state(|s| s.step).await, Step::Confirmation);
    let bookings = h
        .api
        .calls()
        .iter()
        .filter(|c| matches!(c, ApiCall::CreateBooking(_)))
        .count();
    assert_eq!(bookings, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_verification_surfaces_the_message() {
    let h = harness();
    reach_review(&h).await;
    h.api.respond_verification(Ok(PaymentVerification {
        success: false,
        booking_code: None,
        message: Some("Signature mismatch".to_string()),
    }));

    send(&h.store, BookingFlowAction::SubmitBooking).await;

    let (step, error) = h.store.state(|s| (s.step, s.error.clone())).await;
    assert_eq!(step, Step::ReviewAndPayment);
    assert_eq!(error.as_deref(), Some("Signature mismatch"));
    assert!(h.engine.store().load(&ProductId::new("prod-1"), "ada@example.com").is_some());
}

// ============================================================================
// Cart capture ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn burst_of_name_edits_stores_the_last_one() {
    for round in 0..100 {
        let h = harness();
        h.store
            .send(BookingFlowAction::SetCustomerEmail("ada@example.com".to_string()))
            .await
            .unwrap();
        h.store.send(BookingFlowAction::EmailBlurred).await.unwrap();
        for i in 0..10 {
            h.store
                .send(BookingFlowAction::SetCustomerName(format!("n{i}")))
                .await
                .unwrap();
        }

        let stored = h
            .engine
            .store()
            .load(&ProductId::new("prod-1"), "ada@example.com")
            .unwrap_or_else(|| panic!("round {round}: cart was not stored"));
        assert_eq!(stored.customer_name, "n9", "round {round}");
        assert!(h.engine.has_pending_server_write());
    }
}

// ============================================================================
// Recovery
// ============================================================================

fn stored_cart() -> CartSnapshot {
    let mut cart = CartSnapshot::new(
        ProductId::new("prod-1"),
        "grace@example.com",
        test_clock().now(),
    );
    cart.customer_name = "Grace Hopper".to_string();
    cart.customer_phone = "+1 555 0199".to_string();
    cart.package_id = Some(PackageId::new("pkg-1"));
    cart.slot_id = Some(SlotId::new("fri-am"));
    cart.selected_date = Some("2025-01-10".to_string());
    cart.selected_time_slot = Some("09:00".to_string());
    cart.adults = 3;
    cart.total_amount = 135.0;
    cart
}

#[tokio::test(start_paused = true)]
async fn recover_link_prefills_from_stored_cart() {
    let h = harness();
    h.engine.store().save(&stored_cart());
    h.api.respond_availability(Ok(vec![record("pkg-1", "Harbour Walk")]));
    h.api.respond_slots(Ok(vec![friday_morning()]));

    let link: BookingLink = "https://tours.example.com/book/prod-1?recover=true".parse().unwrap();
    send(&h.store, BookingFlowAction::ApplyLink(link)).await;

    let state = h.store.state(Clone::clone).await;
    assert_eq!(state.step, Step::DateAndParticipants);
    assert_eq!(state.customer_name, "Grace Hopper");
    assert_eq!(state.customer_email, "grace@example.com");
    assert_eq!(state.adults, 3);
    assert_eq!(state.selected_date, Some(ymd(2025, 1, 10)));
    assert_eq!(state.selected_package.map(|p| p.id), Some(PackageId::new("pkg-1")));
    assert_eq!(state.selected_time.as_deref(), Some("09:00"));
    assert!(state.recovered_cart.is_some());
    assert!(h.api.calls().iter().any(
        |c| matches!(c, ApiCall::CartStatus { email, .. } if email == "grace@example.com")
    ));

    // Everything needed for step 1 came back
    send(&h.store, BookingFlowAction::Next).await;
    assert_eq!(h.store.state(|s| s.step).await, Step::ContactInfo);
}

#[tokio::test(start_paused = true)]
async fn dismissing_recovery_clears_the_cart() {
    let h = harness();
    h.engine.store().save(&stored_cart());

    send(&h.store, BookingFlowAction::RecoverCart).await;
    assert!(h.store.state(|s| s.recovered_cart.is_some()).await);

    send(&h.store, BookingFlowAction::DismissRecovery).await;

    assert!(h.store.state(|s| s.recovered_cart.is_none()).await);
    assert!(h.engine.store().load(&ProductId::new("prod-1"), "grace@example.com").is_none());
}

#[tokio::test(start_paused = true)]
async fn dismissed_cart_is_not_recovered_from_the_server_copy() {
    let h = harness();
    h.engine.store().save(&stored_cart());
    h.api.respond_server_cart(Ok(Some(stored_cart())));

    send(&h.store, BookingFlowAction::RecoverCart).await;
    assert!(h.store.state(|s| s.recovered_cart.is_some()).await);
    send(&h.store, BookingFlowAction::DismissRecovery).await;

    let closed = h.api.saved_carts();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].email, "grace@example.com");
    assert_eq!(closed[0].status, CartStatus::Closed);

    let recovered = h
        .engine
        .reconcile(&ProductId::new("prod-1"), "grace@example.com")
        .await;
    assert!(recovered.is_none());
    assert!(h.engine.store().load(&ProductId::new("prod-1"), "grace@example.com").is_none());
}

#[tokio::test(start_paused = true)]
async fn nothing_to_recover_leaves_flow_untouched() {
    let h = harness();

    send(&h.store, BookingFlowAction::RecoverCart).await;

    let state = h.store.state(Clone::clone).await;
    assert!(state.recovered_cart.is_none());
    assert!(state.customer_email.is_empty());
    assert_eq!(state.adults, 1);
}
