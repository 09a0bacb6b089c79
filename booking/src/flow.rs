//! Booking Flow Controller
//!
//! Four-step booking state machine:
//!
//! 1. [`Step::DateAndParticipants`]: date, party size, package and slot
//! 2. [`Step::ContactInfo`]: name, email and phone; leaving the email field
//!    arms abandoned-cart sync
//! 3. [`Step::ReviewAndPayment`]: booking creation and the payment hand-off
//!    (`POST /bookings` → `POST /payments/create-order` → checkout widget →
//!    `POST /payments/verify`)
//! 4. [`Step::Confirmation`]: terminal, shows the server-issued booking code
//!
//! Navigation is strictly one step forward or back. Back from step 1 exits the
//! flow; step 4 has no way back.
//!
//! Availability queries carry request ids. A response whose id is no longer
//! the latest is dropped, so a slow answer for an old date cannot overwrite
//! the packages of the date the customer is looking at now.

use crate::availability::{AvailabilityService, PackagesOutcome, SlotsOutcome};
use crate::link::BookingLink;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use std::sync::Arc;
use std::time::Duration;
use tourbook_api::{
    BookingApi, BookingRecord, CreateBookingRequest, CreateOrderRequest, PaymentAuthorization,
    PaymentOrder, PaymentVerification, PaymentWidget,
};
use tourbook_cart::CartSyncEngine;
use tourbook_core::bookability::{DEFAULT_CUTOFF_HOURS, is_slot_bookable};
use tourbook_core::cart::{CartKey, CartSnapshot};
use tourbook_core::catalog::{PackageId, PackageSummary, ProductId, SlotId, TimeSlot};
use tourbook_core::dates::{iso_date, parse_booking_date};
use tourbook_core::effect::{Effect, EffectId};
use tourbook_core::environment::{Analytics, AnalyticsEvent, Clock, local_now};
use tourbook_core::reducer::Reducer;
use tourbook_core::{SmallVec, smallvec};
use tracing::{debug, info, warn};

/// Cancellation group of the debounced packages query
pub const PACKAGES_QUERY: EffectId = EffectId("availability-packages");

/// Quiet period before re-querying packages
pub const DEFAULT_AVAILABILITY_DEBOUNCE: Duration = Duration::from_millis(200);

/// Currency used when no package is selected
pub const DEFAULT_CURRENCY: &str = "USD";

// ============================================================================
// State
// ============================================================================

/// Step of the booking flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    /// Select date & participants
    #[default]
    DateAndParticipants,
    /// Your information
    ContactInfo,
    /// Review & payment
    ReviewAndPayment,
    /// Booking confirmed
    Confirmation,
}

impl Step {
    /// One-based position shown to the customer
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::DateAndParticipants => 1,
            Self::ContactInfo => 2,
            Self::ReviewAndPayment => 3,
            Self::Confirmation => 4,
        }
    }
}

/// Progress of a remote query
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Query<T> {
    /// Not requested
    #[default]
    Idle,
    /// Request scheduled or in flight
    Loading,
    /// Latest response
    Loaded(T),
}

/// State of one booking flow instance
#[derive(Debug, Clone)]
pub struct BookingFlowState {
    /// Product being booked
    pub product_id: ProductId,
    /// Current step
    pub step: Step,
    /// Tour date
    pub selected_date: Option<NaiveDate>,
    /// Adult participants
    pub adults: u32,
    /// Child participants
    pub children: u32,
    /// Packages for the selected date
    pub packages: Query<PackagesOutcome>,
    /// Chosen package
    pub selected_package: Option<PackageSummary>,
    /// Package to select once it shows up as available (links, recovery)
    pub preferred_package: Option<PackageId>,
    /// Slots of the chosen package
    pub slots: Query<SlotsOutcome>,
    /// Chosen slot
    pub selected_slot: Option<SlotId>,
    /// Chosen time of the slot (`HH:mm`)
    pub selected_time: Option<String>,
    /// Customer name
    pub customer_name: String,
    /// Customer email
    pub customer_email: String,
    /// Customer phone
    pub customer_phone: String,
    /// Free-form notes for the operator
    pub notes: String,
    /// Validation or submission error shown to the customer
    pub error: Option<String>,
    /// Cart sync is armed for the current email
    pub cart_armed: bool,
    /// `BookingStarted` was already reported
    pub booking_started_tracked: bool,
    /// Cart restored through recovery
    pub recovered_cart: Option<CartSnapshot>,
    /// A submission is in progress
    pub submitting: bool,
    /// Booking record created on submit
    pub booking: Option<BookingRecord>,
    /// Code shown on the confirmation step
    pub booking_code: Option<String>,
    /// Customer navigated back out of the flow
    pub exited: bool,
    packages_request: u64,
    slots_request: u64,
}

impl BookingFlowState {
    /// Fresh flow for `product_id`: step 1, one adult.
    #[must_use]
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            step: Step::DateAndParticipants,
            selected_date: None,
            adults: 1,
            children: 0,
            packages: Query::Idle,
            selected_package: None,
            preferred_package: None,
            slots: Query::Idle,
            selected_slot: None,
            selected_time: None,
            customer_name: String::new(),
            customer_email: String::new(),
            customer_phone: String::new(),
            notes: String::new(),
            error: None,
            cart_armed: false,
            booking_started_tracked: false,
            recovered_cart: None,
            submitting: false,
            booking: None,
            booking_code: None,
            exited: false,
            packages_request: 0,
            slots_request: 0,
        }
    }

    /// Id of the latest packages request
    #[must_use]
    pub const fn packages_request(&self) -> u64 {
        self.packages_request
    }

    /// Id of the latest slots request
    #[must_use]
    pub const fn slots_request(&self) -> u64 {
        self.slots_request
    }

    /// Packages currently offered
    #[must_use]
    pub fn available_packages(&self) -> &[PackageSummary] {
        match &self.packages {
            Query::Loaded(PackagesOutcome::Available(packages)) => packages,
            _ => &[],
        }
    }

    /// Slots currently offered
    #[must_use]
    pub fn available_slots(&self) -> &[TimeSlot] {
        match &self.slots {
            Query::Loaded(SlotsOutcome::Available(slots)) => slots,
            _ => &[],
        }
    }

    /// Total for the party with the chosen package
    #[must_use]
    pub fn total_amount(&self) -> f64 {
        self.selected_package
            .as_ref()
            .map_or(0.0, |package| package.total_for(self.adults, self.children))
    }

    /// Currency of the chosen package
    #[must_use]
    pub fn currency(&self) -> String {
        self.selected_package
            .as_ref()
            .map_or_else(|| DEFAULT_CURRENCY.to_string(), |p| p.currency.clone())
    }

    /// Cart identity for the typed email, if it looks like one
    #[must_use]
    pub fn cart_key(&self) -> Option<CartKey> {
        let email = self.customer_email.trim();
        email
            .contains('@')
            .then(|| CartKey::new(self.product_id.clone(), email))
    }

    /// Current form content as a cart snapshot
    #[must_use]
    pub fn snapshot(&self, now: chrono::DateTime<Utc>) -> CartSnapshot {
        let mut snapshot = CartSnapshot::new(
            self.product_id.clone(),
            self.customer_email.trim(),
            now,
        );
        snapshot.package_id = self.selected_package.as_ref().map(|p| p.id.clone());
        snapshot.slot_id = self.selected_slot.clone();
        snapshot.customer_name.clone_from(&self.customer_name);
        snapshot.customer_phone.clone_from(&self.customer_phone);
        snapshot.adults = self.adults;
        snapshot.children = self.children;
        snapshot.selected_date = self.selected_date.map(iso_date);
        snapshot.selected_time_slot.clone_from(&self.selected_time);
        snapshot.total_amount = self.total_amount();
        snapshot
    }

    fn selected_slot_details(&self) -> Option<&TimeSlot> {
        let id = self.selected_slot.as_ref()?;
        self.available_slots().iter().find(|slot| &slot.id == id)
    }

    /// Check step 1 against local time `now`.
    ///
    /// # Errors
    ///
    /// Returns the message to show when the step cannot be left.
    pub fn validate_date_and_participants(&self, now: NaiveDateTime) -> Result<(), String> {
        let Some(date) = self.selected_date else {
            return Err("Please select a date".to_string());
        };
        if self.adults < 1 {
            return Err("At least one adult is required".to_string());
        }
        let Some(package) = &self.selected_package else {
            return Err("Please select a package".to_string());
        };
        if self.adults + self.children > package.max_people {
            return Err(format!(
                "{} allows at most {} participants",
                package.name, package.max_people
            ));
        }

        match &self.selected_time {
            Some(time) => {
                let cutoff = self
                    .selected_slot_details()
                    .map_or(DEFAULT_CUTOFF_HOURS, TimeSlot::effective_cutoff_hours);
                let bookability = is_slot_bookable(&iso_date(date), time, cutoff, now);
                if !bookability.is_bookable {
                    return Err(bookability.reason);
                }
            }
            None if !self.available_slots().is_empty() => {
                return Err("Please select a time slot".to_string());
            }
            None => {},
        }
        Ok(())
    }

    /// Check step 2.
    ///
    /// # Errors
    ///
    /// Returns the message to show when the step cannot be left.
    pub fn validate_contact_info(&self) -> Result<(), String> {
        if self.customer_name.trim().is_empty() {
            return Err("Please enter your name".to_string());
        }
        if !self.customer_email.contains('@') {
            return Err("Please enter a valid email address".to_string());
        }
        if self.customer_phone.trim().is_empty() {
            return Err("Please enter your phone number".to_string());
        }
        Ok(())
    }

    /// `POST /bookings` body for the reviewed booking
    #[must_use]
    pub fn booking_request(&self) -> Option<CreateBookingRequest> {
        let date = self.selected_date?;
        let package = self.selected_package.as_ref()?;
        let notes = self.notes.trim();
        Some(CreateBookingRequest {
            product_id: self.product_id.clone(),
            package_id: package.id.clone(),
            slot_id: self.selected_slot.clone(),
            booking_date: iso_date(date),
            time_slot: self.selected_time.clone(),
            adults: self.adults,
            children: self.children,
            customer_name: self.customer_name.trim().to_string(),
            customer_email: self.customer_email.trim().to_string(),
            customer_phone: self.customer_phone.trim().to_string(),
            notes: (!notes.is_empty()).then(|| notes.to_string()),
            total_amount: self.total_amount(),
            currency: package.currency.clone(),
        })
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Inputs of the booking flow, from the customer and from effects
#[derive(Debug, Clone)]
pub enum BookingFlowAction {
    /// Tour date picked or cleared
    SelectDate(Option<NaiveDate>),
    /// Adult count changed
    SetAdults(u32),
    /// Child count changed
    SetChildren(u32),
    /// Debounce window of a packages query elapsed
    FetchPackages {
        /// Request being issued
        request_id: u64,
    },
    /// Packages query answered
    PackagesLoaded {
        /// Request answered
        request_id: u64,
        /// Result
        outcome: PackagesOutcome,
    },
    /// Package chosen
    SelectPackage(PackageId),
    /// Slots query answered
    SlotsLoaded {
        /// Request answered
        request_id: u64,
        /// Result
        outcome: SlotsOutcome,
    },
    /// Slot and time chosen
    SelectSlot {
        /// Slot
        slot_id: SlotId,
        /// Time of the slot (`HH:mm`)
        time: String,
    },
    /// Name typed
    SetCustomerName(String),
    /// Email typed
    SetCustomerEmail(String),
    /// Phone typed
    SetCustomerPhone(String),
    /// Notes typed
    SetNotes(String),
    /// Email field lost focus
    EmailBlurred,
    /// Continue to the next step
    Next,
    /// Go back one step
    Back,
    /// Create the booking and start payment
    SubmitBooking,
    /// `POST /bookings` succeeded
    BookingCreated(BookingRecord),
    /// Payment order created
    PaymentOrderCreated(PaymentOrder),
    /// Customer completed checkout
    PaymentAuthorized(PaymentAuthorization),
    /// Backend verification answered
    PaymentVerified(PaymentVerification),
    /// Any submission step failed
    PaymentFailed(String),
    /// Pre-fill from a booking link
    ApplyLink(BookingLink),
    /// Look for an abandoned cart to restore
    RecoverCart,
    /// Recovery finished
    CartRecovered(Option<CartSnapshot>),
    /// Customer dismissed the recovered cart
    DismissRecovery,
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the booking flow
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Offset of the tour's local time
    pub utc_offset: FixedOffset,
    /// Backend
    pub api: Arc<dyn BookingApi>,
    /// Abandoned-cart sync for this session
    pub cart_sync: Arc<CartSyncEngine>,
    /// Analytics sink
    pub analytics: Arc<dyn Analytics>,
    /// Payment provider checkout
    pub payment_widget: Arc<dyn PaymentWidget>,
    /// Packages query debounce
    pub debounce: Duration,
}

impl BookingEnvironment {
    /// Environment in UTC with the default debounce
    #[must_use]
    pub fn new(
        api: Arc<dyn BookingApi>,
        clock: Arc<dyn Clock>,
        cart_sync: Arc<CartSyncEngine>,
        analytics: Arc<dyn Analytics>,
        payment_widget: Arc<dyn PaymentWidget>,
    ) -> Self {
        Self {
            clock,
            utc_offset: Utc.fix(),
            api,
            cart_sync,
            analytics,
            payment_widget,
            debounce: DEFAULT_AVAILABILITY_DEBOUNCE,
        }
    }

    /// Evaluate cutoffs in `offset` local time
    #[must_use]
    pub const fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Override the packages query debounce
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Availability queries sharing this environment's backend and clock
    #[must_use]
    pub fn availability(&self) -> AvailabilityService {
        AvailabilityService::new(
            Arc::clone(&self.api),
            Arc::clone(&self.clock),
            self.utc_offset,
        )
    }

    /// Local wall-clock time
    #[must_use]
    pub fn local_now(&self) -> NaiveDateTime {
        local_now(self.clock.as_ref(), self.utc_offset)
    }
}

impl std::fmt::Debug for BookingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingEnvironment")
            .field("utc_offset", &self.utc_offset)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer of the booking flow
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingFlowReducer;

type Effects = SmallVec<[Effect<BookingFlowAction>; 4]>;

impl BookingFlowReducer {
    /// Create the reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn refresh_packages(state: &mut BookingFlowState, env: &BookingEnvironment) -> Effects {
        state.packages_request += 1;
        if state.selected_date.is_none() {
            state.packages = Query::Idle;
            return smallvec![Effect::Cancel(PACKAGES_QUERY)];
        }
        state.packages = Query::Loading;
        smallvec![Effect::debounce(
            PACKAGES_QUERY,
            env.debounce,
            BookingFlowAction::FetchPackages {
                request_id: state.packages_request,
            },
        )]
    }

    fn select_package(
        state: &mut BookingFlowState,
        env: &BookingEnvironment,
        package: PackageSummary,
        keep_slot: bool,
    ) -> Effects {
        let package_id = package.id.clone();
        state.selected_package = Some(package);
        if !keep_slot {
            state.selected_slot = None;
            state.selected_time = None;
        }
        state.slots_request += 1;

        let Some(date) = state.selected_date else {
            state.slots = Query::Idle;
            return SmallVec::new();
        };
        state.slots = Query::Loading;
        let request_id = state.slots_request;
        let availability = env.availability();
        smallvec![Effect::future(async move {
            let outcome = availability.slots_for_package(&package_id, date).await;
            Some(BookingFlowAction::SlotsLoaded {
                request_id,
                outcome,
            })
        })]
    }

    fn deselect_package(state: &mut BookingFlowState) {
        state.selected_package = None;
        state.selected_slot = None;
        state.selected_time = None;
        state.slots = Query::Idle;
        state.slots_request += 1;
    }

    // The local write happens here, in action order; only the broadcast and
    // the server POST are deferred to the engine's ticks.
    fn record_cart(state: &BookingFlowState, env: &BookingEnvironment) {
        if state.cart_armed {
            env.cart_sync.record_change(state.snapshot(env.clock.now()));
        }
    }

    /// Clear now and push the close record to the server right away.
    fn clear_cart(env: &BookingEnvironment, key: &CartKey) -> Effect<BookingFlowAction> {
        env.cart_sync.clear(key);
        let engine = Arc::clone(&env.cart_sync);
        Effect::future(async move {
            engine.tick().await;
            None
        })
    }

    fn track(env: &BookingEnvironment, event: AnalyticsEvent) -> Effect<BookingFlowAction> {
        let analytics = Arc::clone(&env.analytics);
        Effect::future(async move {
            analytics.track(event);
            None
        })
    }

    fn recover(state: &BookingFlowState, env: &BookingEnvironment) -> Effect<BookingFlowAction> {
        let engine = Arc::clone(&env.cart_sync);
        let product_id = state.product_id.clone();
        let known_email = state.cart_key().map(|key| key.email);
        Effect::future(async move {
            let email = known_email.or_else(|| {
                engine
                    .store()
                    .snapshots_for_product(&product_id)
                    .into_iter()
                    .find(CartSnapshot::is_open)
                    .map(|cart| cart.customer_email)
            });
            let cart = match email {
                Some(email) => engine.reconcile(&product_id, &email).await,
                None => None,
            };
            Some(BookingFlowAction::CartRecovered(cart))
        })
    }

    fn create_order(
        state: &BookingFlowState,
        env: &BookingEnvironment,
        booking: &BookingRecord,
    ) -> Effect<BookingFlowAction> {
        let request = CreateOrderRequest {
            booking_id: booking.id.clone(),
            amount: state.total_amount(),
            currency: state.currency(),
        };
        let api = Arc::clone(&env.api);
        Effect::future(async move {
            Some(match api.create_payment_order(&request).await {
                Ok(order) => BookingFlowAction::PaymentOrderCreated(order),
                Err(error) => BookingFlowAction::PaymentFailed(error.to_string()),
            })
        })
    }

    fn stale(kind: &'static str, request_id: u64, latest: u64) -> bool {
        if request_id == latest {
            return false;
        }
        metrics::counter!("availability.stale_response", "query" => kind).increment(1);
        debug!(query = kind, request_id, latest, "Discarding stale availability response");
        true
    }

    fn fail_submission(state: &mut BookingFlowState, reason: String) {
        warn!(product_id = %state.product_id, %reason, "Booking submission failed");
        state.submitting = false;
        state.error = Some(reason);
    }
}

impl Reducer for BookingFlowReducer {
    type State = BookingFlowState;
    type Action = BookingFlowAction;
    type Environment = BookingEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action keeps the state machine in one place
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            // ========== Step 1: Date & Participants ==========
            BookingFlowAction::SelectDate(date) => {
                state.selected_date = date;
                state.error = None;
                Self::deselect_package(state);
                Self::record_cart(state, env);
                Self::refresh_packages(state, env)
            }

            BookingFlowAction::SetAdults(adults) => {
                state.adults = adults;
                state.error = None;
                Self::record_cart(state, env);
                if state.selected_date.is_some() {
                    Self::refresh_packages(state, env)
                } else {
                    SmallVec::new()
                }
            }

            BookingFlowAction::SetChildren(children) => {
                state.children = children;
                state.error = None;
                Self::record_cart(state, env);
                if state.selected_date.is_some() {
                    Self::refresh_packages(state, env)
                } else {
                    SmallVec::new()
                }
            }

            BookingFlowAction::FetchPackages { request_id } => {
                if Self::stale("packages", request_id, state.packages_request) {
                    return SmallVec::new();
                }
                let Some(date) = state.selected_date else {
                    return SmallVec::new();
                };
                let availability = env.availability();
                let product_id = state.product_id.clone();
                smallvec![Effect::future(async move {
                    let outcome = availability.packages_for_date(&product_id, date).await;
                    Some(BookingFlowAction::PackagesLoaded {
                        request_id,
                        outcome,
                    })
                })]
            }

            BookingFlowAction::PackagesLoaded {
                request_id,
                outcome,
            } => {
                if Self::stale("packages", request_id, state.packages_request) {
                    return SmallVec::new();
                }
                state.packages = Query::Loaded(outcome);

                if let Some(selected) = &state.selected_package {
                    let still_offered = state
                        .available_packages()
                        .iter()
                        .any(|package| package.id == selected.id);
                    if !still_offered {
                        debug!(package_id = %selected.id, "Selected package no longer available");
                        Self::deselect_package(state);
                    }
                    return SmallVec::new();
                }

                let preferred = state.preferred_package.as_ref().and_then(|id| {
                    state
                        .available_packages()
                        .iter()
                        .find(|package| &package.id == id)
                        .cloned()
                });
                match preferred {
                    Some(package) => {
                        state.preferred_package = None;
                        Self::select_package(state, env, package, true)
                    }
                    None => SmallVec::new(),
                }
            }

            BookingFlowAction::SelectPackage(package_id) => {
                let Some(package) = state
                    .available_packages()
                    .iter()
                    .find(|package| package.id == package_id)
                    .cloned()
                else {
                    debug!(%package_id, "Ignoring selection of a package that is not offered");
                    return SmallVec::new();
                };
                state.error = None;
                state.preferred_package = None;
                let effects = Self::select_package(state, env, package, false);
                Self::record_cart(state, env);
                effects
            }

            BookingFlowAction::SlotsLoaded {
                request_id,
                outcome,
            } => {
                if Self::stale("slots", request_id, state.slots_request) {
                    return SmallVec::new();
                }
                state.slots = Query::Loaded(outcome);
                if let Some(slot_id) = &state.selected_slot {
                    if !state.available_slots().iter().any(|slot| &slot.id == slot_id) {
                        state.selected_slot = None;
                        state.selected_time = None;
                    }
                }
                SmallVec::new()
            }

            BookingFlowAction::SelectSlot { slot_id, time } => {
                state.selected_slot = Some(slot_id);
                state.selected_time = Some(time);
                state.error = None;
                SmallVec::new()
            }

            // ========== Step 2: Contact Info ==========
            BookingFlowAction::SetCustomerName(name) => {
                state.customer_name = name;
                Self::record_cart(state, env);
                SmallVec::new()
            }

            BookingFlowAction::SetCustomerEmail(email) => {
                if email.trim() != state.customer_email.trim() {
                    // The armed key follows the email; re-armed on the next blur
                    state.cart_armed = false;
                }
                state.customer_email = email;
                SmallVec::new()
            }

            BookingFlowAction::SetCustomerPhone(phone) => {
                state.customer_phone = phone;
                Self::record_cart(state, env);
                SmallVec::new()
            }

            BookingFlowAction::SetNotes(notes) => {
                state.notes = notes;
                SmallVec::new()
            }

            BookingFlowAction::EmailBlurred => {
                let Some(key) = state.cart_key() else {
                    return SmallVec::new();
                };
                state.cart_armed = true;
                env.cart_sync.arm(key);
                Self::record_cart(state, env);

                let mut effects: Effects = SmallVec::new();
                if !state.booking_started_tracked {
                    state.booking_started_tracked = true;
                    effects.push(Self::track(
                        env,
                        AnalyticsEvent::BookingStarted {
                            product_id: state.product_id.to_string(),
                            package_id: state.selected_package.as_ref().map(|p| p.id.to_string()),
                        },
                    ));
                }
                effects
            }

            // ========== Navigation ==========
            BookingFlowAction::Next => {
                let result = match state.step {
                    Step::DateAndParticipants => state
                        .validate_date_and_participants(env.local_now())
                        .map(|()| Step::ContactInfo),
                    Step::ContactInfo => {
                        state.validate_contact_info().map(|()| Step::ReviewAndPayment)
                    }
                    Step::ReviewAndPayment | Step::Confirmation => return SmallVec::new(),
                };
                match result {
                    Ok(step) => {
                        state.step = step;
                        state.error = None;
                    }
                    Err(message) => {
                        debug!(step = state.step.number(), %message, "Step validation failed");
                        state.error = Some(message);
                    }
                }
                SmallVec::new()
            }

            BookingFlowAction::Back => {
                match state.step {
                    Step::DateAndParticipants => state.exited = true,
                    Step::ContactInfo => state.step = Step::DateAndParticipants,
                    Step::ReviewAndPayment if !state.submitting => state.step = Step::ContactInfo,
                    Step::ReviewAndPayment | Step::Confirmation => return SmallVec::new(),
                }
                state.error = None;
                SmallVec::new()
            }

            // ========== Step 3: Review & Payment ==========
            BookingFlowAction::SubmitBooking => {
                if state.step != Step::ReviewAndPayment || state.submitting {
                    debug!("Ignoring duplicate or out-of-step submission");
                    return SmallVec::new();
                }
                state.error = None;
                state.submitting = true;

                // A retry after a failed payment reuses the booking
                if let Some(booking) = &state.booking {
                    return smallvec![Self::create_order(state, env, booking)];
                }

                let Some(request) = state.booking_request() else {
                    Self::fail_submission(state, "Booking details are incomplete".to_string());
                    return SmallVec::new();
                };
                let api = Arc::clone(&env.api);
                smallvec![Effect::future(async move {
                    Some(match api.create_booking(&request).await {
                        Ok(record) => BookingFlowAction::BookingCreated(record),
                        Err(error) => BookingFlowAction::PaymentFailed(error.to_string()),
                    })
                })]
            }

            BookingFlowAction::BookingCreated(record) => {
                if !state.submitting {
                    return SmallVec::new();
                }
                info!(
                    booking_id = %record.id,
                    booking_code = %record.booking_code,
                    "Booking created"
                );
                let effect = Self::create_order(state, env, &record);
                state.booking = Some(record);
                smallvec![effect]
            }

            BookingFlowAction::PaymentOrderCreated(order) => {
                if !state.submitting {
                    return SmallVec::new();
                }
                let widget = Arc::clone(&env.payment_widget);
                smallvec![Effect::future(async move {
                    Some(match widget.checkout(&order).await {
                        Ok(authorization) => BookingFlowAction::PaymentAuthorized(authorization),
                        Err(error) => BookingFlowAction::PaymentFailed(error.to_string()),
                    })
                })]
            }

            BookingFlowAction::PaymentAuthorized(authorization) => {
                if !state.submitting {
                    return SmallVec::new();
                }
                let Some(booking) = &state.booking else {
                    Self::fail_submission(state, "Payment received without a booking".to_string());
                    return SmallVec::new();
                };
                let request = authorization.verification_for(booking.id.clone());
                let api = Arc::clone(&env.api);
                smallvec![Effect::future(async move {
                    Some(match api.verify_payment(&request).await {
                        Ok(verification) => BookingFlowAction::PaymentVerified(verification),
                        Err(error) => BookingFlowAction::PaymentFailed(error.to_string()),
                    })
                })]
            }

            BookingFlowAction::PaymentVerified(verification) => {
                if !state.submitting {
                    return SmallVec::new();
                }
                if !verification.success {
                    let reason = verification
                        .message
                        .unwrap_or_else(|| "Payment verification failed".to_string());
                    Self::fail_submission(state, reason);
                    return SmallVec::new();
                }

                state.submitting = false;
                state.error = None;
                state.step = Step::Confirmation;
                state.cart_armed = false;
                let booking_code = verification
                    .booking_code
                    .or_else(|| state.booking.as_ref().map(|b| b.booking_code.clone()))
                    .unwrap_or_default();
                info!(product_id = %state.product_id, %booking_code, "Booking confirmed");
                state.booking_code = Some(booking_code.clone());

                let mut effects: Effects = SmallVec::new();
                let key = state
                    .cart_key()
                    .or_else(|| state.recovered_cart.as_ref().map(CartSnapshot::key));
                if let Some(key) = key {
                    effects.push(Self::clear_cart(env, &key));
                }
                effects.push(Self::track(
                    env,
                    AnalyticsEvent::BookingCompleted {
                        product_id: state.product_id.to_string(),
                        booking_code,
                    },
                ));
                effects
            }

            BookingFlowAction::PaymentFailed(reason) => {
                if state.submitting {
                    Self::fail_submission(state, reason);
                }
                SmallVec::new()
            }

            // ========== Links & Recovery ==========
            BookingFlowAction::ApplyLink(link) => {
                if state.step != Step::DateAndParticipants {
                    return SmallVec::new();
                }
                if let Some(adults) = link.adults {
                    state.adults = adults;
                }
                if let Some(children) = link.children {
                    state.children = children;
                }
                if link.package.is_some() {
                    state.preferred_package = link.package;
                }
                if link.slot.is_some() {
                    state.selected_slot = link.slot;
                    state.selected_time = link.time;
                }

                let mut effects = match link.date {
                    Some(date) => {
                        state.selected_date = Some(date);
                        Self::refresh_packages(state, env)
                    }
                    None => SmallVec::new(),
                };
                if link.recover {
                    effects.push(Self::recover(state, env));
                }
                effects
            }

            BookingFlowAction::RecoverCart => smallvec![Self::recover(state, env)],

            BookingFlowAction::CartRecovered(None) => {
                debug!(product_id = %state.product_id, "No abandoned cart to recover");
                SmallVec::new()
            }

            BookingFlowAction::CartRecovered(Some(cart)) => {
                if state.step != Step::DateAndParticipants {
                    debug!("Flow moved on, ignoring recovered cart");
                    return SmallVec::new();
                }
                info!(key = %cart.key(), "Recovered abandoned cart");

                state.customer_name.clone_from(&cart.customer_name);
                state.customer_email.clone_from(&cart.customer_email);
                state.customer_phone.clone_from(&cart.customer_phone);
                if cart.adults > 0 {
                    state.adults = cart.adults;
                }
                state.children = cart.children;
                state.selected_package = None;
                state.preferred_package.clone_from(&cart.package_id);
                state.selected_slot.clone_from(&cart.slot_id);
                state.selected_time.clone_from(&cart.selected_time_slot);
                state.selected_date = cart
                    .selected_date
                    .as_deref()
                    .and_then(|date| parse_booking_date(date).ok());
                state.recovered_cart = Some(cart);

                if state.selected_date.is_some() {
                    Self::refresh_packages(state, env)
                } else {
                    SmallVec::new()
                }
            }

            BookingFlowAction::DismissRecovery => {
                let Some(cart) = state.recovered_cart.take() else {
                    return SmallVec::new();
                };
                state.cart_armed = false;
                smallvec![Self::clear_cart(env, &cart.key())]
            }
        }
    }
}
