//! `tourbook` command-line client.
//!
//! Talks to the booking backend configured through `TOURBOOK_*` variables
//! (see [`tourbook_booking::config`]) and inspects the local cart storage.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tourbook_api::{
    ApiError, BookingApi, BookingApiClient, PaymentAuthorization, PaymentOrder, PaymentWidget,
};
use tourbook_booking::{
    AvailabilityService, BookingEnvironment, BookingFlowAction, BookingFlowReducer,
    BookingFlowState, BookingLink, Config, PackagesOutcome, SlotsOutcome, TracingAnalytics,
};
use tourbook_cart::{CartSnapshotStore, CartSyncEngine, JsonFileStorage};
use tourbook_core::broadcast::LocalBroadcastChannel;
use tourbook_core::catalog::{PackageId, ProductId};
use tourbook_core::dates::{iso_date, parse_booking_date};
use tourbook_core::environment::{Clock, SystemClock};
use tourbook_runtime::Store;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage:
  tourbook availability <product-id> <YYYY-MM-DD|MM/DD/YYYY>
  tourbook carts
  tourbook reconcile <product-id> <email>
  tourbook resume <product-id> <booking-link>";

/// Quiet period after which a resumed flow is considered settled
const SETTLE_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourbook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        api_url = %config.api.url,
        storage = %config.storage.path.display(),
        "Configuration loaded"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["availability", product_id, date] => availability(&config, product_id, date).await,
        ["carts"] => {
            carts(&config);
            Ok(())
        }
        ["reconcile", product_id, email] => reconcile(&config, product_id, email).await,
        ["resume", product_id, link] => resume(&config, product_id, link).await,
        _ => {
            eprintln!("{USAGE}");
            bail!("unrecognized command: {}", args.join(" "))
        }
    }
}

fn api(config: &Config) -> Result<Arc<dyn BookingApi>> {
    let client = BookingApiClient::new(&config.api.url)
        .with_context(|| format!("Invalid API URL {}", config.api.url))?;
    Ok(Arc::new(client))
}

fn snapshot_store(config: &Config) -> CartSnapshotStore {
    CartSnapshotStore::new(Arc::new(JsonFileStorage::new(config.storage.path.clone())))
}

fn sync_engine(config: &Config, api: Arc<dyn BookingApi>, clock: Arc<dyn Clock>) -> CartSyncEngine {
    CartSyncEngine::new(
        snapshot_store(config),
        api,
        Arc::new(LocalBroadcastChannel::default()),
        clock,
        config.sync_config(),
    )
}

/// The terminal has no payment provider UI; `resume` never reaches checkout.
struct TerminalCheckout;

#[async_trait]
impl PaymentWidget for TerminalCheckout {
    async fn checkout(&self, _order: &PaymentOrder) -> Result<PaymentAuthorization, ApiError> {
        Err(ApiError::PaymentCancelled(
            "checkout is only available in the storefront".to_string(),
        ))
    }
}

async fn availability(config: &Config, product_id: &str, date: &str) -> Result<()> {
    let date = parse_booking_date(date)?;
    let service =
        AvailabilityService::new(api(config)?, Arc::new(SystemClock), config.utc_offset()?);
    let product_id = ProductId::new(product_id);

    let packages = match service.packages_for_date(&product_id, date).await {
        PackagesOutcome::Available(packages) => packages,
        PackagesOutcome::NoneAvailable => {
            println!("No packages available on {}", iso_date(date));
            return Ok(());
        }
        PackagesOutcome::Failed(reason) => bail!("Failed to load availability: {reason}"),
    };

    for package in packages {
        println!(
            "{} ({}): {} {} per person, up to {} people",
            package.name, package.id, package.base_price, package.currency, package.max_people
        );
        match service.slots_for_package(&package.id, date).await {
            SlotsOutcome::Available(slots) => {
                let now = service.local_now();
                for slot in slots {
                    println!(
                        "  slot {}: {} ({} seats left)",
                        slot.id,
                        slot.bookable_times(date, now).join(", "),
                        slot.available_seats()
                    );
                }
            }
            SlotsOutcome::NoneAvailable => println!("  no bookable slots"),
            SlotsOutcome::Failed(reason) => println!("  slots unavailable: {reason}"),
        }
    }
    Ok(())
}

fn carts(config: &Config) {
    let carts = snapshot_store(config).all();
    if carts.is_empty() {
        println!("No abandoned carts stored in {}", config.storage.path.display());
        return;
    }
    for cart in carts {
        println!(
            "{}  {:<30} {:<12} {} adult(s), {} child(ren), total {:.2}  [{:?}]",
            cart.updated_at.to_rfc3339(),
            cart.customer_email,
            cart.product_id,
            cart.adults,
            cart.children,
            cart.total_amount,
            cart.status
        );
    }
}

async fn reconcile(config: &Config, product_id: &str, email: &str) -> Result<()> {
    let engine = sync_engine(config, api(config)?, Arc::new(SystemClock));

    match engine.reconcile(&ProductId::new(product_id), email).await {
        Some(cart) => println!(
            "Active cart updated {}: package {}, date {}, {} adult(s), {} child(ren)",
            cart.updated_at.to_rfc3339(),
            cart.package_id.as_ref().map_or("-", PackageId::as_str),
            cart.selected_date.as_deref().unwrap_or("-"),
            cart.adults,
            cart.children
        ),
        None => println!("No active cart for {email}"),
    }
    Ok(())
}

async fn resume(config: &Config, product_id: &str, link: &str) -> Result<()> {
    let link: BookingLink = link.parse()?;
    let api = api(config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(sync_engine(config, Arc::clone(&api), Arc::clone(&clock)));
    let driver = engine.spawn_driver(config.sync_tick());

    let env = BookingEnvironment::new(
        api,
        clock,
        Arc::clone(&engine),
        Arc::new(TracingAnalytics),
        Arc::new(TerminalCheckout),
    )
    .with_utc_offset(config.utc_offset()?)
    .with_debounce(config.availability_debounce());
    let store = Store::new(
        BookingFlowState::new(ProductId::new(product_id)),
        BookingFlowReducer::new(),
        env,
    );

    let mut actions = store.subscribe_actions();
    store.send(BookingFlowAction::ApplyLink(link)).await?;
    let quiet = config.availability_debounce() + SETTLE_GRACE;
    while let Ok(Ok(action)) = tokio::time::timeout(quiet, actions.recv()).await {
        debug!(?action, "Flow settled one action");
    }

    let state = store.state(Clone::clone).await;
    println!("Step {}", state.step.number());
    println!(
        "  date: {}",
        state.selected_date.map_or_else(|| "-".to_string(), iso_date)
    );
    println!("  party: {} adult(s), {} child(ren)", state.adults, state.children);
    match &state.selected_package {
        Some(package) => println!(
            "  package: {} ({}), total {:.2} {}",
            package.name,
            package.id,
            state.total_amount(),
            state.currency()
        ),
        None => println!("  package: -"),
    }
    println!("  time: {}", state.selected_time.as_deref().unwrap_or("-"));
    if state.recovered_cart.is_some() {
        println!(
            "  recovered cart of {} <{}>",
            state.customer_name, state.customer_email
        );
    }
    if let Some(error) = &state.error {
        println!("  error: {error}");
    }

    engine.flush_on_unload();
    driver.abort();
    Ok(())
}
