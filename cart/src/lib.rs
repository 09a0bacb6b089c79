//! # Tourbook Cart
//!
//! Abandoned-cart capture, persistence and recovery.
//!
//! ## Components
//!
//! - [`storage`]: key-value backends (in-memory, JSON file)
//! - [`store`]: [`CartSnapshotStore`], best-effort snapshot persistence
//! - [`sync`]: [`CartSyncEngine`], deduplicated and debounced server and
//!   cross-context sync with clear-wins semantics and reconciliation
//! - [`beacon`]: [`UnloadBeacon`], fire-and-forget delivery on unload
//!
//! ## Example
//!
//! ```ignore
//! let store = CartSnapshotStore::new(Arc::new(JsonFileStorage::new(".tourbook/storage.json")));
//! let engine = Arc::new(CartSyncEngine::new(
//!     store,
//!     api,
//!     Arc::new(LocalBroadcastChannel::default()),
//!     Arc::new(SystemClock),
//!     SyncConfig::default(),
//! ));
//! let _driver = engine.spawn_driver(Duration::from_millis(250));
//!
//! engine.arm(CartKey::new(product_id, "ada@example.com"));
//! engine.record_change(snapshot);
//! ```

pub mod beacon;
pub mod storage;
pub mod store;
pub mod sync;

pub use beacon::UnloadBeacon;
pub use storage::{JsonFileStorage, MemoryStorage};
pub use store::CartSnapshotStore;
pub use sync::{CartSyncEngine, ChangeOutcome, FlushOutcome, SyncConfig, TickReport};
