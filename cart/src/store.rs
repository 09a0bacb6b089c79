//! Cart Snapshot Store
//!
//! Best-effort persistence of [`CartSnapshot`]s over any
//! [`KeyValueStorage`]. Storage may be full, disabled or corrupt at any time;
//! none of that is allowed to reach the booking flow, so every operation logs
//! the failure and degrades to "no recovery available".

use std::sync::Arc;
use tourbook_core::cart::{CART_KEY_PREFIX, CartKey, CartSnapshot};
use tourbook_core::catalog::ProductId;
use tourbook_core::storage::KeyValueStorage;
use tracing::{debug, warn};

/// Snapshot persistence keyed by `abandoned_cart_{productId}_{customerEmail}`.
#[derive(Clone)]
pub struct CartSnapshotStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl CartSnapshotStore {
    /// Store over the given backend
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Write `snapshot` under its key. Returns whether the write succeeded.
    pub fn save(&self, snapshot: &CartSnapshot) -> bool {
        let key = snapshot.key().storage_key();
        let json = match serde_json::to_string(snapshot) {
            Ok(json) => json,
            Err(error) => {
                warn!(%key, %error, "Failed to serialize cart snapshot");
                return false;
            }
        };
        match self.storage.set(&key, &json) {
            Ok(()) => true,
            Err(error) => {
                warn!(%key, %error, "Failed to save cart snapshot");
                false
            }
        }
    }

    /// Snapshot for a product and customer, `None` when missing or unreadable.
    #[must_use]
    pub fn load(&self, product_id: &ProductId, email: &str) -> Option<CartSnapshot> {
        self.load_key(&CartKey::new(product_id.clone(), email))
    }

    /// Snapshot stored under `key`.
    #[must_use]
    pub fn load_key(&self, key: &CartKey) -> Option<CartSnapshot> {
        self.read(&key.storage_key())
    }

    /// Delete the snapshot for a product and customer. Returns whether the
    /// backend accepted the deletion.
    pub fn remove(&self, product_id: &ProductId, email: &str) -> bool {
        self.remove_key(&CartKey::new(product_id.clone(), email))
    }

    /// Delete the snapshot stored under `key`.
    pub fn remove_key(&self, key: &CartKey) -> bool {
        let key = key.storage_key();
        match self.storage.remove(&key) {
            Ok(()) => true,
            Err(error) => {
                warn!(%key, %error, "Failed to remove cart snapshot");
                false
            }
        }
    }

    /// Every readable snapshot, newest first.
    #[must_use]
    pub fn all(&self) -> Vec<CartSnapshot> {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(error) => {
                warn!(%error, "Failed to list cart snapshots");
                return Vec::new();
            }
        };
        let mut snapshots: Vec<CartSnapshot> = keys
            .iter()
            .filter(|key| key.starts_with(CART_KEY_PREFIX))
            .filter_map(|key| self.read(key))
            .collect();
        snapshots.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        snapshots
    }

    /// Snapshots of one product across customers, newest first.
    #[must_use]
    pub fn snapshots_for_product(&self, product_id: &ProductId) -> Vec<CartSnapshot> {
        self.all()
            .into_iter()
            .filter(|snapshot| &snapshot.product_id == product_id)
            .collect()
    }

    fn read(&self, key: &str) -> Option<CartSnapshot> {
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(%key, %error, "Failed to read cart snapshot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                debug!(%key, %error, "Ignoring unreadable cart snapshot");
                None
            }
        }
    }
}

impl std::fmt::Debug for CartSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSnapshotStore").finish_non_exhaustive()
    }
}
