//! Cart update broadcasting across execution contexts.
//!
//! Several contexts (browser tabs, windows, processes sharing a storage file)
//! can show a recovery banner for the same cart. Whenever one of them saves
//! or clears a snapshot it publishes a [`CartUpdate`] so the others can
//! refresh without reloading.
//!
//! # Delivery
//!
//! - **At-most-once**: a subscriber that falls behind loses the oldest updates
//! - **Ordered per publisher**: updates from one context arrive in publish order
//! - **Latest wins**: receivers should treat each update as the full state of
//!   its key, not as a delta
//!
//! # Example
//!
//! ```
//! use tourbook_core::broadcast::{CartBroadcaster, CartUpdate, LocalBroadcastChannel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let channel = LocalBroadcastChannel::new(16);
//! let mut rx = channel.subscribe();
//! channel.publish(CartUpdate::cleared("abandoned_cart_p1_ada@example.com"));
//! let update = rx.recv().await.unwrap();
//! assert!(update.cart.is_none());
//! # }
//! ```

use crate::cart::CartSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Payload of a cart broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartUpdate {
    /// Storage key of the cart
    pub key: String,
    /// New content, `None` when the cart was cleared
    #[serde(rename = "cartData")]
    pub cart: Option<CartSnapshot>,
}

impl CartUpdate {
    /// Update carrying new snapshot content.
    #[must_use]
    pub fn saved(snapshot: CartSnapshot) -> Self {
        Self {
            key: snapshot.key().storage_key(),
            cart: Some(snapshot),
        }
    }

    /// Update announcing that the cart under `key` is gone.
    #[must_use]
    pub fn cleared(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cart: None,
        }
    }
}

/// Publish/subscribe contract for cart updates.
pub trait CartBroadcaster: Send + Sync {
    /// Publish an update to every current subscriber. Never fails; having no
    /// subscribers is not an error.
    fn publish(&self, update: CartUpdate);

    /// Subscribe to updates published after this call.
    fn subscribe(&self) -> broadcast::Receiver<CartUpdate>;
}

/// In-process broadcaster backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct LocalBroadcastChannel {
    sender: broadcast::Sender<CartUpdate>,
}

impl LocalBroadcastChannel {
    /// Create a channel buffering up to `capacity` updates per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for LocalBroadcastChannel {
    fn default() -> Self {
        Self::new(32)
    }
}

impl CartBroadcaster for LocalBroadcastChannel {
    fn publish(&self, update: CartUpdate) {
        // No receivers is fine: nobody else is showing this cart.
        let _ = self.sender.send(update);
    }

    fn subscribe(&self) -> broadcast::Receiver<CartUpdate> {
        self.sender.subscribe()
    }
}
