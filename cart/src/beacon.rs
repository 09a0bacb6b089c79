//! Unload beacon contract
//!
//! When the hosting context is about to disappear there is no time left for
//! an awaited request. A beacon queues the body with something that outlives
//! the context (the browser's beacon queue, an OS-level spool, a sidecar) and
//! reports synchronously whether it accepted it.

use tourbook_api::SaveCartRequest;

/// Fire-and-forget delivery of the final cart save.
pub trait UnloadBeacon: Send + Sync {
    /// Queue `request` for `POST /abandoned-carts`. Must not block.
    /// Returns `false` when the beacon refused the body.
    fn send(&self, request: &SaveCartRequest) -> bool;
}
