//! Abandoned-cart snapshots.
//!
//! A [`CartSnapshot`] is the persisted state of one in-progress booking
//! attempt. It is identified by `(product, customer email)`; several
//! snapshots for different pairs can coexist in storage.

use crate::catalog::{PackageId, ProductId, SlotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Storage key prefix shared by every snapshot.
pub const CART_KEY_PREFIX: &str = "abandoned_cart_";

/// Lifecycle status of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    /// Booking attempt still in progress
    #[default]
    Open,
    /// Booked or dismissed
    Closed,
}

/// Identity of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CartKey {
    /// Product being booked
    pub product_id: ProductId,
    /// Customer email as typed
    pub email: String,
}

impl CartKey {
    /// Create a key.
    #[must_use]
    pub fn new(product_id: ProductId, email: impl Into<String>) -> Self {
        Self {
            product_id,
            email: email.into(),
        }
    }

    /// Durable storage key: `abandoned_cart_{productId}_{customerEmail}`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{CART_KEY_PREFIX}{}_{}", self.product_id, self.email)
    }
}

impl fmt::Display for CartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// One in-progress booking attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    /// Product being booked
    pub product_id: ProductId,
    /// Selected package
    #[serde(default)]
    pub package_id: Option<PackageId>,
    /// Selected slot
    #[serde(default)]
    pub slot_id: Option<SlotId>,
    /// Customer name
    #[serde(default)]
    pub customer_name: String,
    /// Customer email (part of the identity)
    pub customer_email: String,
    /// Customer phone
    #[serde(default)]
    pub customer_phone: String,
    /// Adult participants
    #[serde(default)]
    pub adults: u32,
    /// Child participants
    #[serde(default)]
    pub children: u32,
    /// Selected date, ISO `YYYY-MM-DD`
    #[serde(default)]
    pub selected_date: Option<String>,
    /// Selected clock time, `HH:mm`
    #[serde(default)]
    pub selected_time_slot: Option<String>,
    /// Computed total
    #[serde(default)]
    pub total_amount: f64,
    /// Lifecycle status
    #[serde(default)]
    pub status: CartStatus,
    /// Last modification, assigned on save
    pub updated_at: DateTime<Utc>,
}

impl CartSnapshot {
    /// An empty open snapshot for a product and email.
    #[must_use]
    pub fn new(product_id: ProductId, email: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            package_id: None,
            slot_id: None,
            customer_name: String::new(),
            customer_email: email.into(),
            customer_phone: String::new(),
            adults: 0,
            children: 0,
            selected_date: None,
            selected_time_slot: None,
            total_amount: 0.0,
            status: CartStatus::Open,
            updated_at,
        }
    }

    /// Identity of this snapshot.
    #[must_use]
    pub fn key(&self) -> CartKey {
        CartKey::new(self.product_id.clone(), self.customer_email.clone())
    }

    /// Whether the booking attempt is still in progress.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == CartStatus::Open
    }

    /// Hash of the fields whose change is worth syncing
    /// (name, email, phone, date, package, amount).
    ///
    /// Timestamps and status are excluded so re-saving identical content
    /// yields the same hash.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.customer_name.as_str(),
            self.customer_email.as_str(),
            self.customer_phone.as_str(),
            self.selected_date.as_deref().unwrap_or_default(),
            self.package_id.as_ref().map(PackageId::as_str).unwrap_or_default(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(format!("{:.2}", self.total_amount).as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
