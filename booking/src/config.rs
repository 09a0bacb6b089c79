//! Configuration management for Tourbook.
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present) with sensible defaults.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tourbook_api::DEFAULT_API_URL;
use tourbook_cart::SyncConfig;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be used
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend configuration
    pub api: ApiConfig,
    /// Local storage configuration
    pub storage: StorageConfig,
    /// Booking flow configuration
    pub booking: BookingConfig,
    /// Cart sync configuration
    pub sync: CartSyncConfig,
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// REST base URL
    pub url: String,
}

/// Local storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding abandoned carts
    pub path: PathBuf,
}

/// Booking flow configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Offset of tour-local time from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// Packages query debounce in milliseconds (default: 200)
    pub availability_debounce_ms: u64,
}

/// Cart sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSyncConfig {
    /// Server POST debounce in milliseconds (default: 3000)
    pub server_debounce_ms: u64,
    /// Cross-context broadcast debounce in milliseconds (default: 5000)
    pub broadcast_debounce_ms: u64,
    /// Sync driver poll interval in milliseconds (default: 250)
    pub tick_ms: u64,
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a numeric variable does not parse
    /// or the UTC offset is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            api: ApiConfig {
                url: lookup("TOURBOOK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            },
            storage: StorageConfig {
                path: lookup("TOURBOOK_STORAGE_PATH")
                    .map_or_else(|| PathBuf::from(".tourbook/storage.json"), PathBuf::from),
            },
            booking: BookingConfig {
                utc_offset_minutes: parse(&lookup, "TOURBOOK_UTC_OFFSET_MINUTES", 0)?,
                availability_debounce_ms: parse(&lookup, "TOURBOOK_AVAILABILITY_DEBOUNCE_MS", 200)?,
            },
            sync: CartSyncConfig {
                server_debounce_ms: parse(&lookup, "TOURBOOK_CART_SERVER_DEBOUNCE_MS", 3000)?,
                broadcast_debounce_ms: parse(&lookup, "TOURBOOK_CART_BROADCAST_DEBOUNCE_MS", 5000)?,
                tick_ms: parse(&lookup, "TOURBOOK_SYNC_TICK_MS", 250)?,
            },
        };
        config.utc_offset()?;
        Ok(config)
    }

    /// Tour-local UTC offset
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for offsets of a day or more.
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        let minutes = self.booking.utc_offset_minutes;
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::Invalid {
                key: "TOURBOOK_UTC_OFFSET_MINUTES".to_string(),
                value: minutes.to_string(),
            })
    }

    /// Packages query debounce
    #[must_use]
    pub const fn availability_debounce(&self) -> Duration {
        Duration::from_millis(self.booking.availability_debounce_ms)
    }

    /// Debounce windows for the cart sync engine
    #[must_use]
    pub const fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            server_delay: Duration::from_millis(self.sync.server_debounce_ms),
            broadcast_delay: Duration::from_millis(self.sync.broadcast_debounce_ms),
        }
    }

    /// Poll interval of the cart sync driver
    #[must_use]
    pub const fn sync_tick(&self) -> Duration {
        Duration::from_millis(self.sync.tick_ms)
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
    }
}
