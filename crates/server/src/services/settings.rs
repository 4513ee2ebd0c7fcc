//! Site settings with an in-memory read cache.
//!
//! Settings are read on most storefront requests (shipping rates at checkout,
//! enabled payment methods, home page content) and written rarely from the
//! back-office, so reads go through a `moka` cache that is invalidated on
//! every write.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, instrument};

use vitrina_core::shipping::ShippingRates;

use crate::db::RepositoryError;
use crate::db::settings::{SettingEntry, SettingsRepository};

/// Keys anyone may read. Everything else is admin-only.
pub const PUBLIC_KEYS: &[&str] = &["home", "contact", "payment_methods", "shipping", "site"];

/// Key holding [`ShippingRates`].
pub const SHIPPING_KEY: &str = "shipping";

const CACHE_TTL: Duration = Duration::from_secs(60);
const MAX_KEY_LENGTH: usize = 64;

/// Errors from settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Key is empty, too long or has characters outside `[a-z0-9_]`.
    #[error("invalid setting key: {0}")]
    InvalidKey(String),

    /// Value does not have the shape the key requires.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Whether `key` can be read without an admin session.
#[must_use]
pub fn is_public_key(key: &str) -> bool {
    PUBLIC_KEYS.contains(&key)
}

/// Settings store with a 60 second read cache.
#[derive(Clone)]
pub struct SettingsService {
    inner: Arc<SettingsServiceInner>,
}

struct SettingsServiceInner {
    pool: PgPool,
    cache: Cache<String, Option<JsonValue>>,
}

impl SettingsService {
    /// Create a settings service over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .max_capacity(256)
            .time_to_live(CACHE_TTL)
            .build();
        Self {
            inner: Arc::new(SettingsServiceInner { pool, cache }),
        }
    }

    /// Get a raw setting value.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidKey` for malformed keys and
    /// `SettingsError::Repository` if the database read fails.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<JsonValue>, SettingsError> {
        validate_key(key)?;

        if let Some(cached) = self.inner.cache.get(key).await {
            debug!("Cache hit for setting");
            return Ok(cached);
        }

        let value = SettingsRepository::new(&self.inner.pool).get(key).await?;
        self.inner
            .cache
            .insert(key.to_owned(), value.clone())
            .await;
        Ok(value)
    }

    /// Get a setting deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` if the stored JSON does not fit `T`.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SettingsError::InvalidValue {
                    key: key.to_owned(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Shipping rates, falling back to all-zero rates when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored rates cannot be read or parsed.
    pub async fn shipping_rates(&self) -> Result<ShippingRates, SettingsError> {
        Ok(self
            .get_typed::<ShippingRates>(SHIPPING_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Store a setting and drop it from the cache.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidKey`/`InvalidValue` on bad input and
    /// `SettingsError::Repository` if the write fails.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &JsonValue) -> Result<SettingEntry, SettingsError> {
        validate_key(key)?;
        validate_value(key, value)?;

        let entry = SettingsRepository::new(&self.inner.pool)
            .set(key, value)
            .await?;
        self.inner.cache.invalidate(key).await;
        tracing::info!(key, "Setting updated");
        Ok(entry)
    }

    /// List every stored setting (uncached).
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Repository` if the query fails.
    pub async fn list(&self) -> Result<Vec<SettingEntry>, SettingsError> {
        Ok(SettingsRepository::new(&self.inner.pool).list().await?)
    }
}

fn validate_key(key: &str) -> Result<(), SettingsError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(SettingsError::InvalidKey(key.to_owned()))
    }
}

/// Keys with a known shape are checked before they are stored.
fn validate_value(key: &str, value: &JsonValue) -> Result<(), SettingsError> {
    let invalid = |message: String| SettingsError::InvalidValue {
        key: key.to_owned(),
        message,
    };
    match key {
        SHIPPING_KEY => serde_json::from_value::<ShippingRates>(value.clone())
            .map(|_| ())
            .map_err(|e| invalid(e.to_string())),
        "payment_methods" if !value.is_object() => {
            Err(invalid("expected an object keyed by payment method".to_owned()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_public_keys() {
        assert!(is_public_key("home"));
        assert!(is_public_key("shipping"));
        assert!(!is_public_key("mercadopago"));
        assert!(!is_public_key("HOME"));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("payment_methods").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("Home").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key(&"k".repeat(65)).is_err());
    }

    #[test]
    fn test_shipping_value_must_parse() {
        assert!(
            validate_value(
                SHIPPING_KEY,
                &json!({"standard_cost": "3500", "express_cost": "6000"})
            )
            .is_ok()
        );
        assert!(matches!(
            validate_value(SHIPPING_KEY, &json!({"standard_cost": -1})),
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_payment_methods_must_be_object() {
        assert!(validate_value("payment_methods", &json!({"cash": {"enabled": true}})).is_ok());
        assert!(validate_value("payment_methods", &json!(["cash"])).is_err());
        assert!(validate_value("home", &json!(["anything"])).is_ok());
    }
}
