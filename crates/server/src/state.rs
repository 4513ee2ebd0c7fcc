//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::services::orders::OrderService;
use crate::services::payments::{MercadoPagoClient, PaymentError};
use crate::services::settings::SettingsService;
use crate::services::shipping::{CarrierClient, CarrierError, ShippingService};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("mercadopago client: {0}")]
    MercadoPago(#[from] PaymentError),
    #[error("carrier client: {0}")]
    Carrier(#[from] CarrierError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    settings: SettingsService,
    shipping: ShippingService,
    mercadopago: Option<MercadoPagoClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// HTTP clients are only built for the integrations that are configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured HTTP client cannot be built.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, StateError> {
        let settings = SettingsService::new(pool.clone());

        let carrier = config
            .shipping_quotes
            .as_ref()
            .map(CarrierClient::new)
            .transpose()?;
        let shipping = ShippingService::new(settings.clone(), carrier);

        let mercadopago = config
            .mercadopago
            .as_ref()
            .map(|mp| MercadoPagoClient::new(mp, &config.base_url))
            .transpose()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                settings,
                shipping,
                mercadopago,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the cached settings store.
    #[must_use]
    pub fn settings(&self) -> &SettingsService {
        &self.inner.settings
    }

    /// Get the shipping quote service.
    #[must_use]
    pub fn shipping(&self) -> &ShippingService {
        &self.inner.shipping
    }

    /// Get the MercadoPago client, if configured.
    #[must_use]
    pub fn mercadopago(&self) -> Option<&MercadoPagoClient> {
        self.inner.mercadopago.as_ref()
    }

    /// Order service over this state's pool and services.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(&self.inner.pool, &self.inner.shipping, &self.inner.settings)
    }
}
