//! Shipping cost calculation.
//!
//! Rates come from the `shipping` setting so the back-office can change them
//! without a deploy. The calculation itself is pure: the same inputs always
//! yield the same quote, which is what lets the server recompute the cost a
//! client displayed during checkout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Money;

/// How an order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.shipping_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    /// Customer collects the order at the shop.
    Pickup,
    /// Regular home delivery.
    Standard,
    /// Priority home delivery.
    Express,
}

impl ShippingMethod {
    /// All methods offered at checkout.
    pub const ALL: [Self; 3] = [Self::Pickup, Self::Standard, Self::Express];

    /// Whether the order has to be dispatched to an address.
    #[must_use]
    pub const fn requires_address(self) -> bool {
        !matches!(self, Self::Pickup)
    }
}

/// Rates for one province.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRate {
    /// Standard delivery cost.
    pub standard: Money,
    /// Express delivery cost; `None` when express is not offered in the zone.
    #[serde(default)]
    pub express: Option<Money>,
}

/// Shipping configuration stored under the `shipping` setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRates {
    /// Default standard delivery cost.
    pub standard_cost: Money,
    /// Default express delivery cost.
    pub express_cost: Money,
    /// Orders at or above this subtotal ship for free.
    #[serde(default)]
    pub free_shipping_threshold: Option<Money>,
    /// Per-province overrides, keyed by province name (matched case-insensitively).
    #[serde(default)]
    pub zones: HashMap<String, ZoneRate>,
}

impl Default for ShippingRates {
    fn default() -> Self {
        Self {
            standard_cost: Money::ZERO,
            express_cost: Money::ZERO,
            free_shipping_threshold: None,
            zones: HashMap::new(),
        }
    }
}

/// Errors from [`calculate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShippingError {
    /// A home-delivery method was requested without a province.
    #[error("a province is required for {0:?} shipping")]
    MissingProvince(ShippingMethod),
    /// The zone does not offer the requested method.
    #[error("{method:?} shipping is not available in {province}")]
    Unavailable {
        /// Requested method.
        method: ShippingMethod,
        /// Province that lacks it.
        province: String,
    },
}

/// A computed shipping cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    /// Method quoted.
    pub method: ShippingMethod,
    /// Cost to charge.
    pub cost: Money,
    /// Whether the free-shipping threshold applied.
    pub free: bool,
    /// Who produced the quote (`local` for rate-table quotes, or a carrier name).
    pub source: String,
}

impl ShippingRates {
    fn zone(&self, province: &str) -> Option<&ZoneRate> {
        let wanted = province.trim();
        self.zones
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, rate)| rate)
    }
}

/// Compute the shipping cost for an order.
///
/// - Pickup is always free and needs no province.
/// - A province override beats the default rate.
/// - When a free-shipping threshold is configured and `subtotal` reaches it, the cost is zero.
///
/// # Errors
///
/// Returns `ShippingError::MissingProvince` for home delivery without a province,
/// and `ShippingError::Unavailable` when the province's zone has no express rate.
pub fn calculate(
    rates: &ShippingRates,
    method: ShippingMethod,
    province: Option<&str>,
    subtotal: Money,
) -> Result<ShippingQuote, ShippingError> {
    let local = |cost: Money, free: bool| ShippingQuote {
        method,
        cost,
        free,
        source: "local".to_owned(),
    };

    if method == ShippingMethod::Pickup {
        return Ok(local(Money::ZERO, false));
    }

    let province = province
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(ShippingError::MissingProvince(method))?;

    let base = match (method, rates.zone(province)) {
        (ShippingMethod::Standard, Some(zone)) => zone.standard,
        (ShippingMethod::Express, Some(zone)) => {
            zone.express.ok_or_else(|| ShippingError::Unavailable {
                method,
                province: province.to_owned(),
            })?
        }
        (ShippingMethod::Standard, None) => rates.standard_cost,
        (ShippingMethod::Express, None) => rates.express_cost,
        (ShippingMethod::Pickup, _) => Money::ZERO,
    };

    let free = rates
        .free_shipping_threshold
        .is_some_and(|threshold| subtotal >= threshold);

    Ok(if free {
        local(Money::ZERO, true)
    } else {
        local(base, false)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn money(cents: i64) -> Money {
        Money::from_cents(cents).unwrap()
    }

    fn rates() -> ShippingRates {
        let mut zones = HashMap::new();
        zones.insert(
            "Tierra del Fuego".to_owned(),
            ZoneRate {
                standard: money(900_000),
                express: None,
            },
        );
        ShippingRates {
            standard_cost: money(350_000),
            express_cost: money(600_000),
            free_shipping_threshold: Some(money(5_000_000)),
            zones,
        }
    }

    #[test]
    fn test_pickup_is_free_without_province() {
        let quote = calculate(&rates(), ShippingMethod::Pickup, None, money(100)).unwrap();
        assert!(quote.cost.is_zero());
        assert!(!quote.free);
    }

    #[test]
    fn test_default_rate() {
        let quote =
            calculate(&rates(), ShippingMethod::Express, Some("Córdoba"), money(1_000)).unwrap();
        assert_eq!(quote.cost, money(600_000));
    }

    #[test]
    fn test_zone_override_case_insensitive() {
        let quote = calculate(
            &rates(),
            ShippingMethod::Standard,
            Some("tierra DEL fuego "),
            money(1_000),
        )
        .unwrap();
        assert_eq!(quote.cost, money(900_000));
    }

    #[test]
    fn test_zone_without_express() {
        let err = calculate(
            &rates(),
            ShippingMethod::Express,
            Some("Tierra del Fuego"),
            money(1_000),
        )
        .unwrap_err();
        assert!(matches!(err, ShippingError::Unavailable { .. }));
    }

    #[test]
    fn test_free_threshold_is_inclusive() {
        let quote = calculate(
            &rates(),
            ShippingMethod::Standard,
            Some("Mendoza"),
            money(5_000_000),
        )
        .unwrap();
        assert!(quote.free);
        assert!(quote.cost.is_zero());

        let below = calculate(
            &rates(),
            ShippingMethod::Standard,
            Some("Mendoza"),
            money(4_999_999),
        )
        .unwrap();
        assert!(!below.free);
    }

    #[test]
    fn test_missing_province() {
        assert_eq!(
            calculate(&rates(), ShippingMethod::Standard, Some("  "), money(1)),
            Err(ShippingError::MissingProvince(ShippingMethod::Standard))
        );
    }

    #[test]
    fn test_rates_deserialize_with_defaults() {
        let parsed: ShippingRates =
            serde_json::from_str(r#"{"standard_cost": "3500", "express_cost": 6000}"#).unwrap();
        assert!(parsed.zones.is_empty());
        assert!(parsed.free_shipping_threshold.is_none());
    }
}
