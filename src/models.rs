use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Domain Models
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Order {
    pub order_number: String,
    pub line_items: Vec<LineItem>,
    pub presentment_currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Passed through to the partner payload untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LineItem {
    pub sku: String,
    pub quantity: u32,
}

impl Order {
    /// Check the structural invariants an order must satisfy before it can
    /// be routed: a non-empty order number, at least one line item, and
    /// every line item carrying a real SKU and a quantity of at least one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_number.trim().is_empty() {
            return Err(ValidationError::MissingOrderNumber);
        }
        if self.line_items.is_empty() {
            return Err(ValidationError::NoLineItems);
        }
        for (index, item) in self.line_items.iter().enumerate() {
            if item.sku.trim().is_empty() {
                return Err(ValidationError::BlankSku { index });
            }
            if item.quantity == 0 {
                return Err(ValidationError::InvalidQuantity {
                    sku: item.sku.clone(),
                    quantity: item.quantity,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("order number must not be empty")]
    MissingOrderNumber,

    #[error("order has no line items")]
    NoLineItems,

    #[error("line item {index} has an empty SKU")]
    BlankSku { index: usize },

    #[error("line item {sku} has invalid quantity {quantity}")]
    InvalidQuantity { sku: String, quantity: u32 },
}

// ============================================================================
// Fulfillment Partners
// ============================================================================

/// The four fulfillment partners orders can be routed to. The wire names
/// ("F1", "F2", "F3", "F-US") appear in counter keys, job results, and
/// metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partner {
    F1,
    F2,
    F3,
    #[serde(rename = "F-US")]
    FUs,
}

impl Partner {
    pub const ALL: [Partner; 4] = [Partner::F1, Partner::F2, Partner::F3, Partner::FUs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partner::F1 => "F1",
            Partner::F2 => "F2",
            Partner::F3 => "F3",
            Partner::FUs => "F-US",
        }
    }
}

impl fmt::Display for Partner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value held per partner, keyed statically so lookups are total and
/// cannot miss a variant.
#[derive(Debug, Clone)]
pub struct PartnerMap<T> {
    pub f1: T,
    pub f2: T,
    pub f3: T,
    pub f_us: T,
}

impl<T> PartnerMap<T> {
    pub fn from_fn(mut build: impl FnMut(Partner) -> T) -> Self {
        Self {
            f1: build(Partner::F1),
            f2: build(Partner::F2),
            f3: build(Partner::F3),
            f_us: build(Partner::FUs),
        }
    }

    pub fn get(&self, partner: Partner) -> &T {
        match partner {
            Partner::F1 => &self.f1,
            Partner::F2 => &self.f2,
            Partner::F3 => &self.f3,
            Partner::FUs => &self.f_us,
        }
    }
}

/// Maximum orders a partner may receive in one UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeCap {
    Limited(u64),
    Unlimited,
}

impl VolumeCap {
    /// Parse a cap from configuration: a decimal integer or the literal
    /// "unlimited".
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().eq_ignore_ascii_case("unlimited") {
            return Some(VolumeCap::Unlimited);
        }
        raw.trim().parse().ok().map(VolumeCap::Limited)
    }

    pub fn is_reached(&self, volume: u64) -> bool {
        match self {
            VolumeCap::Unlimited => false,
            VolumeCap::Limited(cap) => volume >= *cap,
        }
    }
}

impl fmt::Display for VolumeCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeCap::Unlimited => f.write_str("unlimited"),
            VolumeCap::Limited(cap) => write!(f, "{}", cap),
        }
    }
}

// ============================================================================
// Routing Decisions
// ============================================================================

/// Why an order landed on a given partner. Closed set; these strings are
/// part of the job-result contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    UsOrder,
    RefillSku,
    MultiItem,
    SingleItemDefault,
    CapacityFallback,
    ErrorFallback,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteReason::UsOrder => "us_order",
            RouteReason::RefillSku => "refill_sku",
            RouteReason::MultiItem => "multi_item",
            RouteReason::SingleItemDefault => "single_item_default",
            RouteReason::CapacityFallback => "capacity_fallback",
            RouteReason::ErrorFallback => "error_fallback",
        }
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub partner: Partner,
    pub reason: RouteReason,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn order(items: Vec<LineItem>) -> Order {
        Order {
            order_number: "TEST-001".to_string(),
            line_items: items,
            presentment_currency: "GBP".to_string(),
            tags: None,
            shipping_address: None,
        }
    }

    #[test]
    fn test_valid_order_passes() {
        let order = order(vec![LineItem {
            sku: "STARTER-001".to_string(),
            quantity: 1,
        }]);
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_empty_line_items_rejected() {
        let order = order(vec![]);
        assert!(matches!(order.validate(), Err(ValidationError::NoLineItems)));
    }

    #[test]
    fn test_blank_sku_rejected() {
        let order = order(vec![
            LineItem {
                sku: "STARTER-001".to_string(),
                quantity: 1,
            },
            LineItem {
                sku: "  ".to_string(),
                quantity: 1,
            },
        ]);
        assert!(matches!(
            order.validate(),
            Err(ValidationError::BlankSku { index: 1 })
        ));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let order = order(vec![LineItem {
            sku: "STARTER-001".to_string(),
            quantity: 0,
        }]);
        assert!(matches!(
            order.validate(),
            Err(ValidationError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_missing_order_number_rejected() {
        let mut bad = order(vec![LineItem {
            sku: "STARTER-001".to_string(),
            quantity: 1,
        }]);
        bad.order_number = "".to_string();
        assert!(matches!(
            bad.validate(),
            Err(ValidationError::MissingOrderNumber)
        ));
    }

    #[test]
    fn test_partner_wire_names() {
        assert_eq!(serde_json::to_string(&Partner::F1).unwrap(), "\"F1\"");
        assert_eq!(serde_json::to_string(&Partner::FUs).unwrap(), "\"F-US\"");

        let parsed: Partner = serde_json::from_str("\"F-US\"").unwrap();
        assert_eq!(parsed, Partner::FUs);
    }

    #[test]
    fn test_partner_display_matches_serde() {
        for partner in Partner::ALL {
            let json = serde_json::to_string(&partner).unwrap();
            assert_eq!(json, format!("\"{}\"", partner));
        }
    }

    #[test]
    fn test_volume_cap_parsing() {
        assert_eq!(VolumeCap::parse("100"), Some(VolumeCap::Limited(100)));
        assert_eq!(VolumeCap::parse("unlimited"), Some(VolumeCap::Unlimited));
        assert_eq!(VolumeCap::parse("Unlimited"), Some(VolumeCap::Unlimited));
        assert_eq!(VolumeCap::parse("not-a-cap"), None);
    }

    #[test]
    fn test_volume_cap_reached() {
        let cap = VolumeCap::Limited(2);
        assert!(!cap.is_reached(0));
        assert!(!cap.is_reached(1));
        assert!(cap.is_reached(2));
        assert!(cap.is_reached(3));
        assert!(!VolumeCap::Unlimited.is_reached(u64::MAX));
    }

    #[test]
    fn test_route_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&RouteReason::UsOrder).unwrap(),
            "\"us_order\""
        );
        assert_eq!(
            serde_json::to_string(&RouteReason::CapacityFallback).unwrap(),
            "\"capacity_fallback\""
        );
    }

    #[test]
    fn test_routing_decision_serialization() {
        let decision = RoutingDecision {
            partner: Partner::F3,
            reason: RouteReason::RefillSku,
        };
        let json = serde_json::to_value(decision).unwrap();
        assert_eq!(json["partner"], "F3");
        assert_eq!(json["reason"], "refill_sku");
    }
}
