use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::models::{Order, Partner, PartnerMap, RouteReason, RoutingDecision, VolumeCap};
use crate::volume::VolumeStore;

// ============================================================================
// Routing Decision Engine
// ============================================================================
//
// Partner selection is a fixed cascade of business-eligibility rules,
// evaluated top to bottom, first match wins. Daily volume caps are checked
// separately: eligibility is static configuration while capacity is a
// time-windowed constraint, and the queue processor decides what to do
// when the preferred partner is full.
//
// Counter-store failures never fail an order. Caps are a soft business
// constraint, so capacity checks fail open and increments are best-effort.
//
// ============================================================================

/// SKU sets the cascade predicates match against.
pub struct RoutingTables {
    pub us_skus: HashSet<String>,
    pub refill_skus: HashSet<String>,
}

struct CascadeRule {
    partner: Partner,
    reason: RouteReason,
    applies: fn(&RoutingTables, &Order) -> bool,
}

/// Ordered routing rules. Priority is the slice order.
const CASCADE: &[CascadeRule] = &[
    CascadeRule {
        partner: Partner::FUs,
        reason: RouteReason::UsOrder,
        applies: is_us_order,
    },
    CascadeRule {
        partner: Partner::F3,
        reason: RouteReason::RefillSku,
        applies: is_single_refill,
    },
    CascadeRule {
        partner: Partner::F1,
        reason: RouteReason::MultiItem,
        applies: is_multi_item,
    },
    CascadeRule {
        partner: Partner::F2,
        reason: RouteReason::SingleItemDefault,
        applies: always,
    },
];

fn is_us_order(tables: &RoutingTables, order: &Order) -> bool {
    order.presentment_currency == "USD"
        && order
            .line_items
            .iter()
            .any(|item| tables.us_skus.contains(&item.sku))
}

fn is_single_refill(tables: &RoutingTables, order: &Order) -> bool {
    match order.line_items.as_slice() {
        [only] => only.quantity == 1 && tables.refill_skus.contains(&only.sku),
        _ => false,
    }
}

fn is_multi_item(_: &RoutingTables, order: &Order) -> bool {
    order.line_items.len() > 1
}

fn always(_: &RoutingTables, _: &Order) -> bool {
    true
}

/// F1 has no volume cap, making it the safe landing spot both for orders
/// that cannot be routed normally and for capacity overflow.
pub const FALLBACK_PARTNER: Partner = Partner::F1;

pub struct RoutingService {
    tables: RoutingTables,
    caps: PartnerMap<VolumeCap>,
    store: Arc<dyn VolumeStore>,
    metrics: Arc<Metrics>,
}

impl RoutingService {
    pub fn new(
        tables: RoutingTables,
        caps: PartnerMap<VolumeCap>,
        store: Arc<dyn VolumeStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tables,
            caps,
            store,
            metrics,
        }
    }

    /// Select a partner for the order. Structurally broken orders do not
    /// error out of routing; they land on the unlimited partner with the
    /// `error_fallback` reason so fulfillment still proceeds.
    pub fn determine_partner(&self, order: &Order) -> RoutingDecision {
        if let Err(err) = order.validate() {
            tracing::warn!(
                order_number = %order.order_number,
                error = %err,
                "order failed routing validation, using fallback partner"
            );
            return RoutingDecision {
                partner: FALLBACK_PARTNER,
                reason: RouteReason::ErrorFallback,
            };
        }

        for rule in CASCADE {
            if (rule.applies)(&self.tables, order) {
                return RoutingDecision {
                    partner: rule.partner,
                    reason: rule.reason,
                };
            }
        }

        // The cascade ends in a catch-all rule; this is unreachable but
        // keeps the fallback policy explicit.
        RoutingDecision {
            partner: FALLBACK_PARTNER,
            reason: RouteReason::ErrorFallback,
        }
    }

    /// Whether the partner has used up today's volume cap. Counter-store
    /// failures read as "not at capacity".
    pub async fn is_at_capacity(&self, partner: Partner) -> bool {
        let cap = *self.caps.get(partner);
        if cap == VolumeCap::Unlimited {
            return false;
        }

        let today = Utc::now().date_naive();
        match self.store.current(partner, today).await {
            Ok(volume) => cap.is_reached(volume),
            Err(err) => {
                tracing::warn!(
                    partner = %partner,
                    error = %err,
                    "volume check failed, treating partner as available"
                );
                self.metrics.record_volume_store_error("current");
                false
            }
        }
    }

    /// Count one dispatched order against the partner's daily volume.
    /// Called exactly once per successful dispatch; a failed increment is
    /// logged and dropped rather than failing the already-shipped order.
    pub async fn increment_volume(&self, partner: Partner) {
        let today = Utc::now().date_naive();
        match self.store.increment(partner, today).await {
            Ok(total) => {
                tracing::debug!(partner = %partner, total, "recorded fulfillment volume");
            }
            Err(err) => {
                tracing::warn!(
                    partner = %partner,
                    error = %err,
                    "volume increment failed, daily counter may undercount"
                );
                self.metrics.record_volume_store_error("increment");
            }
        }
    }

    /// Today's volume for monitoring surfaces; reads as zero when the
    /// counter store is unavailable.
    pub async fn current_volume(&self, partner: Partner) -> u64 {
        let today = Utc::now().date_naive();
        match self.store.current(partner, today).await {
            Ok(volume) => volume,
            Err(err) => {
                tracing::warn!(partner = %partner, error = %err, "volume read failed");
                self.metrics.record_volume_store_error("current");
                0
            }
        }
    }

    pub fn cap_for(&self, partner: Partner) -> VolumeCap {
        *self.caps.get(partner)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
