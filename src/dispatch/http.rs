use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::{DispatchError, DispatchReceipt, PartnerDispatcher};
use crate::metrics::Metrics;
use crate::models::{Order, Partner, PartnerMap};
use crate::utils::{BreakerConfig, CircuitBreaker};

// ============================================================================
// HTTP Partner Dispatcher
// ============================================================================
//
// POSTs the order payload to the partner's configured endpoint. Each
// partner gets its own circuit breaker so one dead partner does not burn
// a full timeout on every attempt while the others stay reachable.
//
// ============================================================================

pub struct HttpDispatcher {
    client: Client,
    endpoints: PartnerMap<String>,
    breakers: PartnerMap<CircuitBreaker>,
    metrics: Arc<Metrics>,
}

impl HttpDispatcher {
    pub fn new(
        endpoints: PartnerMap<String>,
        request_timeout: Duration,
        breaker_config: BreakerConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let breakers = PartnerMap::from_fn(|_| CircuitBreaker::new(breaker_config.clone()));

        Ok(Self {
            client,
            endpoints,
            breakers,
            metrics,
        })
    }

    fn publish_state(&self, partner: Partner) {
        let state = self.breakers.get(partner).state();
        self.metrics.set_circuit_state(partner, state.as_code());
    }
}

/// Body POSTed to partner endpoints.
pub(crate) fn dispatch_payload(order: &Order) -> serde_json::Value {
    json!({
        "order_number": order.order_number,
        "line_items": order.line_items,
        "shipping_address": order.shipping_address,
    })
}

#[async_trait]
impl PartnerDispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        partner: Partner,
        order: &Order,
    ) -> Result<DispatchReceipt, DispatchError> {
        let breaker = self.breakers.get(partner);
        if !breaker.try_acquire() {
            self.publish_state(partner);
            tracing::warn!(
                partner = %partner,
                order_number = %order.order_number,
                "circuit open, refusing dispatch attempt"
            );
            return Err(DispatchError::CircuitOpen { partner });
        }

        let url = self.endpoints.get(partner);
        let result = self
            .client
            .post(url)
            .json(&dispatch_payload(order))
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => {
                breaker.record_success();
                // The acknowledgement body is optional and opaque.
                let receipt = response
                    .json::<DispatchReceipt>()
                    .await
                    .unwrap_or_default();
                tracing::info!(
                    partner = %partner,
                    order_number = %order.order_number,
                    tracking_reference = ?receipt.tracking_reference,
                    "order dispatched to partner"
                );
                Ok(receipt)
            }
            Ok(response) => {
                breaker.record_failure();
                let status = response.status().as_u16();
                tracing::warn!(
                    partner = %partner,
                    order_number = %order.order_number,
                    status,
                    "partner rejected dispatch"
                );
                Err(DispatchError::Rejected { partner, status })
            }
            Err(source) => {
                breaker.record_failure();
                tracing::warn!(
                    partner = %partner,
                    order_number = %order.order_number,
                    error = %source,
                    "partner dispatch request failed"
                );
                Err(DispatchError::Network { partner, source })
            }
        };

        self.publish_state(partner);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineItem;

    fn endpoints() -> PartnerMap<String> {
        PartnerMap::from_fn(|p| format!("http://127.0.0.1:9/partner-{}", p.as_str().to_lowercase()))
    }

    fn order() -> Order {
        Order {
            order_number: "TEST-001".to_string(),
            line_items: vec![LineItem {
                sku: "STARTER-001".to_string(),
                quantity: 2,
            }],
            presentment_currency: "GBP".to_string(),
            tags: None,
            shipping_address: Some(json!({"country": "GB", "zip": "SW1A 1AA"})),
        }
    }

    #[test]
    fn test_payload_carries_contract_fields() {
        let payload = dispatch_payload(&order());

        assert_eq!(payload["order_number"], "TEST-001");
        assert_eq!(payload["line_items"][0]["sku"], "STARTER-001");
        assert_eq!(payload["line_items"][0]["quantity"], 2);
        assert_eq!(payload["shipping_address"]["country"], "GB");
    }

    #[test]
    fn test_payload_with_no_address_is_null() {
        let mut order = order();
        order.shipping_address = None;
        let payload = dispatch_payload(&order);
        assert!(payload["shipping_address"].is_null());
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_dispatch() {
        let breaker_config = BreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
            close_after: 1,
        };
        let dispatcher = HttpDispatcher::new(
            endpoints(),
            Duration::from_millis(100),
            breaker_config,
            Arc::new(Metrics::new().unwrap()),
        )
        .unwrap();

        // Trip the F2 breaker directly; the endpoint is never contacted.
        dispatcher.breakers.get(Partner::F2).record_failure();

        let result = dispatcher.dispatch(Partner::F2, &order()).await;
        assert!(matches!(
            result,
            Err(DispatchError::CircuitOpen {
                partner: Partner::F2
            })
        ));
    }

    #[test]
    fn test_receipt_parses_tracking_reference() {
        let receipt: DispatchReceipt =
            serde_json::from_str(r#"{"tracking_reference": "TRK-42"}"#).unwrap();
        assert_eq!(receipt.tracking_reference.as_deref(), Some("TRK-42"));

        let empty: DispatchReceipt = serde_json::from_str("{}").unwrap();
        assert!(empty.tracking_reference.is_none());
    }
}
