use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{Order, Partner};

mod http;

pub use http::HttpDispatcher;

// ============================================================================
// Partner Dispatch Port
// ============================================================================
//
// Hands a routed order to a fulfillment partner. The queue processor only
// needs success or failure; delivery is at-least-once and partners handle
// duplicates idempotently on their side.
//
// ============================================================================

#[async_trait]
pub trait PartnerDispatcher: Send + Sync {
    async fn dispatch(&self, partner: Partner, order: &Order)
        -> Result<DispatchReceipt, DispatchError>;
}

/// What a partner acknowledged. The tracking reference is partner-assigned
/// and treated as opaque.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchReceipt {
    #[serde(default)]
    pub tracking_reference: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("partner {partner} request failed: {source}")]
    Network {
        partner: Partner,
        #[source]
        source: reqwest::Error,
    },

    #[error("partner {partner} responded with status {status}")]
    Rejected { partner: Partner, status: u16 },

    #[error("partner {partner} circuit is open")]
    CircuitOpen { partner: Partner },
}
