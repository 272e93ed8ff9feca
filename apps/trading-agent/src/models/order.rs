//! Order submission outcomes.

use serde::{Deserialize, Serialize};

/// Result of one order submission attempt chain.
///
/// Produced by the order sequencer, consumed by the ledger to mutate
/// position and trade rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    /// Ticker symbol.
    pub symbol: String,
    /// Order side, "buy" or "sell".
    pub side: String,
    /// Whether the brokerage accepted the order.
    pub success: bool,
    /// Broker-assigned order id, when accepted.
    pub order_id: Option<String>,
    /// Deterministic client-supplied idempotency key.
    pub client_order_id: String,
    /// Quantity submitted.
    pub qty: f64,
    /// Filled quantity, when reported.
    pub filled_qty: Option<f64>,
    /// Average fill price, when reported.
    pub filled_price: Option<f64>,
    /// Last error message for a failed chain.
    pub error: Option<String>,
}

impl OrderResult {
    /// A failure result that never reached the brokerage.
    #[must_use]
    pub fn rejected(symbol: &str, side: &str, client_order_id: String, reason: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.to_string(),
            success: false,
            order_id: None,
            client_order_id,
            qty: 0.0,
            filled_qty: None,
            filled_price: None,
            error: Some(reason),
        }
    }
}
