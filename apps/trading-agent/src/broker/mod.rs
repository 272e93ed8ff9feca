//! Brokerage port and wire-level types.
//!
//! The pipeline talks to the brokerage only through [`BrokerPort`], so tests
//! substitute fakes and the production adapter ([`alpaca::AlpacaBroker`])
//! stays at the edge.

pub mod alpaca;

use async_trait::async_trait;

pub use alpaca::AlpacaBroker;

/// Brokerage call failure.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Credentials missing or rejected.
    #[error("broker authentication failed")]
    AuthenticationFailed,

    /// Transport-level failure.
    #[error("broker network error: {0}")]
    Network(String),

    /// The brokerage rejected the order.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// The API answered with an error payload.
    #[error("broker API error {code}: {message}")]
    Api {
        /// HTTP status or API error code.
        code: String,
        /// Error message from the response body.
        message: String,
    },

    /// A response body could not be decoded.
    #[error("broker response parse error: {0}")]
    Parse(String),

    /// Order submission refused locally because the account is not a paper
    /// account. Never retried.
    #[error("refusing to submit orders outside the paper endpoint")]
    NotPaperAccount,
}

/// Account-level snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    /// Total equity.
    pub equity: f64,
    /// Settled cash.
    pub cash: f64,
    /// Buying power.
    pub buying_power: f64,
}

/// One open position as reported by the brokerage.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerPosition {
    /// Ticker symbol.
    pub symbol: String,
    /// Signed share quantity.
    pub qty: f64,
    /// Average entry price.
    pub avg_entry_price: f64,
    /// Latest market price.
    pub current_price: f64,
    /// Unrealized profit and loss.
    pub unrealized_pnl: f64,
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    /// Buy to open.
    Buy,
    /// Sell to close.
    Sell,
}

impl OrderSide {
    /// Lowercase wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// Order shape submitted to the brokerage.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKind {
    /// Full-quantity market order.
    Market,
    /// Bracket order: limit entry plus protective stop and take-profit legs.
    Bracket {
        /// Entry limit price.
        limit_price: f64,
        /// Stop leg trigger price.
        stop_trigger: f64,
        /// Stop leg limit price.
        stop_limit: f64,
        /// Take-profit leg limit price.
        take_profit: f64,
    },
}

/// An order to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    /// Ticker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Whole-share quantity.
    pub qty: f64,
    /// Order shape.
    pub kind: OrderKind,
    /// Deterministic idempotency key; the brokerage dedupes on it.
    pub client_order_id: String,
}

/// Acknowledgement for a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    /// Broker-assigned order id.
    pub order_id: String,
    /// Order status as reported.
    pub status: String,
    /// Filled quantity, when already reported.
    pub filled_qty: Option<f64>,
    /// Average fill price, when already reported.
    pub filled_price: Option<f64>,
}

/// Interface to the brokerage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Fetch the account snapshot.
    async fn account(&self) -> Result<AccountSnapshot, BrokerError>;

    /// Fetch all open positions.
    async fn open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Submit one order.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError>;

    /// Recent daily closing prices for `symbol`, oldest first, at most
    /// `limit` bars.
    async fn daily_closes(&self, symbol: &str, limit: usize) -> Result<Vec<f64>, BrokerError>;
}
