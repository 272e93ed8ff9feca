//! SELL-before-BUY order dispatcher.
//!
//! The accepted decision batch is partitioned into sells and buys, preserving
//! insertion order within each side, and every sell is dispatched before any
//! buy so freed capital is available for entries. Each order is attempted at
//! most twice, with no backoff between attempts; a failed chain surfaces the
//! last error in its [`OrderResult`] and never aborts sibling orders.

use crate::broker::{BrokerPort, OrderKind, OrderRequest, OrderSide};
use crate::models::{Action, OrderResult, PortfolioState, TradingDecision};
use crate::risk::PositionSizer;

/// Maximum submission attempts per order.
const MAX_ATTEMPTS: u32 = 2;

/// Floor factor for the bracket stop-limit leg relative to entry.
const STOP_LIMIT_FLOOR: f64 = 0.92;

/// Order dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct OrderSequencer {
    sizer: PositionSizer,
}

impl OrderSequencer {
    /// New sequencer using `sizer` for buy quantities.
    #[must_use]
    pub const fn new(sizer: PositionSizer) -> Self {
        Self { sizer }
    }

    /// Deterministic idempotency key for one order.
    #[must_use]
    pub fn client_order_id(run_id: &str, symbol: &str, side: OrderSide) -> String {
        format!("{run_id}_{symbol}_{}", side.as_str())
    }

    /// Stop-limit price for the protective leg: half the entry-stop distance
    /// below the stop, floored at 92% of entry to keep the limit plausible.
    #[must_use]
    pub fn stop_limit_price(entry: f64, stop: f64) -> f64 {
        let distance = (entry - stop).abs();
        (stop - 0.5 * distance).max(entry * STOP_LIMIT_FLOOR)
    }

    /// Dispatch the batch: all sells, then all buys.
    pub async fn dispatch<B: BrokerPort + ?Sized>(
        &self,
        broker: &B,
        run_id: &str,
        decisions: &[TradingDecision],
        portfolio: &PortfolioState,
    ) -> Vec<OrderResult> {
        let (sells, buys): (Vec<_>, Vec<_>) = decisions
            .iter()
            .filter(|d| matches!(d.action, Action::Sell | Action::Buy))
            .partition(|d| d.action == Action::Sell);

        let mut results = Vec::with_capacity(sells.len() + buys.len());
        for decision in sells {
            results.push(self.dispatch_sell(broker, run_id, decision, portfolio).await);
        }
        for decision in buys {
            results.push(self.dispatch_buy(broker, run_id, decision, portfolio).await);
        }
        results
    }

    async fn dispatch_sell<B: BrokerPort + ?Sized>(
        &self,
        broker: &B,
        run_id: &str,
        decision: &TradingDecision,
        portfolio: &PortfolioState,
    ) -> OrderResult {
        let client_order_id = Self::client_order_id(run_id, &decision.symbol, OrderSide::Sell);

        // No position, no broker call.
        let Some(position) = portfolio.positions.get(&decision.symbol) else {
            tracing::warn!(symbol = %decision.symbol, "Sell rejected: no open position");
            return OrderResult::rejected(
                &decision.symbol,
                "sell",
                client_order_id,
                "no open position to sell".to_string(),
            );
        };

        let request = OrderRequest {
            symbol: decision.symbol.clone(),
            side: OrderSide::Sell,
            qty: position.qty,
            kind: OrderKind::Market,
            client_order_id,
        };
        self.submit_with_retry(broker, request).await
    }

    async fn dispatch_buy<B: BrokerPort + ?Sized>(
        &self,
        broker: &B,
        run_id: &str,
        decision: &TradingDecision,
        portfolio: &PortfolioState,
    ) -> OrderResult {
        let client_order_id = Self::client_order_id(run_id, &decision.symbol, OrderSide::Buy);

        let (Some(entry), Some(stop), Some(target)) = (
            decision.entry_price,
            decision.stop_loss,
            decision.take_profit,
        ) else {
            return OrderResult::rejected(
                &decision.symbol,
                "buy",
                client_order_id,
                "buy decision missing entry/stop/target prices".to_string(),
            );
        };

        let qty = self.sizer.size(entry, stop, portfolio.equity);
        if qty == 0 {
            tracing::warn!(symbol = %decision.symbol, entry, stop, "Buy rejected: sized to zero");
            return OrderResult::rejected(
                &decision.symbol,
                "buy",
                client_order_id,
                "position sized to zero".to_string(),
            );
        }

        let request = OrderRequest {
            symbol: decision.symbol.clone(),
            side: OrderSide::Buy,
            qty: qty as f64,
            kind: OrderKind::Bracket {
                limit_price: entry,
                stop_trigger: stop,
                stop_limit: Self::stop_limit_price(entry, stop),
                take_profit: target,
            },
            client_order_id,
        };
        self.submit_with_retry(broker, request).await
    }

    /// Submit with the literal bounded retry policy: two attempts, no
    /// backoff. The idempotency key makes a duplicate submission after a
    /// timed-out first attempt safe.
    async fn submit_with_retry<B: BrokerPort + ?Sized>(
        &self,
        broker: &B,
        request: OrderRequest,
    ) -> OrderResult {
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match broker.submit_order(&request).await {
                Ok(ack) => {
                    return OrderResult {
                        symbol: request.symbol,
                        side: request.side.as_str().to_string(),
                        success: true,
                        order_id: Some(ack.order_id),
                        client_order_id: request.client_order_id,
                        qty: request.qty,
                        filled_qty: ack.filled_qty,
                        filled_price: ack.filled_price,
                        error: None,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        symbol = %request.symbol,
                        attempt,
                        error = %e,
                        "Order submission failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        OrderResult {
            symbol: request.symbol,
            side: request.side.as_str().to_string(),
            success: false,
            order_id: None,
            client_order_id: request.client_order_id,
            qty: request.qty,
            filled_qty: None,
            filled_price: None,
            error: Some(last_error),
        }
    }
}
