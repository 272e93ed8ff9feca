//! Position sizing.
//!
//! Two independent caps, risk-based and notional-based, with the smaller one
//! binding:
//!
//! ```text
//! risk_qty     = capital * max_risk_pct/100 / (|entry - stop| * slippage)
//! notional_qty = capital * max_position_pct/100 / entry
//! size         = floor(min(risk_qty, notional_qty))
//! ```

/// Whole-share position sizer.
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    /// Percent of capital risked per trade.
    pub max_risk_per_trade_pct: f64,
    /// Percent of capital allowed in one position.
    pub max_position_pct: f64,
    /// Slippage multiplier on per-share risk.
    pub slippage_factor: f64,
}

impl PositionSizer {
    /// New sizer from risk configuration.
    #[must_use]
    pub const fn new(
        max_risk_per_trade_pct: f64,
        max_position_pct: f64,
        slippage_factor: f64,
    ) -> Self {
        Self {
            max_risk_per_trade_pct,
            max_position_pct,
            slippage_factor,
        }
    }

    /// Whole-share quantity for the proposed entry/stop pair against
    /// `capital`. Returns 0 when the stop equals the entry or either cap
    /// produces a non-positive size.
    #[must_use]
    pub fn size(&self, entry_price: f64, stop_loss: f64, capital: f64) -> u64 {
        let per_share_risk = (entry_price - stop_loss).abs();
        if per_share_risk == 0.0 || entry_price <= 0.0 || capital <= 0.0 {
            return 0;
        }

        let risk_capital = capital * self.max_risk_per_trade_pct / 100.0;
        let risk_qty = risk_capital / (per_share_risk * self.slippage_factor);
        let notional_qty = capital * self.max_position_pct / 100.0 / entry_price;

        let qty = risk_qty.min(notional_qty).floor();
        if qty <= 0.0 { 0 } else { qty as u64 }
    }
}
