//! Portfolio snapshot derived from brokerage account state.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One open position as the pipeline sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Ticker symbol.
    pub symbol: String,
    /// Share quantity, positive while open.
    pub qty: f64,
    /// Average entry price.
    pub avg_entry_price: f64,
    /// Latest known market price.
    pub current_price: f64,
    /// Unrealized profit and loss in dollars.
    pub unrealized_pnl: f64,
    /// GICS-style sector label, "Unknown" if unmapped.
    pub sector: String,
    /// Date the position was entered.
    pub entry_date: Option<NaiveDate>,
}

/// Point-in-time portfolio state.
///
/// Recomputed at the start of every run from brokerage truth plus the last
/// persisted daily snapshot. Never itself the row of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Total account equity.
    pub equity: f64,
    /// Settled cash.
    pub cash: f64,
    /// Buying power reported by the brokerage.
    pub buying_power: f64,
    /// Open positions keyed by symbol.
    pub positions: BTreeMap<String, PositionInfo>,
    /// Percent change of equity vs the latest daily snapshot.
    pub daily_pnl_pct: f64,
    /// Percent decline from the high-water mark, floored at zero.
    pub drawdown_pct: f64,
    /// Running maximum equity, monotone across days.
    pub high_water_mark: f64,
}

impl PortfolioState {
    /// Drawdown from `hwm` to `equity` as a non-negative percentage.
    #[must_use]
    pub fn drawdown(hwm: f64, equity: f64) -> f64 {
        if hwm <= 0.0 {
            return 0.0;
        }
        ((hwm - equity) / hwm * 100.0).max(0.0)
    }

    /// Number of open positions.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Open positions in the given sector.
    #[must_use]
    pub fn sector_count(&self, sector: &str) -> usize {
        self.positions
            .values()
            .filter(|p| p.sector == sector)
            .count()
    }
}
