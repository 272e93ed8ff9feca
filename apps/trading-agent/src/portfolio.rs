//! Portfolio state derivation.
//!
//! Combines the brokerage's authoritative account state with the last
//! persisted daily snapshot to produce the per-run [`PortfolioState`]:
//! high-water mark, drawdown, and day-over-day pnl. The state is recomputed
//! every run and never stored as the row of truth itself.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::broker::BrokerPort;
use crate::error::PipelineError;
use crate::ledger::{DailySnapshot, Ledger};
use crate::models::{PortfolioState, PositionInfo};
use crate::universe;

/// Derives portfolio state from broker truth plus ledger history.
#[derive(Debug, Clone)]
pub struct PortfolioView {
    ledger: Ledger,
}

impl PortfolioView {
    /// New view over the ledger.
    #[must_use]
    pub const fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Fetch broker state and derive the current portfolio.
    pub async fn sync<B: BrokerPort + ?Sized>(
        &self,
        broker: &B,
    ) -> Result<PortfolioState, PipelineError> {
        let account = broker.account().await?;
        let broker_positions = broker.open_positions().await?;
        let ledger_open = self.ledger.open_positions().await?;
        let snapshot = self.ledger.latest_snapshot().await?;

        let mut positions = BTreeMap::new();
        for p in broker_positions {
            let entry_date = ledger_open
                .iter()
                .find(|l| l.symbol == p.symbol)
                .map(|l| l.entry_date);
            positions.insert(
                p.symbol.clone(),
                PositionInfo {
                    sector: universe::sector_of(&p.symbol).to_string(),
                    symbol: p.symbol,
                    qty: p.qty,
                    avg_entry_price: p.avg_entry_price,
                    current_price: p.current_price,
                    unrealized_pnl: p.unrealized_pnl,
                    entry_date,
                },
            );
        }

        // The HWM only ever ratchets up: the stored mark is the floor, the
        // live equity can raise it within the day.
        let stored_hwm = snapshot.as_ref().map_or(account.equity, |s| s.high_water_mark);
        let high_water_mark = stored_hwm.max(account.equity);

        let daily_pnl_pct = snapshot
            .as_ref()
            .filter(|s| s.equity > 0.0)
            .map_or(0.0, |s| (account.equity - s.equity) / s.equity * 100.0);

        let drawdown_pct = PortfolioState::drawdown(high_water_mark, account.equity);

        tracing::info!(
            equity = account.equity,
            high_water_mark,
            drawdown_pct,
            daily_pnl_pct,
            open = positions.len(),
            "Portfolio synced"
        );

        Ok(PortfolioState {
            equity: account.equity,
            cash: account.cash,
            buying_power: account.buying_power,
            positions,
            daily_pnl_pct,
            drawdown_pct,
            high_water_mark,
        })
    }

    /// Persist the end-of-day snapshot for `date`, carrying the ratcheted
    /// high-water mark. Idempotent per date.
    pub async fn persist_snapshot(
        &self,
        state: &PortfolioState,
        date: NaiveDate,
    ) -> Result<(), PipelineError> {
        self.ledger
            .upsert_snapshot(&DailySnapshot {
                snapshot_date: date,
                equity: state.equity,
                cash: state.cash,
                high_water_mark: state.high_water_mark,
                daily_pnl_pct: state.daily_pnl_pct,
                drawdown_pct: state.drawdown_pct,
                open_positions: state.positions.len() as i64,
            })
            .await?;
        tracing::info!(date = %date, equity = state.equity, "Daily snapshot persisted");
        Ok(())
    }
}
