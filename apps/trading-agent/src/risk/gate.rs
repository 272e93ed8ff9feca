//! Position entry gate.
//!
//! Six eligibility checks in a fixed order, short-circuiting on the first
//! rejection so the surfaced reason is always the most global one: breaker
//! first, then the volatility cap, the configured concurrency cap, the
//! duplicate guard, the sector cap, and finally the daily entry cap.

use crate::models::regime::VixRegime;
use crate::models::PortfolioState;
use crate::risk::breaker::BreakerStatus;
use crate::universe;

/// Sector granted the wider concentration cap.
const WIDE_SECTOR: &str = "Technology";
const WIDE_SECTOR_CAP: usize = 3;
const DEFAULT_SECTOR_CAP: usize = 2;

/// Why an entry was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateRejection {
    /// Circuit breaker is active.
    #[error("circuit breaker active at level {level} (drawdown {drawdown_pct:.2}%)")]
    BreakerActive {
        /// Breaker level.
        level: u8,
        /// Drawdown percent.
        drawdown_pct: f64,
    },

    /// Volatility regime caps open positions below the current count.
    #[error("volatility cap reached: {open} open, max {cap} under {regime:?} volatility")]
    VolatilityCap {
        /// Current open count.
        open: usize,
        /// Regime cap.
        cap: usize,
        /// Active regime.
        regime: VixRegime,
    },

    /// Configured concurrency cap reached.
    #[error("max concurrent positions reached: {open} open, cap {cap}")]
    ConcurrencyCap {
        /// Current open count.
        open: usize,
        /// Configured cap.
        cap: usize,
    },

    /// Symbol is already held.
    #[error("{symbol} is already held")]
    AlreadyHeld {
        /// The duplicate symbol.
        symbol: String,
    },

    /// Sector concentration cap reached.
    #[error("sector cap reached for {sector}: {held} held, cap {cap}")]
    SectorCap {
        /// Sector label.
        sector: String,
        /// Positions already held in the sector.
        held: usize,
        /// Sector cap.
        cap: usize,
    },

    /// Daily entry cap reached.
    #[error("daily entry cap reached: {entered} entered today, cap {cap}")]
    DailyEntryCap {
        /// Entries (open or closed) dated today.
        entered: usize,
        /// Configured daily cap.
        cap: usize,
    },
}

/// Entry gate over configured caps.
#[derive(Debug, Clone, Copy)]
pub struct PositionGate {
    /// Hard cap on concurrent open positions.
    pub max_concurrent: usize,
    /// Cap on entries per calendar day.
    pub max_daily_entries: usize,
}

impl PositionGate {
    /// New gate from configured caps.
    #[must_use]
    pub const fn new(max_concurrent: usize, max_daily_entries: usize) -> Self {
        Self {
            max_concurrent,
            max_daily_entries,
        }
    }

    /// Sector concentration cap for `sector`.
    #[must_use]
    pub fn sector_cap(sector: &str) -> usize {
        if sector == WIDE_SECTOR {
            WIDE_SECTOR_CAP
        } else {
            DEFAULT_SECTOR_CAP
        }
    }

    /// Check whether a new entry in `symbol` is allowed.
    ///
    /// `today_entries` counts positions (open or closed) entered today.
    pub fn check(
        &self,
        symbol: &str,
        portfolio: &PortfolioState,
        breaker: &BreakerStatus,
        vix: VixRegime,
        today_entries: usize,
    ) -> Result<(), GateRejection> {
        // 1. Breaker: the most global stop.
        if breaker.active {
            return Err(GateRejection::BreakerActive {
                level: breaker.level,
                drawdown_pct: breaker.drawdown_pct,
            });
        }

        let open = portfolio.open_count();

        // 2. Volatility regime cap.
        let vix_cap = vix.max_positions();
        if open >= vix_cap {
            return Err(GateRejection::VolatilityCap {
                open,
                cap: vix_cap,
                regime: vix,
            });
        }

        // 3. Configured concurrency cap.
        if open >= self.max_concurrent {
            return Err(GateRejection::ConcurrencyCap {
                open,
                cap: self.max_concurrent,
            });
        }

        // 4. Duplicate guard.
        if portfolio.positions.contains_key(symbol) {
            return Err(GateRejection::AlreadyHeld {
                symbol: symbol.to_string(),
            });
        }

        // 5. Sector concentration.
        let sector = universe::sector_of(symbol);
        let held = portfolio.sector_count(sector);
        let cap = Self::sector_cap(sector);
        if held >= cap {
            return Err(GateRejection::SectorCap {
                sector: sector.to_string(),
                held,
                cap,
            });
        }

        // 6. Daily entry cap, counting closed same-day entries too.
        if today_entries >= self.max_daily_entries {
            return Err(GateRejection::DailyEntryCap {
                entered: today_entries,
                cap: self.max_daily_entries,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionInfo;
    use std::collections::BTreeMap;

    fn portfolio_with(symbols: &[&str]) -> PortfolioState {
        let mut positions = BTreeMap::new();
        for sym in symbols {
            positions.insert(
                (*sym).to_string(),
                PositionInfo {
                    symbol: (*sym).to_string(),
                    qty: 10.0,
                    avg_entry_price: 100.0,
                    current_price: 100.0,
                    unrealized_pnl: 0.0,
                    sector: universe::sector_of(sym).to_string(),
                    entry_date: None,
                },
            );
        }
        PortfolioState {
            equity: 100_000.0,
            cash: 50_000.0,
            buying_power: 100_000.0,
            positions,
            daily_pnl_pct: 0.0,
            drawdown_pct: 0.0,
            high_water_mark: 100_000.0,
        }
    }

    fn idle_breaker() -> BreakerStatus {
        BreakerStatus {
            active: false,
            level: 0,
            drawdown_pct: 0.0,
            cooldown_until: None,
        }
    }

    fn gate() -> PositionGate {
        PositionGate::new(10, 2)
    }

    #[test]
    fn clean_entry_passes() {
        let verdict = gate().check(
            "AAPL",
            &portfolio_with(&[]),
            &idle_breaker(),
            VixRegime::Low,
            0,
        );
        assert!(verdict.is_ok());
    }

    #[test]
    fn active_breaker_rejects_before_anything_else() {
        let breaker = BreakerStatus {
            active: true,
            level: 2,
            drawdown_pct: 8.1,
            cooldown_until: None,
        };
        // Even a symbol already held reports the breaker, not the duplicate.
        let verdict = gate().check(
            "AAPL",
            &portfolio_with(&["AAPL"]),
            &breaker,
            VixRegime::Low,
            0,
        );
        assert_eq!(
            verdict,
            Err(GateRejection::BreakerActive {
                level: 2,
                drawdown_pct: 8.1
            })
        );
    }

    #[test]
    fn extreme_volatility_blocks_any_entry() {
        let verdict = gate().check(
            "AAPL",
            &portfolio_with(&[]),
            &idle_breaker(),
            VixRegime::Extreme,
            0,
        );
        assert!(matches!(
            verdict,
            Err(GateRejection::VolatilityCap { cap: 0, .. })
        ));
    }

    #[test]
    fn sixth_position_blocked_by_low_vol_cap_even_with_higher_config() {
        // Config allows 10 but the low-volatility cap is 5.
        let held = portfolio_with(&["AAPL", "JPM", "XOM", "PG", "CAT"]);
        let verdict = gate().check("KO", &held, &idle_breaker(), VixRegime::Low, 0);
        assert!(matches!(
            verdict,
            Err(GateRejection::VolatilityCap { open: 5, cap: 5, .. })
        ));
    }

    #[test]
    fn configured_cap_binds_when_below_vix_cap() {
        let tight = PositionGate::new(1, 2);
        let held = portfolio_with(&["JPM"]);
        let verdict = tight.check("XOM", &held, &idle_breaker(), VixRegime::Low, 0);
        assert_eq!(
            verdict,
            Err(GateRejection::ConcurrencyCap { open: 1, cap: 1 })
        );
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let held = portfolio_with(&["NVDA"]);
        let verdict = gate().check("NVDA", &held, &idle_breaker(), VixRegime::Low, 0);
        assert_eq!(
            verdict,
            Err(GateRejection::AlreadyHeld {
                symbol: "NVDA".to_string()
            })
        );
    }

    #[test]
    fn technology_sector_allows_three_then_caps() {
        let two_tech = portfolio_with(&["AAPL", "MSFT"]);
        assert!(
            gate()
                .check("NVDA", &two_tech, &idle_breaker(), VixRegime::Low, 0)
                .is_ok()
        );

        let three_tech = portfolio_with(&["AAPL", "MSFT", "GOOGL"]);
        let verdict = gate().check("NVDA", &three_tech, &idle_breaker(), VixRegime::Low, 0);
        assert!(matches!(
            verdict,
            Err(GateRejection::SectorCap { held: 3, cap: 3, .. })
        ));
    }

    #[test]
    fn other_sectors_cap_at_two() {
        let two_health = portfolio_with(&["UNH", "JNJ"]);
        let verdict = gate().check("LLY", &two_health, &idle_breaker(), VixRegime::Low, 0);
        assert!(matches!(
            verdict,
            Err(GateRejection::SectorCap { held: 2, cap: 2, .. })
        ));

        // A different sector is unaffected by the healthcare count.
        let verdict = gate().check("XOM", &two_health, &idle_breaker(), VixRegime::Low, 0);
        assert!(verdict.is_ok());
    }

    #[test]
    fn daily_entry_cap_counts_closed_entries() {
        let verdict = gate().check(
            "AAPL",
            &portfolio_with(&[]),
            &idle_breaker(),
            VixRegime::Low,
            2,
        );
        assert_eq!(
            verdict,
            Err(GateRejection::DailyEntryCap { entered: 2, cap: 2 })
        );
    }

    #[test]
    fn check_order_surfaces_most_global_reason() {
        // Portfolio at the low-vol cap AND holding the symbol: the
        // volatility cap is reported because it is evaluated first.
        let held = portfolio_with(&["AAPL", "JPM", "XOM", "PG", "CAT"]);
        let verdict = gate().check("AAPL", &held, &idle_breaker(), VixRegime::Low, 5);
        assert!(matches!(verdict, Err(GateRejection::VolatilityCap { .. })));
    }
}
