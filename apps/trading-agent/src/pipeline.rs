//! Run orchestration.
//!
//! One invocation is one run: derive the run id, check the ledger for a
//! duplicate, then execute the mode body and finalize the run record in
//! place. The process lock is taken by the caller before this module runs;
//! everything here assumes single-flight execution.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};

use crate::broker::BrokerPort;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::health;
use crate::ledger::{Ledger, NewPosition, NewTrade};
use crate::models::regime::{MacroRegime, VixRegime};
use crate::models::{Action, OrderResult, PortfolioState, TradingDecision};
use crate::oracle::DecisionOracle;
use crate::orders::OrderSequencer;
use crate::portfolio::PortfolioView;
use crate::reconcile::{ReconcileError, Reconciler};
use crate::risk::{CircuitBreaker, PositionGate, PositionSizer};
use crate::universe;

/// Pipeline mode selecting which sub-protocol executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Full cycle: reconcile, gate, dispatch.
    Morning,
    /// Reconcile and monitor.
    Midday,
    /// Reconcile and persist the daily snapshot.
    Eod,
    /// Subsystem validation.
    HealthCheck,
}

impl Mode {
    /// Run-id and ledger representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Midday => "midday",
            Self::Eod => "eod",
            Self::HealthCheck => "health_check",
        }
    }
}

/// Terminal outcome of a run. Everything except `Unhealthy` exits 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The mode body ran to completion.
    Completed,
    /// A run with this id already exists; nothing was done.
    Duplicate,
    /// Market closed (weekend); recorded and skipped.
    Skipped,
    /// Health check mode found failing subsystems.
    Unhealthy,
}

impl RunOutcome {
    /// Process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Completed | Self::Duplicate | Self::Skipped => 0,
            Self::Unhealthy => 1,
        }
    }
}

/// The assembled trading pipeline.
pub struct Pipeline<B, O> {
    config: AppConfig,
    ledger: Ledger,
    broker: B,
    oracle: O,
    view: PortfolioView,
    breaker: CircuitBreaker,
    gate: PositionGate,
    sequencer: OrderSequencer,
    reconciler: Reconciler,
}

impl<B: BrokerPort, O: DecisionOracle> Pipeline<B, O> {
    /// Wire the pipeline from config and collaborators.
    #[must_use]
    pub fn new(config: AppConfig, ledger: Ledger, broker: B, oracle: O) -> Self {
        let view = PortfolioView::new(ledger.clone());
        let breaker = CircuitBreaker::new(ledger.clone(), config.risk.breaker_thresholds);
        let gate = PositionGate::new(
            config.risk.max_concurrent_positions,
            config.risk.max_daily_entries,
        );
        let sequencer = OrderSequencer::new(PositionSizer::new(
            config.risk.max_risk_per_trade_pct,
            config.risk.max_position_pct,
            config.risk.slippage_factor,
        ));
        let reconciler = Reconciler::new(ledger.clone());
        Self {
            config,
            ledger,
            broker,
            oracle,
            view,
            breaker,
            gate,
            sequencer,
            reconciler,
        }
    }

    /// The wired broker.
    #[must_use]
    pub const fn broker_ref(&self) -> &B {
        &self.broker
    }

    /// The wired ledger.
    #[must_use]
    pub const fn ledger_ref(&self) -> &Ledger {
        &self.ledger
    }

    /// Deterministic run id: `{YYYYMMDD}_{mode}_{HHMMSS}`.
    #[must_use]
    pub fn run_id(mode: Mode, now: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}",
            now.format("%Y%m%d"),
            mode.as_str(),
            now.format("%H%M%S")
        )
    }

    /// Execute one run at `now`.
    pub async fn run(&self, mode: Mode, now: DateTime<Utc>) -> Result<RunOutcome, PipelineError> {
        let run_id = Self::run_id(mode, now);

        // Second idempotency layer: a known run id is a successful no-op
        // before any side-effecting work.
        if let Some(existing) = self.ledger.find_run(&run_id).await? {
            tracing::info!(
                run_id,
                status = %existing.status,
                "Run id already recorded, nothing to do"
            );
            return Ok(RunOutcome::Duplicate);
        }

        // Weekend guard for trading modes; health checks always run.
        if mode != Mode::HealthCheck && is_weekend(now) {
            self.ledger.start_run(&run_id, mode.as_str(), now).await?;
            self.ledger
                .finalize_run(&run_id, "skipped", None, Utc::now(), 0, None)
                .await?;
            tracing::info!(run_id, "Market closed, run skipped");
            return Ok(RunOutcome::Skipped);
        }

        self.ledger.start_run(&run_id, mode.as_str(), now).await?;
        tracing::info!(run_id, mode = mode.as_str(), "Run started");

        let started = std::time::Instant::now();
        let body = match mode {
            Mode::Morning => self.run_morning(&run_id, now).await,
            Mode::Midday => self
                .run_midday(&run_id, now)
                .await
                .map(|()| (RunOutcome::Completed, None)),
            Mode::Eod => self
                .run_eod(&run_id, now)
                .await
                .map(|()| (RunOutcome::Completed, None)),
            Mode::HealthCheck => self.run_health(now).await.map(|outcome| (outcome, None)),
        };
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match body {
            Ok((outcome, decisions_json)) => {
                // A failing health check is a recorded error, not a success.
                let (status, message) = if outcome == RunOutcome::Unhealthy {
                    ("error", Some("health checks failed"))
                } else {
                    ("success", None)
                };
                self.ledger
                    .finalize_run(
                        &run_id,
                        status,
                        message,
                        Utc::now(),
                        duration_ms,
                        decisions_json.as_deref(),
                    )
                    .await?;
                tracing::info!(run_id, duration_ms, "Run completed");
                Ok(outcome)
            }
            Err(e) => {
                // Best effort: the original error wins even if finalization
                // fails too.
                let message = e.to_string();
                if let Err(final_err) = self
                    .ledger
                    .finalize_run(
                        &run_id,
                        "error",
                        Some(&message),
                        Utc::now(),
                        duration_ms,
                        None,
                    )
                    .await
                {
                    tracing::error!(run_id, error = %final_err, "Failed to finalize errored run");
                }
                tracing::error!(run_id, error = %message, "Run failed");
                Err(e)
            }
        }
    }

    // =========================================================================
    // Mode bodies
    // =========================================================================

    async fn run_morning(
        &self,
        run_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(RunOutcome, Option<String>), PipelineError> {
        let today = now.date_naive();
        self.reconcile_ledger(run_id, today).await?;

        let portfolio = self.view.sync(&self.broker).await?;
        let breaker = self.breaker.evaluate(portfolio.drawdown_pct, now).await?;
        let (vix, macro_regime) = self.market_context().await;

        let prompt = build_prompt(&portfolio, vix, macro_regime);
        let decisions = self.oracle.decide(&prompt).await?;
        let decisions_json = serde_json::to_string(&decisions).ok();

        // Gate buys; sells for held symbols pass straight through. Accepted
        // buys within this batch consume the daily entry budget too.
        let today_entries = usize::try_from(self.ledger.entries_on(today).await?).unwrap_or(0);
        let mut accepted = Vec::new();
        let mut accepted_buys = 0usize;
        for decision in &decisions {
            match decision.action {
                Action::Sell => accepted.push(decision.clone()),
                Action::Buy => {
                    let verdict = self.gate.check(
                        &decision.symbol,
                        &portfolio,
                        &breaker,
                        vix,
                        today_entries + accepted_buys,
                    );
                    match verdict {
                        Ok(()) => {
                            accepted_buys += 1;
                            accepted.push(decision.clone());
                        }
                        Err(reason) => {
                            tracing::info!(symbol = %decision.symbol, %reason, "Entry rejected");
                        }
                    }
                }
                Action::Hold | Action::NoAction => {}
            }
        }

        let results = self
            .sequencer
            .dispatch(&self.broker, run_id, &accepted, &portfolio)
            .await;
        self.record_results(run_id, &accepted, &results, &portfolio, now)
            .await?;

        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(
            dispatched = results.len(),
            succeeded,
            "Morning cycle complete"
        );
        Ok((RunOutcome::Completed, decisions_json))
    }

    async fn run_midday(&self, run_id: &str, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.reconcile_ledger(run_id, now.date_naive()).await?;
        let portfolio = self.view.sync(&self.broker).await?;
        let breaker = self.breaker.evaluate(portfolio.drawdown_pct, now).await?;
        for position in portfolio.positions.values() {
            tracing::info!(
                symbol = %position.symbol,
                qty = position.qty,
                unrealized_pnl = position.unrealized_pnl,
                "Open position"
            );
        }
        tracing::info!(
            equity = portfolio.equity,
            drawdown_pct = portfolio.drawdown_pct,
            breaker_level = breaker.level,
            "Midday monitor complete"
        );
        Ok(())
    }

    async fn run_eod(&self, run_id: &str, now: DateTime<Utc>) -> Result<(), PipelineError> {
        self.reconcile_ledger(run_id, now.date_naive()).await?;
        let portfolio = self.view.sync(&self.broker).await?;
        self.breaker.evaluate(portfolio.drawdown_pct, now).await?;
        self.view.persist_snapshot(&portfolio, now.date_naive()).await?;
        Ok(())
    }

    async fn run_health(&self, now: DateTime<Utc>) -> Result<RunOutcome, PipelineError> {
        let report =
            health::run_health_checks(&self.config, &self.ledger, &self.broker, now).await;
        if report.ok() {
            Ok(RunOutcome::Completed)
        } else {
            Ok(RunOutcome::Unhealthy)
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Align the ledger with brokerage truth at the start of a trading run.
    /// An unreliable broker read skips reconciliation for this cycle only; a
    /// ledger failure is fatal.
    async fn reconcile_ledger(&self, run_id: &str, today: NaiveDate) -> Result<(), PipelineError> {
        match self.reconciler.reconcile(&self.broker, run_id, today).await {
            Ok(issues) if issues.is_empty() => Ok(()),
            Ok(issues) => {
                tracing::warn!(count = issues.len(), "Reconciliation issues recorded");
                Ok(())
            }
            Err(ReconcileError::Broker(e)) => {
                tracing::warn!(error = %e, "Broker unreadable, reconciliation skipped this cycle");
                Ok(())
            }
            Err(ReconcileError::Ledger(e)) => Err(e.into()),
        }
    }

    /// VIX and trend regimes from market data, degrading to the conservative
    /// defaults (elevated volatility, range-bound trend) when unreadable.
    async fn market_context(&self) -> (VixRegime, MacroRegime) {
        let vix_level = match self
            .broker
            .daily_closes(&self.config.market.vix_symbol, 1)
            .await
        {
            Ok(closes) if !closes.is_empty() => closes[closes.len() - 1],
            Ok(_) | Err(_) => {
                tracing::warn!("VIX unreadable, assuming elevated volatility");
                20.0
            }
        };
        let vix = VixRegime::classify(vix_level);

        let macro_regime = match self
            .broker
            .daily_closes(&self.config.market.trend_symbol, 200)
            .await
        {
            Ok(closes) if !closes.is_empty() => {
                let last = closes[closes.len() - 1];
                let ma = closes.iter().sum::<f64>() / closes.len() as f64;
                MacroRegime::classify(last, ma, vix)
            }
            Ok(_) | Err(_) => {
                tracing::warn!("Trend data unreadable, assuming range-bound market");
                MacroRegime::Range
            }
        };

        tracing::info!(vix_level, vix = ?vix, regime = ?macro_regime, "Market context");
        (vix, macro_regime)
    }

    /// Mutate ledger rows from successful order results.
    async fn record_results(
        &self,
        run_id: &str,
        decisions: &[TradingDecision],
        results: &[OrderResult],
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let today = now.date_naive();
        for result in results {
            if !result.success {
                continue;
            }
            self.ledger
                .insert_trade(&NewTrade {
                    symbol: &result.symbol,
                    side: &result.side,
                    qty: result.qty,
                    price: result.filled_price,
                    order_id: result.order_id.as_deref(),
                    client_order_id: &result.client_order_id,
                    run_id,
                })
                .await?;

            if result.side == "sell" {
                let close_price = result.filled_price.or_else(|| {
                    portfolio
                        .positions
                        .get(&result.symbol)
                        .map(|p| p.current_price)
                });
                self.ledger
                    .close_position(&result.symbol, close_price, today, "signal")
                    .await?;
            } else {
                let decision = decisions
                    .iter()
                    .find(|d| d.symbol == result.symbol && d.action == Action::Buy);
                let entry_price = result
                    .filled_price
                    .or_else(|| decision.and_then(|d| d.entry_price))
                    .unwrap_or(0.0);
                self.ledger
                    .insert_position(&NewPosition {
                        symbol: &result.symbol,
                        qty: result.qty,
                        entry_price,
                        entry_date: today,
                        stop_loss: decision.and_then(|d| d.stop_loss),
                        take_profit: decision.and_then(|d| d.take_profit),
                        sector: universe::sector_of(&result.symbol),
                        source: "signal",
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

/// Saturday or Sunday.
fn is_weekend(now: DateTime<Utc>) -> bool {
    matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Compact prompt for the decision oracle.
fn build_prompt(portfolio: &PortfolioState, vix: VixRegime, regime: MacroRegime) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Equity ${:.2}, cash ${:.2}, drawdown {:.2}%. Volatility {vix:?}, market {regime:?}.\n",
        portfolio.equity, portfolio.cash, portfolio.drawdown_pct
    ));
    if portfolio.positions.is_empty() {
        prompt.push_str("No open positions.\n");
    } else {
        prompt.push_str("Open positions:\n");
        for position in portfolio.positions.values() {
            prompt.push_str(&format!(
                "- {} x{} @ {:.2} (pnl {:.2})\n",
                position.symbol, position.qty, position.avg_entry_price, position.unrealized_pnl
            ));
        }
    }
    prompt.push_str(&format!(
        "Universe: {}.\n",
        universe::symbols().join(", ")
    ));
    prompt.push_str(
        "Respond with JSON {\"decisions\":[{\"symbol\",\"action\":buy|sell|hold|no_action,\
         \"confidence\":0-100,\"entry_price\",\"stop_loss\",\"take_profit\",\"rationale\"}]}",
    );
    prompt
}
