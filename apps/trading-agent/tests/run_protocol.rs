//! End-to-end run protocol tests against fakes: duplicate-run no-op,
//! weekend skip, and sell-before-buy ordering through the public API.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use trading_agent::broker::{
    AccountSnapshot, BrokerError, BrokerPort, BrokerPosition, OrderAck, OrderRequest,
};
use trading_agent::config::AppConfig;
use trading_agent::ledger::Ledger;
use trading_agent::models::{Action, TradingDecision};
use trading_agent::oracle::{DecisionOracle, OracleError};
use trading_agent::pipeline::{Mode, Pipeline, RunOutcome};

struct CountingBroker {
    calls: Mutex<u32>,
    submitted: Mutex<Vec<OrderRequest>>,
    positions: Vec<BrokerPosition>,
}

impl CountingBroker {
    fn new(positions: Vec<BrokerPosition>) -> Self {
        Self {
            calls: Mutex::new(0),
            submitted: Mutex::new(Vec::new()),
            positions,
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl BrokerPort for CountingBroker {
    async fn account(&self) -> Result<AccountSnapshot, BrokerError> {
        *self.calls.lock().unwrap() += 1;
        Ok(AccountSnapshot {
            equity: 100_000.0,
            cash: 50_000.0,
            buying_power: 100_000.0,
        })
    }

    async fn open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.positions.clone())
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, BrokerError> {
        *self.calls.lock().unwrap() += 1;
        self.submitted.lock().unwrap().push(request.clone());
        Ok(OrderAck {
            order_id: format!("ord-{}", request.client_order_id),
            status: "accepted".to_string(),
            filled_qty: Some(request.qty),
            filled_price: None,
        })
    }

    async fn daily_closes(&self, _symbol: &str, limit: usize) -> Result<Vec<f64>, BrokerError> {
        *self.calls.lock().unwrap() += 1;
        if limit == 1 {
            Ok(vec![15.0])
        } else {
            Ok(vec![500.0; limit])
        }
    }
}

struct ScriptedOracle {
    decisions: Vec<TradingDecision>,
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, _prompt: &str) -> Result<Vec<TradingDecision>, OracleError> {
        Ok(self.decisions.clone())
    }
}

fn decision(symbol: &str, action: Action) -> TradingDecision {
    TradingDecision {
        symbol: symbol.to_string(),
        action,
        confidence: 80.0,
        entry_price: Some(100.0),
        stop_loss: Some(95.0),
        take_profit: Some(110.0),
        holding_days: Some(5),
        rationale: String::new(),
    }
}

async fn pipeline(
    positions: Vec<BrokerPosition>,
    decisions: Vec<TradingDecision>,
) -> Pipeline<CountingBroker, ScriptedOracle> {
    let ledger = Ledger::open_in_memory().await.unwrap();
    Pipeline::new(
        AppConfig::default(),
        ledger,
        CountingBroker::new(positions),
        ScriptedOracle { decisions },
    )
}

#[tokio::test]
async fn rerunning_a_completed_run_makes_zero_broker_calls() {
    let p = pipeline(vec![], vec![decision("AAPL", Action::Buy)]).await;
    let monday = Utc.with_ymd_and_hms(2026, 8, 24, 13, 30, 0).unwrap();

    assert_eq!(p.run(Mode::Morning, monday).await.unwrap(), RunOutcome::Completed);
    let after_first = p.broker_ref().calls();
    assert!(after_first > 0);

    assert_eq!(p.run(Mode::Morning, monday).await.unwrap(), RunOutcome::Duplicate);
    assert_eq!(p.broker_ref().calls(), after_first);
}

#[tokio::test]
async fn saturday_trading_run_skips_without_broker_contact() {
    let p = pipeline(vec![], vec![decision("AAPL", Action::Buy)]).await;
    let saturday = Utc.with_ymd_and_hms(2026, 8, 22, 13, 30, 0).unwrap();

    for mode in [Mode::Morning, Mode::Midday, Mode::Eod] {
        let outcome = p
            .run(mode, saturday + chrono::Duration::seconds(outcome_offset(mode)))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Skipped);
        assert_eq!(outcome.exit_code(), 0);
    }
    assert_eq!(p.broker_ref().calls(), 0);
}

const fn outcome_offset(mode: Mode) -> i64 {
    // Distinct run ids per mode invocation.
    match mode {
        Mode::Morning => 0,
        Mode::Midday => 1,
        Mode::Eod => 2,
        Mode::HealthCheck => 3,
    }
}

#[tokio::test]
async fn sells_hit_the_broker_before_buys() {
    let held = vec![
        BrokerPosition {
            symbol: "XOM".to_string(),
            qty: 7.0,
            avg_entry_price: 100.0,
            current_price: 102.0,
            unrealized_pnl: 14.0,
        },
        BrokerPosition {
            symbol: "KO".to_string(),
            qty: 12.0,
            avg_entry_price: 60.0,
            current_price: 61.0,
            unrealized_pnl: 12.0,
        },
    ];
    // Buys listed first in the batch; the dispatcher must still sell first.
    let batch = vec![
        decision("AAPL", Action::Buy),
        decision("XOM", Action::Sell),
        decision("KO", Action::Sell),
    ];
    let p = pipeline(held, batch).await;
    let monday = Utc.with_ymd_and_hms(2026, 8, 24, 13, 30, 0).unwrap();

    p.run(Mode::Morning, monday).await.unwrap();

    let submitted = p.broker_ref().submitted.lock().unwrap();
    let sides: Vec<&str> = submitted
        .iter()
        .map(|r| r.side.as_str())
        .collect();
    assert_eq!(sides, vec!["sell", "sell", "buy"]);
}
