//! Broker/ledger reconciliation.
//!
//! The brokerage is the source of truth for position existence; the ledger is
//! a local cache. At the start of each trading run the two are diffed and
//! small divergences are repaired automatically. An unreliable broker read
//! (two back-to-back reads disagreeing) is treated as "currently unreadable",
//! not actionable: one audit row, zero mutations.

use chrono::NaiveDate;

use crate::broker::{BrokerError, BrokerPort, BrokerPosition};
use crate::ledger::{Ledger, LedgerError, NewPosition};
use crate::universe;

/// Quantity tolerance for both the double-read check and the diff.
const QTY_EPSILON: f64 = 0.001;

/// Maximum discrepancy count that still auto-repairs. At or above this the
/// divergence is treated as systemic and left for manual review.
const AUTO_FIX_LIMIT: usize = 3;

/// Cost basis recorded for broker-only positions. The true entry price is
/// unrecoverable from a bare quantity read, so PnL for these rows is
/// knowingly unreliable.
const PLACEHOLDER_ENTRY_PRICE: f64 = 0.01;

/// Reconciliation failure.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A broker read failed outright. The cycle is skippable.
    #[error("broker read failed: {0}")]
    Broker(#[from] BrokerError),

    /// The ledger failed. Fatal.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Category of one discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// Broker holds a position the ledger does not know.
    AddedMissing,
    /// Ledger holds a position the broker no longer has.
    ClosedMissing,
    /// Both hold it but quantities differ beyond tolerance.
    QtyMismatch,
    /// The two broker reads disagreed; nothing is actionable.
    ApiInconsistent,
}

impl IssueKind {
    /// Audit log representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AddedMissing => "ADDED_MISSING",
            Self::ClosedMissing => "CLOSED_MISSING",
            Self::QtyMismatch => "QTY_MISMATCH",
            Self::ApiInconsistent => "API_INCONSISTENT",
        }
    }
}

/// One reconciliation finding, immutable once appended to the audit log.
#[derive(Debug, Clone)]
pub struct ReconciliationIssue {
    /// Discrepancy category.
    pub kind: IssueKind,
    /// Affected symbol, `None` for the inconsistency marker.
    pub symbol: Option<String>,
    /// Human-readable detail.
    pub details: String,
    /// Whether the ledger was mutated to resolve it.
    pub auto_fixed: bool,
}

/// Reconciliation engine over the ledger.
#[derive(Debug, Clone)]
pub struct Reconciler {
    ledger: Ledger,
}

impl Reconciler {
    /// New engine.
    #[must_use]
    pub const fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Reconcile the ledger against brokerage truth.
    ///
    /// Returns the issue list (possibly empty). Every issue is appended to
    /// the run-id-keyed audit log whether or not it was fixed.
    pub async fn reconcile<B: BrokerPort + ?Sized>(
        &self,
        broker: &B,
        run_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<ReconciliationIssue>, ReconcileError> {
        let first = broker.open_positions().await?;
        let second = broker.open_positions().await?;

        if !reads_agree(&first, &second) {
            let issue = ReconciliationIssue {
                kind: IssueKind::ApiInconsistent,
                symbol: None,
                details: format!(
                    "two broker reads disagreed ({} vs {} positions); skipping this cycle",
                    first.len(),
                    second.len()
                ),
                auto_fixed: false,
            };
            tracing::warn!(run_id, "Broker reads inconsistent, reconciliation skipped");
            self.append(run_id, &issue).await?;
            return Ok(vec![issue]);
        }

        let ledger_open = self.ledger.open_positions().await?;
        let mut issues = Vec::new();

        for broker_pos in &first {
            match ledger_open.iter().find(|p| p.symbol == broker_pos.symbol) {
                None => issues.push(ReconciliationIssue {
                    kind: IssueKind::AddedMissing,
                    symbol: Some(broker_pos.symbol.clone()),
                    details: format!(
                        "broker holds {} x{} unknown to ledger",
                        broker_pos.symbol, broker_pos.qty
                    ),
                    auto_fixed: false,
                }),
                Some(ledger_pos) if (ledger_pos.qty - broker_pos.qty).abs() > QTY_EPSILON => {
                    issues.push(ReconciliationIssue {
                        kind: IssueKind::QtyMismatch,
                        symbol: Some(broker_pos.symbol.clone()),
                        details: format!(
                            "ledger qty {} vs broker qty {}",
                            ledger_pos.qty, broker_pos.qty
                        ),
                        auto_fixed: false,
                    });
                }
                Some(_) => {}
            }
        }

        for ledger_pos in &ledger_open {
            if !first.iter().any(|p| p.symbol == ledger_pos.symbol) {
                issues.push(ReconciliationIssue {
                    kind: IssueKind::ClosedMissing,
                    symbol: Some(ledger_pos.symbol.clone()),
                    details: format!(
                        "ledger holds {} x{} absent at broker",
                        ledger_pos.symbol, ledger_pos.qty
                    ),
                    auto_fixed: false,
                });
            }
        }

        let fixable = issues.len() < AUTO_FIX_LIMIT;
        if !issues.is_empty() {
            tracing::warn!(
                run_id,
                count = issues.len(),
                auto_fix = fixable,
                "Reconciliation discrepancies found"
            );
        }

        if fixable {
            for issue in &mut issues {
                self.apply_fix(issue, &first, today).await?;
                issue.auto_fixed = true;
            }
        }

        for issue in &issues {
            self.append(run_id, issue).await?;
        }
        Ok(issues)
    }

    async fn apply_fix(
        &self,
        issue: &ReconciliationIssue,
        broker_positions: &[BrokerPosition],
        today: NaiveDate,
    ) -> Result<(), LedgerError> {
        let Some(symbol) = issue.symbol.as_deref() else {
            return Ok(());
        };
        match issue.kind {
            IssueKind::AddedMissing => {
                let qty = broker_positions
                    .iter()
                    .find(|p| p.symbol == symbol)
                    .map_or(0.0, |p| p.qty);
                self.ledger
                    .insert_position(&NewPosition {
                        symbol,
                        qty,
                        entry_price: PLACEHOLDER_ENTRY_PRICE,
                        entry_date: today,
                        stop_loss: None,
                        take_profit: None,
                        sector: universe::sector_of(symbol),
                        source: "reconciliation",
                    })
                    .await?;
            }
            IssueKind::ClosedMissing => {
                self.ledger
                    .close_position(symbol, None, today, "reconciliation")
                    .await?;
            }
            IssueKind::QtyMismatch => {
                let qty = broker_positions
                    .iter()
                    .find(|p| p.symbol == symbol)
                    .map_or(0.0, |p| p.qty);
                self.ledger.update_position_qty(symbol, qty).await?;
            }
            IssueKind::ApiInconsistent => {}
        }
        Ok(())
    }

    async fn append(&self, run_id: &str, issue: &ReconciliationIssue) -> Result<(), LedgerError> {
        self.ledger
            .append_reconciliation(
                run_id,
                issue.kind.as_str(),
                issue.symbol.as_deref(),
                &issue.details,
                issue.auto_fixed,
            )
            .await
    }
}

/// Two broker reads agree when they cover the same symbols with the same
/// quantities (within tolerance).
fn reads_agree(first: &[BrokerPosition], second: &[BrokerPosition]) -> bool {
    if first.len() != second.len() {
        return false;
    }
    first.iter().all(|a| {
        second
            .iter()
            .any(|b| b.symbol == a.symbol && (b.qty - a.qty).abs() <= QTY_EPSILON)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::broker::{AccountSnapshot, OrderAck, OrderRequest};

    struct StubBroker {
        reads: std::sync::Mutex<Vec<Vec<BrokerPosition>>>,
    }

    impl StubBroker {
        fn with_reads(reads: Vec<Vec<BrokerPosition>>) -> Self {
            Self {
                reads: std::sync::Mutex::new(reads),
            }
        }

        fn consistent(positions: Vec<BrokerPosition>) -> Self {
            Self::with_reads(vec![positions.clone(), positions])
        }
    }

    #[async_trait]
    impl BrokerPort for StubBroker {
        async fn account(&self) -> Result<AccountSnapshot, BrokerError> {
            unimplemented!("not used by reconciliation")
        }

        async fn open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
            Ok(self.reads.lock().unwrap().remove(0))
        }

        async fn submit_order(&self, _request: &OrderRequest) -> Result<OrderAck, BrokerError> {
            unimplemented!("not used by reconciliation")
        }

        async fn daily_closes(&self, _symbol: &str, _limit: usize) -> Result<Vec<f64>, BrokerError> {
            unimplemented!("not used by reconciliation")
        }
    }

    fn broker_pos(symbol: &str, qty: f64) -> BrokerPosition {
        BrokerPosition {
            symbol: symbol.to_string(),
            qty,
            avg_entry_price: 100.0,
            current_price: 101.0,
            unrealized_pnl: qty,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
    }

    async fn ledger_with_open(symbols: &[(&str, f64)]) -> Ledger {
        let ledger = Ledger::open_in_memory().await.unwrap();
        for (symbol, qty) in symbols {
            ledger
                .insert_position(&NewPosition {
                    symbol,
                    qty: *qty,
                    entry_price: 100.0,
                    entry_date: today(),
                    stop_loss: None,
                    take_profit: None,
                    sector: universe::sector_of(symbol),
                    source: "signal",
                })
                .await
                .unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn aligned_state_yields_no_issues() {
        let ledger = ledger_with_open(&[("AAPL", 10.0)]).await;
        let broker = StubBroker::consistent(vec![broker_pos("AAPL", 10.0)]);
        let issues = Reconciler::new(ledger)
            .reconcile(&broker, "r1", today())
            .await
            .unwrap();
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn two_discrepancies_all_auto_fixed() {
        // Broker has MSFT the ledger lacks; ledger has XOM the broker lacks.
        let ledger = ledger_with_open(&[("AAPL", 10.0), ("XOM", 5.0)]).await;
        let broker = StubBroker::consistent(vec![
            broker_pos("AAPL", 10.0),
            broker_pos("MSFT", 4.0),
        ]);
        let reconciler = Reconciler::new(ledger.clone());
        let issues = reconciler.reconcile(&broker, "r1", today()).await.unwrap();

        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.auto_fixed));

        let open = ledger.open_positions().await.unwrap();
        let symbols: Vec<&str> = open.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        let msft = open.iter().find(|p| p.symbol == "MSFT").unwrap();
        assert_eq!(msft.entry_price, PLACEHOLDER_ENTRY_PRICE);
        assert_eq!(msft.source, "reconciliation");
    }

    #[tokio::test]
    async fn three_discrepancies_leave_ledger_unchanged() {
        let ledger = ledger_with_open(&[("AAPL", 10.0), ("XOM", 5.0), ("KO", 8.0)]).await;
        // AAPL qty mismatch + XOM and KO both gone at the broker = 3 issues.
        let broker = StubBroker::consistent(vec![broker_pos("AAPL", 12.0)]);
        let reconciler = Reconciler::new(ledger.clone());
        let issues = reconciler.reconcile(&broker, "r1", today()).await.unwrap();

        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(|i| !i.auto_fixed));

        let open = ledger.open_positions().await.unwrap();
        assert_eq!(open.len(), 3);
        let aapl = open.iter().find(|p| p.symbol == "AAPL").unwrap();
        assert_eq!(aapl.qty, 10.0);
    }

    #[tokio::test]
    async fn disagreeing_reads_abort_with_single_issue() {
        let ledger = ledger_with_open(&[("AAPL", 10.0)]).await;
        let broker = StubBroker::with_reads(vec![
            vec![broker_pos("AAPL", 10.0)],
            vec![broker_pos("AAPL", 11.0)],
        ]);
        let reconciler = Reconciler::new(ledger.clone());
        let issues = reconciler.reconcile(&broker, "r1", today()).await.unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::ApiInconsistent);
        assert!(!issues[0].auto_fixed);
        // Zero mutations.
        let open = ledger.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].qty, 10.0);
    }

    #[tokio::test]
    async fn qty_mismatch_overwrites_to_broker_truth() {
        let ledger = ledger_with_open(&[("AAPL", 10.0)]).await;
        let broker = StubBroker::consistent(vec![broker_pos("AAPL", 7.0)]);
        let reconciler = Reconciler::new(ledger.clone());
        let issues = reconciler.reconcile(&broker, "r1", today()).await.unwrap();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::QtyMismatch);
        assert!(issues[0].auto_fixed);
        assert_eq!(ledger.open_positions().await.unwrap()[0].qty, 7.0);
    }

    #[tokio::test]
    async fn sub_epsilon_qty_difference_is_not_a_mismatch() {
        let ledger = ledger_with_open(&[("AAPL", 10.0)]).await;
        let broker = StubBroker::consistent(vec![broker_pos("AAPL", 10.0005)]);
        let issues = Reconciler::new(ledger)
            .reconcile(&broker, "r1", today())
            .await
            .unwrap();
        assert!(issues.is_empty());
    }
}
