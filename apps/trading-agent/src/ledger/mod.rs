//! Execution ledger over local SQLite.
//!
//! The ledger is the pipeline's local cache and audit trail: run records
//! (the idempotency boundary), positions, trades, daily snapshots, circuit
//! breaker triggers, and reconciliation audit rows. The brokerage remains
//! the source of truth for position existence; the ledger is reconciled
//! against it at the start of each run.

pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

/// Ledger failure. Fatal for the run wherever it surfaces.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded.
    #[error("corrupt ledger value: {0}")]
    Corrupt(String),
}

/// One run record, the second idempotency layer.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Unique run id, `{date}_{mode}_{time}`.
    pub run_id: String,
    /// Pipeline mode.
    pub mode: String,
    /// running | success | error | skipped.
    pub status: String,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Terminal timestamp, if finalized.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error text for failed runs.
    pub error_message: Option<String>,
}

/// One ledger position row.
#[derive(Debug, Clone)]
pub struct LedgerPosition {
    /// Row id.
    pub id: i64,
    /// Ticker symbol.
    pub symbol: String,
    /// Share quantity.
    pub qty: f64,
    /// Entry price (0.01 placeholder for reconciliation inserts).
    pub entry_price: f64,
    /// Entry date.
    pub entry_date: NaiveDate,
    /// Stop loss price.
    pub stop_loss: Option<f64>,
    /// Take profit price.
    pub take_profit: Option<f64>,
    /// Sector label.
    pub sector: String,
    /// Row origin: "signal" or "reconciliation".
    pub source: String,
}

/// A new position to record after a filled entry.
#[derive(Debug, Clone)]
pub struct NewPosition<'a> {
    /// Ticker symbol.
    pub symbol: &'a str,
    /// Share quantity.
    pub qty: f64,
    /// Entry price.
    pub entry_price: f64,
    /// Entry date.
    pub entry_date: NaiveDate,
    /// Stop loss price.
    pub stop_loss: Option<f64>,
    /// Take profit price.
    pub take_profit: Option<f64>,
    /// Sector label.
    pub sector: &'a str,
    /// Row origin.
    pub source: &'a str,
}

/// A trade row to append.
#[derive(Debug, Clone)]
pub struct NewTrade<'a> {
    /// Ticker symbol.
    pub symbol: &'a str,
    /// buy | sell.
    pub side: &'a str,
    /// Share quantity.
    pub qty: f64,
    /// Fill or submission price, when known.
    pub price: Option<f64>,
    /// Broker order id.
    pub order_id: Option<&'a str>,
    /// Idempotency key.
    pub client_order_id: &'a str,
    /// Owning run.
    pub run_id: &'a str,
}

/// Daily portfolio snapshot row.
#[derive(Debug, Clone)]
pub struct DailySnapshot {
    /// Snapshot date.
    pub snapshot_date: NaiveDate,
    /// Equity at snapshot time.
    pub equity: f64,
    /// Cash at snapshot time.
    pub cash: f64,
    /// High-water mark as of the snapshot.
    pub high_water_mark: f64,
    /// Day-over-day pnl percent.
    pub daily_pnl_pct: f64,
    /// Drawdown percent.
    pub drawdown_pct: f64,
    /// Open position count.
    pub open_positions: i64,
}

/// Persisted circuit breaker trigger.
#[derive(Debug, Clone)]
pub struct BreakerRecord {
    /// Row id.
    pub id: i64,
    /// Severity level 1..=4.
    pub level: u8,
    /// Trigger timestamp.
    pub triggered_at: DateTime<Utc>,
    /// Drawdown percent at trigger time.
    pub drawdown_pct: f64,
}

/// Execution ledger handle.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (creating if missing) and migrate the database at `path`.
    pub async fn open(path: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        Self::connect(options).await
    }

    /// Open an in-memory database. Test-only convenience.
    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(LedgerError::Database)?;
        Self::connect(options.foreign_keys(true)).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, LedgerError> {
        // Single writer process; one connection keeps in-memory databases
        // coherent and serializes file access.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    /// Underlying pool, for health checks.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;
        let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        let current = current.unwrap_or(0);

        for (idx, batch) in schema::MIGRATIONS.iter().enumerate() {
            let version = idx as i64 + 1;
            if version <= current {
                continue;
            }
            sqlx::raw_sql(batch).execute(&self.pool).await?;
            sqlx::query("INSERT INTO schema_version (version) VALUES (?1)")
                .bind(version)
                .execute(&self.pool)
                .await?;
            tracing::info!(version, "Applied ledger migration");
        }
        Ok(())
    }

    // =========================================================================
    // Run records
    // =========================================================================

    /// Fetch the run record for `run_id`, if any.
    pub async fn find_run(&self, run_id: &str) -> Result<Option<RunRecord>, LedgerError> {
        let row = sqlx::query(
            "SELECT run_id, mode, status, started_at, completed_at, error_message
             FROM execution_logs WHERE run_id = ?1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(RunRecord {
                run_id: row.try_get("run_id")?,
                mode: row.try_get("mode")?,
                status: row.try_get("status")?,
                started_at: parse_timestamp(&row.try_get::<String, _>("started_at")?)?,
                completed_at: row
                    .try_get::<Option<String>, _>("completed_at")?
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()?,
                error_message: row.try_get("error_message")?,
            })
        })
        .transpose()
    }

    /// Insert the "running" row for a new run. The UNIQUE run id constraint
    /// makes a duplicate insert fail rather than fork a second record.
    pub async fn start_run(
        &self,
        run_id: &str,
        mode: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO execution_logs (run_id, mode, status, started_at)
             VALUES (?1, ?2, 'running', ?3)",
        )
        .bind(run_id)
        .bind(mode)
        .bind(started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the existing run row in place to a terminal status.
    pub async fn finalize_run(
        &self,
        run_id: &str,
        status: &str,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
        duration_ms: i64,
        decisions_json: Option<&str>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE execution_logs
             SET status = ?2, error_message = ?3, completed_at = ?4,
                 duration_ms = ?5, decisions_json = ?6
             WHERE run_id = ?1",
        )
        .bind(run_id)
        .bind(status)
        .bind(error_message)
        .bind(completed_at.to_rfc3339())
        .bind(duration_ms)
        .bind(decisions_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Timestamp of the most recent successful run, any mode.
    pub async fn last_success_at(&self) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT completed_at FROM execution_logs
             WHERE status = 'success' AND completed_at IS NOT NULL
             ORDER BY completed_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        value.as_deref().map(parse_timestamp).transpose()
    }

    /// Number of runs finalized as "error" since `since`.
    pub async fn error_runs_since(&self, since: DateTime<Utc>) -> Result<i64, LedgerError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM execution_logs
             WHERE status = 'error' AND started_at >= ?1",
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// All open positions.
    pub async fn open_positions(&self) -> Result<Vec<LedgerPosition>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, symbol, qty, entry_price, entry_date, stop_loss,
                    take_profit, sector, source
             FROM positions WHERE status = 'open' ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LedgerPosition {
                    id: row.try_get("id")?,
                    symbol: row.try_get("symbol")?,
                    qty: row.try_get("qty")?,
                    entry_price: row.try_get("entry_price")?,
                    entry_date: parse_date(&row.try_get::<String, _>("entry_date")?)?,
                    stop_loss: row.try_get("stop_loss")?,
                    take_profit: row.try_get("take_profit")?,
                    sector: row.try_get("sector")?,
                    source: row.try_get("source")?,
                })
            })
            .collect()
    }

    /// Count of positions (open or closed) entered on `date`. Drives the
    /// daily entry cap.
    pub async fn entries_on(&self, date: NaiveDate) -> Result<i64, LedgerError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE entry_date = ?1")
                .bind(format_date(date))
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Insert a new open position row.
    pub async fn insert_position(&self, position: &NewPosition<'_>) -> Result<i64, LedgerError> {
        let result = sqlx::query(
            "INSERT INTO positions
               (symbol, qty, entry_price, entry_date, stop_loss, take_profit,
                sector, source, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'open', ?9)",
        )
        .bind(position.symbol)
        .bind(position.qty)
        .bind(position.entry_price)
        .bind(format_date(position.entry_date))
        .bind(position.stop_loss)
        .bind(position.take_profit)
        .bind(position.sector)
        .bind(position.source)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Close the open position for `symbol`, computing realized pnl from the
    /// stored entry price.
    pub async fn close_position(
        &self,
        symbol: &str,
        close_price: Option<f64>,
        close_date: NaiveDate,
        reason: &str,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE positions
             SET status = 'closed',
                 close_price = ?2,
                 close_date = ?3,
                 close_reason = ?4,
                 pnl = CASE WHEN ?2 IS NULL THEN NULL
                       ELSE (?2 - entry_price) * qty END
             WHERE symbol = ?1 AND status = 'open'",
        )
        .bind(symbol)
        .bind(close_price)
        .bind(format_date(close_date))
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite the quantity of the open position for `symbol`.
    pub async fn update_position_qty(&self, symbol: &str, qty: f64) -> Result<(), LedgerError> {
        sqlx::query("UPDATE positions SET qty = ?2 WHERE symbol = ?1 AND status = 'open'")
            .bind(symbol)
            .bind(qty)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Trades
    // =========================================================================

    /// Append one trade row.
    pub async fn insert_trade(&self, trade: &NewTrade<'_>) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO trades
               (symbol, side, qty, price, order_id, client_order_id, executed_at, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(trade.symbol)
        .bind(trade.side)
        .bind(trade.qty)
        .bind(trade.price)
        .bind(trade.order_id)
        .bind(trade.client_order_id)
        .bind(Utc::now().to_rfc3339())
        .bind(trade.run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Daily snapshots
    // =========================================================================

    /// Latest daily snapshot, if any.
    pub async fn latest_snapshot(&self) -> Result<Option<DailySnapshot>, LedgerError> {
        let row = sqlx::query(
            "SELECT snapshot_date, equity, cash, high_water_mark, daily_pnl_pct,
                    drawdown_pct, open_positions
             FROM daily_snapshots ORDER BY snapshot_date DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(DailySnapshot {
                snapshot_date: parse_date(&row.try_get::<String, _>("snapshot_date")?)?,
                equity: row.try_get("equity")?,
                cash: row.try_get("cash")?,
                high_water_mark: row.try_get("high_water_mark")?,
                daily_pnl_pct: row.try_get("daily_pnl_pct")?,
                drawdown_pct: row.try_get("drawdown_pct")?,
                open_positions: row.try_get("open_positions")?,
            })
        })
        .transpose()
    }

    /// Insert or replace the snapshot for its date. The HWM is persisted at
    /// most once per day through this upsert.
    pub async fn upsert_snapshot(&self, snapshot: &DailySnapshot) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO daily_snapshots
               (snapshot_date, equity, cash, high_water_mark, daily_pnl_pct,
                drawdown_pct, open_positions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(snapshot_date) DO UPDATE SET
               equity = excluded.equity,
               cash = excluded.cash,
               high_water_mark = excluded.high_water_mark,
               daily_pnl_pct = excluded.daily_pnl_pct,
               drawdown_pct = excluded.drawdown_pct,
               open_positions = excluded.open_positions",
        )
        .bind(format_date(snapshot.snapshot_date))
        .bind(snapshot.equity)
        .bind(snapshot.cash)
        .bind(snapshot.high_water_mark)
        .bind(snapshot.daily_pnl_pct)
        .bind(snapshot.drawdown_pct)
        .bind(snapshot.open_positions)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Circuit breaker
    // =========================================================================

    /// The unresolved breaker trigger, if one exists.
    pub async fn active_breaker(&self) -> Result<Option<BreakerRecord>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, level, triggered_at, drawdown_pct
             FROM circuit_breaker WHERE resolved_at IS NULL
             ORDER BY triggered_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let level: i64 = row.try_get("level")?;
            Ok(BreakerRecord {
                id: row.try_get("id")?,
                level: u8::try_from(level)
                    .map_err(|_| LedgerError::Corrupt(format!("breaker level {level}")))?,
                triggered_at: parse_timestamp(&row.try_get::<String, _>("triggered_at")?)?,
                drawdown_pct: row.try_get("drawdown_pct")?,
            })
        })
        .transpose()
    }

    /// Append a new breaker trigger record.
    pub async fn insert_breaker(
        &self,
        level: u8,
        triggered_at: DateTime<Utc>,
        drawdown_pct: f64,
        reason: &str,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO circuit_breaker (level, triggered_at, drawdown_pct, reason)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(i64::from(level))
        .bind(triggered_at.to_rfc3339())
        .bind(drawdown_pct)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a breaker trigger resolved.
    pub async fn resolve_breaker(
        &self,
        id: i64,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        sqlx::query("UPDATE circuit_breaker SET resolved_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(resolved_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Reconciliation audit
    // =========================================================================

    /// Append one immutable reconciliation audit row.
    pub async fn append_reconciliation(
        &self,
        run_id: &str,
        issue_type: &str,
        symbol: Option<&str>,
        details: &str,
        auto_fixed: bool,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO reconciliation_logs
               (run_id, issue_type, symbol, details, auto_fixed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(run_id)
        .bind(issue_type)
        .bind(symbol)
        .bind(details)
        .bind(auto_fixed)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Run `PRAGMA integrity_check` and verify required tables exist.
    pub async fn integrity_ok(&self) -> Result<bool, LedgerError> {
        let verdict: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;
        if verdict != "ok" {
            return Ok(false);
        }
        for table in schema::REQUIRED_TABLES {
            let present: Option<String> = sqlx::query_scalar(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            )
            .bind(table)
            .fetch_optional(&self.pool)
            .await?;
            if present.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(value: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| LedgerError::Corrupt(format!("date {value:?}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| LedgerError::Corrupt(format!("timestamp {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::assert_ok;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn run_record_roundtrip_and_finalize_in_place() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let started = Utc.with_ymd_and_hms(2026, 8, 24, 13, 30, 0).unwrap();

        ledger
            .start_run("20260824_morning_093000", "morning", started)
            .await
            .unwrap();
        let running = ledger
            .find_run("20260824_morning_093000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(running.status, "running");
        assert!(running.completed_at.is_none());

        ledger
            .finalize_run(
                "20260824_morning_093000",
                "success",
                None,
                started + chrono::Duration::seconds(42),
                42_000,
                Some("[]"),
            )
            .await
            .unwrap();
        let done = ledger
            .find_run("20260824_morning_093000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, "success");
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_run_id_insert_fails() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let now = Utc::now();
        ledger.start_run("r1", "morning", now).await.unwrap();
        assert!(ledger.start_run("r1", "morning", now).await.is_err());
    }

    #[tokio::test]
    async fn position_lifecycle() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let entry = date(2026, 8, 24);

        ledger
            .insert_position(&NewPosition {
                symbol: "AAPL",
                qty: 10.0,
                entry_price: 100.0,
                entry_date: entry,
                stop_loss: Some(95.0),
                take_profit: Some(110.0),
                sector: "Technology",
                source: "signal",
            })
            .await
            .unwrap();

        let open = ledger.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, "AAPL");
        assert_eq!(ledger.entries_on(entry).await.unwrap(), 1);

        ledger
            .close_position("AAPL", Some(108.0), date(2026, 8, 25), "signal")
            .await
            .unwrap();
        assert!(ledger.open_positions().await.unwrap().is_empty());
        // Closed positions still count toward the entry date.
        assert_eq!(ledger.entries_on(entry).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn qty_update_touches_only_open_row() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        ledger
            .insert_position(&NewPosition {
                symbol: "MSFT",
                qty: 5.0,
                entry_price: 400.0,
                entry_date: date(2026, 8, 24),
                stop_loss: None,
                take_profit: None,
                sector: "Technology",
                source: "signal",
            })
            .await
            .unwrap();
        ledger.update_position_qty("MSFT", 3.0).await.unwrap();
        let open = ledger.open_positions().await.unwrap();
        assert_eq!(open[0].qty, 3.0);
    }

    #[tokio::test]
    async fn snapshot_upsert_is_idempotent_per_day() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let mut snapshot = DailySnapshot {
            snapshot_date: date(2026, 8, 24),
            equity: 100_000.0,
            cash: 40_000.0,
            high_water_mark: 105_000.0,
            daily_pnl_pct: -1.0,
            drawdown_pct: 4.76,
            open_positions: 3,
        };
        ledger.upsert_snapshot(&snapshot).await.unwrap();
        snapshot.equity = 101_000.0;
        ledger.upsert_snapshot(&snapshot).await.unwrap();

        let latest = ledger.latest_snapshot().await.unwrap().unwrap();
        assert_eq!(latest.equity, 101_000.0);
        assert_eq!(latest.snapshot_date, date(2026, 8, 24));
    }

    #[tokio::test]
    async fn breaker_trigger_and_resolve() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 20, 14, 0, 0).unwrap();

        assert!(ledger.active_breaker().await.unwrap().is_none());
        ledger
            .insert_breaker(2, t0, 7.5, "drawdown 7.5% breached level 2")
            .await
            .unwrap();
        let active = ledger.active_breaker().await.unwrap().unwrap();
        assert_eq!(active.level, 2);
        assert_eq!(active.triggered_at, t0);

        ledger
            .resolve_breaker(active.id, t0 + chrono::Duration::hours(72))
            .await
            .unwrap();
        assert!(ledger.active_breaker().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn integrity_check_passes_on_fresh_db() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let ok = assert_ok!(ledger.integrity_ok().await);
        assert!(ok);
    }

    #[tokio::test]
    async fn error_counting_window() {
        let ledger = Ledger::open_in_memory().await.unwrap();
        let now = Utc::now();
        ledger.start_run("e1", "morning", now).await.unwrap();
        ledger
            .finalize_run("e1", "error", Some("boom"), now, 10, None)
            .await
            .unwrap();
        assert_eq!(
            ledger
                .error_runs_since(now - chrono::Duration::hours(24))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            ledger
                .error_runs_since(now + chrono::Duration::hours(1))
                .await
                .unwrap(),
            0
        );
    }
}
