//! Versioned SQLite schema.
//!
//! Migrations are append-only: a new change is a new entry in [`MIGRATIONS`],
//! never an edit to an existing one. The current version is tracked in
//! `schema_version`.

/// Ordered migration batches. Index + 1 is the schema version.
pub const MIGRATIONS: &[&str] = &[
    // v1: full base schema
    "
    CREATE TABLE IF NOT EXISTS positions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL DEFAULT 'long',
        qty REAL NOT NULL,
        entry_price REAL NOT NULL,
        entry_date TEXT NOT NULL,
        stop_loss REAL,
        take_profit REAL,
        status TEXT NOT NULL DEFAULT 'open',
        close_price REAL,
        close_date TEXT,
        close_reason TEXT,
        pnl REAL,
        sector TEXT NOT NULL DEFAULT 'Unknown',
        source TEXT NOT NULL DEFAULT 'signal',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_positions_status ON positions (status);
    CREATE INDEX IF NOT EXISTS idx_positions_symbol ON positions (symbol);

    CREATE TABLE IF NOT EXISTS trades (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        qty REAL NOT NULL,
        price REAL,
        order_id TEXT,
        client_order_id TEXT,
        executed_at TEXT NOT NULL,
        run_id TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS daily_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        snapshot_date TEXT NOT NULL UNIQUE,
        equity REAL NOT NULL,
        cash REAL NOT NULL,
        high_water_mark REAL NOT NULL,
        daily_pnl_pct REAL NOT NULL DEFAULT 0,
        drawdown_pct REAL NOT NULL DEFAULT 0,
        open_positions INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS execution_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL UNIQUE,
        mode TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        error_message TEXT,
        duration_ms INTEGER,
        decisions_json TEXT
    );

    CREATE TABLE IF NOT EXISTS circuit_breaker (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        level INTEGER NOT NULL,
        triggered_at TEXT NOT NULL,
        drawdown_pct REAL NOT NULL,
        reason TEXT,
        resolved_at TEXT
    );

    CREATE TABLE IF NOT EXISTS reconciliation_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        issue_type TEXT NOT NULL,
        symbol TEXT,
        details TEXT,
        auto_fixed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
    ",
];

/// Tables that must exist for the database to be considered healthy.
pub const REQUIRED_TABLES: &[&str] = &[
    "positions",
    "trades",
    "daily_snapshots",
    "execution_logs",
    "circuit_breaker",
    "reconciliation_logs",
];
