//! Subsystem health checks for the `health_check` mode.

use chrono::{DateTime, Duration, Utc};

use crate::broker::BrokerPort;
use crate::config::AppConfig;
use crate::ledger::Ledger;

/// A successful run older than this is considered stale.
const STALENESS_HOURS: i64 = 26;

/// Error-run count in the last 24h at which health fails.
const ERROR_RUN_LIMIT: i64 = 3;

/// Breaker level at or above which health fails.
const BREAKER_FAIL_LEVEL: u8 = 3;

/// One named check outcome.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Check name.
    pub name: &'static str,
    /// Pass/fail.
    pub ok: bool,
    /// Detail line.
    pub detail: String,
}

/// Aggregate health report.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Individual checks in evaluation order.
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    /// True when every check passed.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }
}

/// Run all health checks.
pub async fn run_health_checks<B: BrokerPort + ?Sized>(
    config: &AppConfig,
    ledger: &Ledger,
    broker: &B,
    now: DateTime<Utc>,
) -> HealthReport {
    let mut checks = Vec::new();

    // Paper trading must be enforced at both the flag and the endpoint.
    let paper_ok = config.alpaca.paper && config.alpaca.is_paper_endpoint();
    checks.push(CheckResult {
        name: "paper_trading",
        ok: paper_ok,
        detail: if paper_ok {
            "paper endpoint enforced".to_string()
        } else {
            format!("non-paper endpoint {}", config.alpaca.trading_base_url)
        },
    });

    match broker.account().await {
        Ok(account) => checks.push(CheckResult {
            name: "api_connectivity",
            ok: true,
            detail: format!("account reachable, equity {:.2}", account.equity),
        }),
        Err(e) => checks.push(CheckResult {
            name: "api_connectivity",
            ok: false,
            detail: e.to_string(),
        }),
    }

    match ledger.integrity_ok().await {
        Ok(true) => checks.push(CheckResult {
            name: "db_integrity",
            ok: true,
            detail: "integrity_check ok, all tables present".to_string(),
        }),
        Ok(false) => checks.push(CheckResult {
            name: "db_integrity",
            ok: false,
            detail: "integrity_check failed or tables missing".to_string(),
        }),
        Err(e) => checks.push(CheckResult {
            name: "db_integrity",
            ok: false,
            detail: e.to_string(),
        }),
    }

    match ledger.last_success_at().await {
        Ok(Some(at)) => {
            let age = now - at;
            let ok = age <= Duration::hours(STALENESS_HOURS);
            checks.push(CheckResult {
                name: "execution_staleness",
                ok,
                detail: format!("last success {}h ago", age.num_hours()),
            });
        }
        // A fresh install has no runs yet; that is not unhealthy.
        Ok(None) => checks.push(CheckResult {
            name: "execution_staleness",
            ok: true,
            detail: "no successful runs recorded yet".to_string(),
        }),
        Err(e) => checks.push(CheckResult {
            name: "execution_staleness",
            ok: false,
            detail: e.to_string(),
        }),
    }

    match ledger.active_breaker().await {
        Ok(Some(record)) => checks.push(CheckResult {
            name: "circuit_breaker",
            ok: record.level < BREAKER_FAIL_LEVEL,
            detail: format!("active at level {}", record.level),
        }),
        Ok(None) => checks.push(CheckResult {
            name: "circuit_breaker",
            ok: true,
            detail: "inactive".to_string(),
        }),
        Err(e) => checks.push(CheckResult {
            name: "circuit_breaker",
            ok: false,
            detail: e.to_string(),
        }),
    }

    match ledger.error_runs_since(now - Duration::hours(24)).await {
        Ok(count) => checks.push(CheckResult {
            name: "recent_errors",
            ok: count < ERROR_RUN_LIMIT,
            detail: format!("{count} error runs in 24h"),
        }),
        Err(e) => checks.push(CheckResult {
            name: "recent_errors",
            ok: false,
            detail: e.to_string(),
        }),
    }

    let report = HealthReport { checks };
    for check in &report.checks {
        if check.ok {
            tracing::info!(check = check.name, detail = %check.detail, "Health check passed");
        } else {
            tracing::error!(check = check.name, detail = %check.detail, "Health check FAILED");
        }
    }
    report
}
