//! Drawdown circuit breaker.
//!
//! A persisted state machine over four severity levels. Each level pairs a
//! drawdown threshold with a minimum dwell (cooldown) proportional to
//! severity, which prevents threshold flapping: once triggered, the breaker
//! holds its original level until the cooldown date passes, regardless of how
//! drawdown moves in the meantime. Level 4 has no cooldown and only resolves
//! through manual intervention in the ledger.
//!
//! Evaluation takes `now` as a parameter so tests run against a fixed clock.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::ledger::{Ledger, LedgerError};

/// Cooldown hours per level 1..=3. Level 4 is unbounded.
const COOLDOWN_HOURS: [i64; 3] = [48, 72, 168];

/// Current breaker verdict for this run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerStatus {
    /// Whether new entries are blocked.
    pub active: bool,
    /// Severity level, 0 when inactive.
    pub level: u8,
    /// Drawdown percent that produced this status.
    pub drawdown_pct: f64,
    /// Date the cooldown ends, `None` when inactive or unbounded (level 4).
    pub cooldown_until: Option<NaiveDate>,
}

impl BreakerStatus {
    const fn inactive(drawdown_pct: f64) -> Self {
        Self {
            active: false,
            level: 0,
            drawdown_pct,
            cooldown_until: None,
        }
    }
}

/// Drawdown circuit breaker over the persisted trigger log.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    ledger: Ledger,
    /// Strictly increasing drawdown thresholds for levels 1..=4.
    thresholds: [f64; 4],
}

impl CircuitBreaker {
    /// New breaker with the given level thresholds.
    #[must_use]
    pub const fn new(ledger: Ledger, thresholds: [f64; 4]) -> Self {
        Self { ledger, thresholds }
    }

    /// Level breached by `drawdown_pct`, checked from the highest threshold
    /// down; 0 when none is breached.
    #[must_use]
    pub fn breach_level(&self, drawdown_pct: f64) -> u8 {
        for level in (1..=4u8).rev() {
            if drawdown_pct >= self.thresholds[usize::from(level - 1)] {
                return level;
            }
        }
        0
    }

    /// Cooldown end date for a trigger of `level` at `triggered_at`.
    /// `None` for level 4 (unbounded).
    #[must_use]
    pub fn cooldown_until(level: u8, triggered_at: DateTime<Utc>) -> Option<NaiveDate> {
        match level {
            1..=3 => {
                let hours = COOLDOWN_HOURS[usize::from(level - 1)];
                Some((triggered_at + Duration::hours(hours)).date_naive())
            }
            _ => None,
        }
    }

    /// Evaluate the breaker for the current drawdown.
    ///
    /// An unresolved trigger whose cooldown has not elapsed stays active at
    /// its original level. An elapsed cooldown resolves the record, then the
    /// fresh drawdown is evaluated as if no breaker existed. A persistence
    /// failure here is fatal for the run.
    pub async fn evaluate(
        &self,
        drawdown_pct: f64,
        now: DateTime<Utc>,
    ) -> Result<BreakerStatus, LedgerError> {
        let today = now.date_naive();

        if let Some(record) = self.ledger.active_breaker().await? {
            let cooldown_until = Self::cooldown_until(record.level, record.triggered_at);
            let still_cooling = match cooldown_until {
                // Level 4: never self-resolves.
                None => true,
                Some(until) => today < until,
            };
            if still_cooling {
                tracing::warn!(
                    level = record.level,
                    drawdown_pct,
                    cooldown_until = ?cooldown_until,
                    "Circuit breaker active, holding original level"
                );
                return Ok(BreakerStatus {
                    active: true,
                    level: record.level,
                    drawdown_pct,
                    cooldown_until,
                });
            }
            self.ledger.resolve_breaker(record.id, now).await?;
            tracing::info!(
                level = record.level,
                "Circuit breaker cooldown elapsed, trigger resolved"
            );
        }

        let level = self.breach_level(drawdown_pct);
        if level == 0 {
            return Ok(BreakerStatus::inactive(drawdown_pct));
        }

        let reason = format!(
            "drawdown {drawdown_pct:.2}% breached level {level} threshold {:.1}%",
            self.thresholds[usize::from(level - 1)]
        );
        self.ledger
            .insert_breaker(level, now, drawdown_pct, &reason)
            .await?;
        let cooldown_until = Self::cooldown_until(level, now);
        tracing::warn!(level, drawdown_pct, cooldown_until = ?cooldown_until, "Circuit breaker triggered");

        Ok(BreakerStatus {
            active: true,
            level,
            drawdown_pct,
            cooldown_until,
        })
    }
}
