// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Trading Agent - Core Library
//!
//! A scheduled equity trading pipeline against an Alpaca paper account. The
//! safety and consistency control plane is the heart of the crate:
//!
//! - **Idempotent single-run protocol**: a non-blocking process lock, unique
//!   run ids in the ledger, and deterministic client order ids form three
//!   layers against duplicate execution.
//! - **Circuit breaker** ([`risk::breaker`]): a persisted drawdown state
//!   machine with per-level cooldowns gating all new entries.
//! - **Entry gate** ([`risk::gate`]): six ordered eligibility checks with a
//!   single surfaced rejection reason.
//! - **Reconciliation** ([`reconcile`]): the brokerage is the source of truth
//!   for positions; small ledger divergences are auto-repaired, large ones
//!   flagged for manual review.
//! - **Order sequencing** ([`orders`]): every sell dispatched before any buy,
//!   bracket orders for entries, literal two-attempt retries.
//!
//! External collaborators sit behind ports: [`broker::BrokerPort`] for the
//! brokerage and [`oracle::DecisionOracle`] for the LLM decision subprocess.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Brokerage port and the Alpaca adapter.
pub mod broker;

/// Configuration loading and validation.
pub mod config;

/// Pipeline error taxonomy.
pub mod error;

/// Subsystem health checks.
pub mod health;

/// Execution ledger over SQLite.
pub mod ledger;

/// Single-instance process guard.
pub mod lock;

/// Core value types.
pub mod models;

/// Decision oracle boundary.
pub mod oracle;

/// SELL-before-BUY order dispatcher.
pub mod orders;

/// Run orchestration.
pub mod pipeline;

/// Portfolio state derivation.
pub mod portfolio;

/// Broker/ledger reconciliation.
pub mod reconcile;

/// Risk controls.
pub mod risk;

/// Static trading universe.
pub mod universe;

pub use broker::{AlpacaBroker, BrokerError, BrokerPort};
pub use config::{AppConfig, ConfigError};
pub use error::PipelineError;
pub use ledger::{Ledger, LedgerError};
pub use lock::ProcessGuard;
pub use oracle::{CliOracle, DecisionOracle, OracleError};
pub use pipeline::{Mode, Pipeline, RunOutcome};
