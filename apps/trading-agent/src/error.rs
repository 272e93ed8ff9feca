//! Pipeline-level error taxonomy.
//!
//! Every failure mode of a run maps to one variant here, and every variant
//! maps to a process exit code. Benign outcomes (duplicate run, weekend skip)
//! are not errors and never reach this type.

use crate::broker::BrokerError;
use crate::ledger::LedgerError;
use crate::oracle::OracleError;

/// Top-level error for a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Another instance holds the process lock. No side effects occurred.
    #[error("another instance is already running (lock held on {path})")]
    LockContention {
        /// Path of the contended lock file.
        path: String,
    },

    /// Lock file could not be created or opened.
    #[error("failed to open lock file {path}: {source}")]
    LockIo {
        /// Path of the lock file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The local ledger failed. Fatal: the run is finalized as "error".
    #[error("ledger failure: {0}")]
    Persistence(#[from] LedgerError),

    /// A brokerage read needed to even start the run failed.
    #[error("broker failure: {0}")]
    Broker(#[from] BrokerError),

    /// The decision oracle could not produce a batch.
    #[error("decision oracle failure: {0}")]
    Oracle(#[from] OracleError),
}

impl PipelineError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        // Everything that reaches main as an error exits 1; lock contention
        // is listed separately because it must not be retried by the caller.
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_contention_exits_one() {
        let err = PipelineError::LockContention {
            path: "/tmp/agent.lock".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn display_includes_lock_path() {
        let err = PipelineError::LockContention {
            path: "/var/run/agent.lock".to_string(),
        };
        assert!(err.to_string().contains("/var/run/agent.lock"));
    }
}
