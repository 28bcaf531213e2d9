use std::time::Duration;

use alloy::primitives::Address;
use derive_more::Display;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of [`Error`], for callers deciding whether to retry, report or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    #[display("transient chain error")]
    TransientChain,
    #[display("data consistency error")]
    DataConsistency,
    #[display("validation error")]
    Validation,
    #[display("storage error")]
    Storage,
    #[display("configuration error")]
    Config,
    #[display("cancelled")]
    Cancelled,
    #[display("timed out")]
    TimedOut,
}

#[derive(Debug, Error)]
pub enum Error {
    /// RPC or network failure on a read call, after the reader gave up retrying.
    #[error("chain read {operation} failed for {target}: {message}")]
    TransientChain {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// Stored catalog data disagrees with the chain or with the query it answers.
    #[error("pool {pool} is inconsistent: {message}")]
    DataConsistency { pool: Address, message: String },

    /// The stored scan cursor moved underneath a commit, e.g. two scanners on one catalog.
    #[error("scan cursor is at {stored}, expected {expected}")]
    CursorConflict { expected: u64, stored: u64 },

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("catalog query failed: {0}")]
    Storage(#[from] diesel::result::Error),

    #[error("catalog connection unavailable: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("catalog schema migration failed: {0}")]
    Migration(String),

    /// A catalog call handed to the blocking pool panicked or was cancelled.
    #[error("catalog task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid configuration {variable}: {message}")]
    Config {
        variable: &'static str,
        message: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {after:?}")]
    TimedOut { after: Duration },

    /// A scan stopped at `index`; every index below `committed` is durably recorded.
    #[error("scan stopped at registry index {index} ({committed} committed): {source}")]
    Scan {
        index: u64,
        committed: u64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn transient(
        operation: &'static str,
        target: impl ToString,
        message: impl ToString,
    ) -> Self {
        Self::TransientChain {
            operation,
            target: target.to_string(),
            message: message.to_string(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn inconsistent(pool: Address, message: impl Into<String>) -> Self {
        Self::DataConsistency {
            pool,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientChain { .. } => ErrorKind::TransientChain,
            Self::DataConsistency { .. } | Self::CursorConflict { .. } => {
                ErrorKind::DataConsistency
            }
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Storage(_) | Self::Pool(_) | Self::Migration(_) | Self::Task(_) => {
                ErrorKind::Storage
            }
            Self::Config { .. } => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::Scan { source, .. } => source.kind(),
        }
    }

    /// Whether the failure may go away if the same call is repeated.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientChain
    }
}
