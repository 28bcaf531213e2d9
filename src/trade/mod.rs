//! Boundary to whatever executes swaps.
//!
//! This crate builds and checks a [`TradeRequest`] and hands it to a [`TradeExecutor`]. Signing,
//! gas and submission live behind the executor, in a separate process that holds the keys.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::models::RankedPool;

/// A fully specified swap, ready for an executor.
///
/// `path` lists the pools to swap through, in order; a direct swap has one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub path: Vec<Address>,
    pub amount_in: U256,
    /// The trade must revert rather than return less than this
    pub amount_out_min: U256,
    pub recipient: Address,
    /// Unix timestamp after which the trade must not execute
    pub deadline: u64,
}

impl TradeRequest {
    /// # Errors
    /// * `Error::Validation` for an empty path, a zero pool, `amount_in == 0` or a zero recipient
    pub fn new(
        path: Vec<Address>,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
        deadline: u64,
    ) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::validation("path", "no pools to swap through"));
        }
        if path.iter().any(|pool| pool.is_zero()) {
            return Err(Error::validation("path", "contains the zero address"));
        }
        if amount_in.is_zero() {
            return Err(Error::validation("amount_in", "must be positive"));
        }
        if recipient.is_zero() {
            return Err(Error::validation("recipient", "zero address"));
        }

        Ok(Self {
            path,
            amount_in,
            amount_out_min,
            recipient,
            deadline,
        })
    }

    /// A direct swap through a ranked pool
    ///
    /// # Errors
    /// See [`TradeRequest::new`]
    pub fn through_pool(
        pool: &RankedPool,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
        deadline: u64,
    ) -> Result<Self> {
        Self::new(vec![pool.address], amount_in, amount_out_min, recipient, deadline)
    }

    pub const fn is_expired(&self, now: u64) -> bool {
        now > self.deadline
    }
}

/// Amounts a confirmed trade actually moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub transaction_hash: B256,
    pub amount_in: U256,
    pub amount_out: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeFailure {
    #[error("trade reverted: {reason}")]
    Reverted { reason: String },

    #[error("trade deadline {deadline} passed")]
    Expired { deadline: u64 },

    #[error("trade returned {actual}, below the minimum {minimum}")]
    InsufficientOutput { minimum: U256, actual: U256 },

    /// The executor refused the request without trying it
    #[error("trade rejected: {0}")]
    Rejected(String),
}

/// Executes swaps on chain
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// # Errors
    /// * A [`TradeFailure`] describing why nothing, or too little, was swapped
    async fn execute(&self, request: &TradeRequest) -> std::result::Result<TradeReceipt, TradeFailure>;
}

/// Sends `request` to `executor` unless its deadline has passed, and holds the executor to the
/// request's minimum output.
///
/// # Errors
/// * `TradeFailure::Expired` if `now` is past the deadline; the executor is not called
/// * `TradeFailure::InsufficientOutput` if the receipt reports less than `amount_out_min`
/// * Any failure reported by the executor
pub async fn submit<E: TradeExecutor + ?Sized>(
    executor: &E,
    request: &TradeRequest,
    now: u64,
) -> std::result::Result<TradeReceipt, TradeFailure> {
    if request.is_expired(now) {
        return Err(TradeFailure::Expired {
            deadline: request.deadline,
        });
    }

    let receipt = executor.execute(request).await.inspect_err(|e| {
        warn!("trade::submit: Trade through {:?} failed: {e}", request.path);
    })?;

    if receipt.amount_out < request.amount_out_min {
        return Err(TradeFailure::InsufficientOutput {
            minimum: request.amount_out_min,
            actual: receipt.amount_out,
        });
    }

    info!(
        "trade::submit: Swapped {} for {} in {}",
        receipt.amount_in, receipt.amount_out, receipt.transaction_hash
    );
    Ok(receipt)
}
