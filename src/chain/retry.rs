use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use log::warn;

use super::ChainReader;
use crate::errors::{Error, Result};
use crate::models::Reserves;

/// How a [`RetryingChainReader`] bounds and repeats calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub initial_backoff: Duration,
    /// Deadline for a single call, including the node's response
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with up to 50% random jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.saturating_mul(1 << attempt.min(10));
        let jitter_ms = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
        base + Duration::from_millis(fastrand::u64(0..=jitter_ms))
    }
}

/// Wraps a reader so that every call has a timeout and transient failures are retried.
///
/// Non-transient errors (validation, consistency) are returned on the first occurrence.
#[derive(Debug, Clone)]
pub struct RetryingChainReader<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: ChainReader> RetryingChainReader<R> {
    pub const fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retry<T, D, F, Fut>(&self, operation: &'static str, target: D, call: F) -> Result<T>
    where
        D: Display + Send + Sync,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::transient(
                    operation,
                    &target,
                    format!("no response within {:?}", self.policy.call_timeout),
                )),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff(attempt);
                    attempt += 1;
                    warn!(
                        "chain::retry: {operation} for {target} failed (attempt {attempt}): {e}, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

#[async_trait]
impl<R: ChainReader> ChainReader for RetryingChainReader<R> {
    async fn registry_size(&self) -> Result<u64> {
        self.with_retry("allPairsLength", "factory", || self.inner.registry_size())
            .await
    }

    async fn registry_entry_at(&self, index: u64) -> Result<Address> {
        self.with_retry("allPairs", index, || self.inner.registry_entry_at(index))
            .await
    }

    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address)> {
        self.with_retry("token0/token1", pool, || self.inner.pool_tokens(pool))
            .await
    }

    async fn pool_reserves(&self, pool: Address) -> Result<Reserves> {
        self.with_retry("getReserves", pool, || self.inner.pool_reserves(pool))
            .await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        self.with_retry("decimals", token, || self.inner.token_decimals(token))
            .await
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        self.with_retry("symbol", token, || self.inner.token_symbol(token))
            .await
    }

    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256> {
        self.with_retry("balanceOf", token, || self.inner.token_balance(token, holder))
            .await
    }
}
