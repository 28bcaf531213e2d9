//! Read-only access to the registry, pair and token contracts.
//!
//! [`ChainReader`] is the seam between the indexing core and the node. [`AlloyChainReader`]
//! talks to a UniswapV2-style factory over JSON-RPC; [`RetryingChainReader`] wraps any reader
//! with per-call timeouts and backoff on transient failures.

mod alloy_reader;
mod retry;

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::errors::Result;
use crate::models::Reserves;
use crate::normalize::{check_decimals, normalize};

pub use alloy_reader::AlloyChainReader;
pub use retry::{RetryPolicy, RetryingChainReader};

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Number of pools the factory has created
    async fn registry_size(&self) -> Result<u64>;

    /// Pool address at `index` of the factory registry
    async fn registry_entry_at(&self, index: u64) -> Result<Address>;

    /// `(token0, token1)` of a pool
    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address)>;

    async fn pool_reserves(&self, pool: Address) -> Result<Reserves>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;

    async fn token_symbol(&self, token: Address) -> Result<String>;

    /// Raw `balanceOf(holder)` of an ERC-20 token
    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256>;
}

#[async_trait]
impl<R: ChainReader + ?Sized> ChainReader for Arc<R> {
    async fn registry_size(&self) -> Result<u64> {
        (**self).registry_size().await
    }

    async fn registry_entry_at(&self, index: u64) -> Result<Address> {
        (**self).registry_entry_at(index).await
    }

    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address)> {
        (**self).pool_tokens(pool).await
    }

    async fn pool_reserves(&self, pool: Address) -> Result<Reserves> {
        (**self).pool_reserves(pool).await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        (**self).token_decimals(token).await
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        (**self).token_symbol(token).await
    }

    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256> {
        (**self).token_balance(token, holder).await
    }
}

/// `holder`'s balance of `token` in whole tokens.
///
/// # Errors
/// * `Error::TransientChain` if the balance or decimals cannot be read
/// * `Error::Validation` if the token reports more than 36 decimals
pub async fn normalized_balance<R: ChainReader + ?Sized>(
    reader: &R,
    token: Address,
    holder: Address,
) -> Result<BigDecimal> {
    let decimals = reader.token_decimals(token).await?;
    check_decimals(decimals)?;
    let balance = reader.token_balance(token, holder).await?;
    normalize(balance, decimals)
}
