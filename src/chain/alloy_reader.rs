use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use async_trait::async_trait;

use super::ChainReader;
use crate::errors::{Error, Result};
use crate::models::Reserves;

sol! {
    #[sol(rpc)]
    interface IUniswapV2Factory {
        function allPairsLength() external view returns (uint256);
        function allPairs(uint256) external view returns (address);
    }

    #[sol(rpc)]
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }

    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function balanceOf(address) external view returns (uint256);
    }
}

/// [`ChainReader`] over a JSON-RPC provider and a UniswapV2-style factory.
///
/// Every contract error is reported as transient; wrap in
/// [`RetryingChainReader`](super::RetryingChainReader) to retry them.
#[derive(Debug, Clone)]
pub struct AlloyChainReader<P> {
    provider: P,
    factory: Address,
}

impl<P: Provider> AlloyChainReader<P> {
    pub const fn new(provider: P, factory: Address) -> Self {
        Self { provider, factory }
    }
}

#[async_trait]
impl<P: Provider> ChainReader for AlloyChainReader<P> {
    async fn registry_size(&self) -> Result<u64> {
        let factory = IUniswapV2Factory::new(self.factory, &self.provider);
        let length = factory
            .allPairsLength()
            .call()
            .await
            .map_err(|e| Error::transient("allPairsLength", self.factory, e))?
            ._0;

        u64::try_from(length).map_err(|_| {
            Error::validation("registry size", format!("{length} does not fit in u64"))
        })
    }

    async fn registry_entry_at(&self, index: u64) -> Result<Address> {
        let factory = IUniswapV2Factory::new(self.factory, &self.provider);
        Ok(factory
            .allPairs(U256::from(index))
            .call()
            .await
            .map_err(|e| Error::transient("allPairs", index, e))?
            ._0)
    }

    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address)> {
        let pair = IUniswapV2Pair::new(pool, &self.provider);
        let token0 = pair
            .token0()
            .call()
            .await
            .map_err(|e| Error::transient("token0", pool, e))?
            ._0;
        let token1 = pair
            .token1()
            .call()
            .await
            .map_err(|e| Error::transient("token1", pool, e))?
            ._0;
        Ok((token0, token1))
    }

    async fn pool_reserves(&self, pool: Address) -> Result<Reserves> {
        let pair = IUniswapV2Pair::new(pool, &self.provider);
        let reserves = pair
            .getReserves()
            .call()
            .await
            .map_err(|e| Error::transient("getReserves", pool, e))?;

        Ok(Reserves::new(
            U256::from(reserves.reserve0),
            U256::from(reserves.reserve1),
            reserves.blockTimestampLast,
        ))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        let contract = IERC20::new(token, &self.provider);
        Ok(contract
            .decimals()
            .call()
            .await
            .map_err(|e| Error::transient("decimals", token, e))?
            ._0)
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        let contract = IERC20::new(token, &self.provider);
        let symbol = contract
            .symbol()
            .call()
            .await
            .map_err(|e| Error::transient("symbol", token, e))?
            ._0;
        Ok(sanitize_symbol(&symbol))
    }

    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256> {
        let contract = IERC20::new(token, &self.provider);
        Ok(contract
            .balanceOf(holder)
            .call()
            .await
            .map_err(|e| Error::transient("balanceOf", token, e))?
            ._0)
    }
}

/// Drops NUL padding that some tokens leave in `symbol()`.
fn sanitize_symbol(value: &str) -> String {
    value.replace('\0', "").trim().to_string()
}
