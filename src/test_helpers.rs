use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::catalog::PoolCatalog;
use crate::chain::ChainReader;
use crate::errors::{Error, Result};
use crate::models::{Pool, Reserves};

pub fn addr(byte: u8) -> Address {
    Address::with_last_byte(byte)
}

/// Distinct address for the `index`-th generated pool or token
pub fn indexed_addr(prefix: u8, index: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = prefix;
    bytes[12..].copy_from_slice(&index.to_be_bytes());
    Address::from(bytes)
}

/// Fresh initialized catalog in a temporary directory. Keep the `TempDir` alive.
pub fn temp_catalog() -> (TempDir, PoolCatalog) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pools.db");
    let catalog = PoolCatalog::open(path.to_str().unwrap(), 4).unwrap();
    catalog.initialize().unwrap();
    (dir, catalog)
}

/// A call the mock can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    Entry(u64),
    Tokens(Address),
    Reserves(Address),
    Decimals(Address),
}

/// In-memory chain: a registry of pools with scriptable reserves, decimals and failures.
#[derive(Default)]
pub struct MockChainReader {
    registry: Mutex<Vec<Pool>>,
    live_tokens: Mutex<HashMap<Address, (Address, Address)>>,
    reserves: Mutex<HashMap<Address, Reserves>>,
    decimals: Mutex<HashMap<Address, u8>>,
    symbols: Mutex<HashMap<Address, String>>,
    balances: Mutex<HashMap<(Address, Address), U256>>,
    failures: Mutex<HashMap<Failure, u32>>,
    delay: Mutex<Option<Duration>>,
    entry_calls: AtomicUsize,
    reserve_calls: AtomicUsize,
}

impl MockChainReader {
    pub fn with_pools(pools: &[Pool]) -> Self {
        let reader = Self::default();
        for pool in pools {
            reader.push_pool(*pool);
        }
        reader
    }

    /// Registry of `count` pools, each pairing a distinct token with `token1`
    pub fn with_generated_pools(count: u64, token1: Address) -> Self {
        let reader = Self::default();
        for i in 0..count {
            reader.push_pool(Pool::new(indexed_addr(0xAA, i), indexed_addr(0xBB, i), token1));
        }
        reader
    }

    pub fn push_pool(&self, pool: Pool) {
        self.registry.lock().unwrap().push(pool);
    }

    /// Makes the chain report different tokens for `pool` than the registry recorded
    pub fn set_live_tokens(&self, pool: Address, tokens: (Address, Address)) {
        self.live_tokens.lock().unwrap().insert(pool, tokens);
    }

    pub fn set_reserves(&self, pool: Address, reserve0: u128, reserve1: u128) {
        self.reserves.lock().unwrap().insert(
            pool,
            Reserves::new(U256::from(reserve0), U256::from(reserve1), 1_700_000_000),
        );
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.decimals.lock().unwrap().insert(token, decimals);
    }

    pub fn set_symbol(&self, token: Address, symbol: &str) {
        self.symbols.lock().unwrap().insert(token, symbol.to_string());
    }

    pub fn set_balance(&self, token: Address, holder: Address, balance: u128) {
        self.balances
            .lock()
            .unwrap()
            .insert((token, holder), U256::from(balance));
    }

    /// The next `times` calls at `point` fail with a transient error
    pub fn fail(&self, point: Failure, times: u32) {
        self.failures.lock().unwrap().insert(point, times);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn entry_calls(&self) -> usize {
        self.entry_calls.load(Ordering::SeqCst)
    }

    pub fn reserve_calls(&self) -> usize {
        self.reserve_calls.load(Ordering::SeqCst)
    }

    fn check(&self, point: Failure) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&point) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(Error::transient("mock", format!("{point:?}"), "injected failure"));
            }
        }
        Ok(())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn pool(&self, address: Address) -> Option<Pool> {
        self.registry
            .lock()
            .unwrap()
            .iter()
            .find(|pool| pool.address == address)
            .copied()
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn registry_size(&self) -> Result<u64> {
        self.pause().await;
        Ok(self.registry.lock().unwrap().len() as u64)
    }

    async fn registry_entry_at(&self, index: u64) -> Result<Address> {
        self.entry_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check(Failure::Entry(index))?;

        let registry = self.registry.lock().unwrap();
        usize::try_from(index)
            .ok()
            .and_then(|i| registry.get(i))
            .map(|pool| pool.address)
            .ok_or_else(|| Error::validation("registry index", format!("{index} out of range")))
    }

    async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address)> {
        self.pause().await;
        self.check(Failure::Tokens(pool))?;

        if let Some(tokens) = self.live_tokens.lock().unwrap().get(&pool) {
            return Ok(*tokens);
        }
        self.pool(pool)
            .map(|p| (p.token0, p.token1))
            .ok_or_else(|| Error::transient("token0/token1", pool, "execution reverted"))
    }

    async fn pool_reserves(&self, pool: Address) -> Result<Reserves> {
        self.reserve_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check(Failure::Reserves(pool))?;

        Ok(self
            .reserves
            .lock()
            .unwrap()
            .get(&pool)
            .copied()
            .unwrap_or_else(|| Reserves::new(U256::ZERO, U256::ZERO, 0)))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        self.pause().await;
        self.check(Failure::Decimals(token))?;
        Ok(self.decimals.lock().unwrap().get(&token).copied().unwrap_or(18))
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        self.pause().await;
        Ok(self
            .symbols
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .unwrap_or_else(|| "UNKNOWN".to_string()))
    }

    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256> {
        self.pause().await;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(token, holder))
            .copied()
            .unwrap_or(U256::ZERO))
    }
}
