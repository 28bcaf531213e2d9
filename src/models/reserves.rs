use alloy::primitives::{Address, U256};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw reserves as reported by a pair's `getReserves()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    pub reserve0: U256,
    pub reserve1: U256,
    /// `blockTimestampLast` of the pair, seconds since epoch
    pub block_timestamp_last: u32,
}

impl Reserves {
    pub const fn new(reserve0: U256, reserve1: U256, block_timestamp_last: u32) -> Self {
        Self {
            reserve0,
            reserve1,
            block_timestamp_last,
        }
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.block_timestamp_last), 0)
    }
}

/// Live reserves of one pool, read for a single ranking call and never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveSnapshot {
    pub pool: Address,
    pub raw_reserve0: U256,
    pub raw_reserve1: U256,
    pub decimals0: u8,
    pub decimals1: u8,
    pub observed_at: Option<DateTime<Utc>>,
}

impl ReserveSnapshot {
    pub fn new(pool: Address, reserves: Reserves, decimals0: u8, decimals1: u8) -> Self {
        Self {
            pool,
            raw_reserve0: reserves.reserve0,
            raw_reserve1: reserves.reserve1,
            decimals0,
            decimals1,
            observed_at: reserves.observed_at(),
        }
    }
}

/// A ranking result: one candidate pool and its normalized liquidity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedPool {
    pub address: Address,
    /// `target_reserve + reference_reserve`
    #[serde(with = "decimal_string")]
    pub score: BigDecimal,
    #[serde(with = "decimal_string")]
    pub target_reserve: BigDecimal,
    #[serde(with = "decimal_string")]
    pub reference_reserve: BigDecimal,
    pub observed_at: Option<DateTime<Utc>>,
}

mod decimal_string {
    use bigdecimal::BigDecimal;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        let mut trimmed = value.normalized();
        if trimmed.fractional_digit_count() < 0 {
            trimmed = trimmed.with_scale(0);
        }
        serializer.collect_str(&trimmed)
    }
}
