use std::hash::{Hash, Hasher};

use alloy::primitives::Address;
use diesel::{Insertable, Queryable, Selectable};
use serde::Serialize;

use super::address::DbAddress;

/// A pool discovered in the factory registry.
///
/// Constituent tokens never change once a pool is deployed, so a `Pool` is immutable.
#[derive(Debug, Clone, Copy, Eq, Serialize)]
pub struct Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
}

/// Which side of a pool a token sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSide {
    Token0,
    Token1,
}

/// Two pools are equal if they have the same address
impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

/// Hash the pool by its address
impl Hash for Pool {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl Pool {
    pub const fn new(address: Address, token0: Address, token1: Address) -> Self {
        Self {
            address,
            token0,
            token1,
        }
    }

    /// Whether `{token0, token1} == {a, b}` as unordered sets.
    pub fn has_pair(&self, a: Address, b: Address) -> bool {
        (self.token0 == a && self.token1 == b) || (self.token0 == b && self.token1 == a)
    }

    pub fn side_of(&self, token: Address) -> Option<PoolSide> {
        if self.token0 == token {
            Some(PoolSide::Token0)
        } else if self.token1 == token {
            Some(PoolSide::Token1)
        } else {
            None
        }
    }
}

/// Row of the `pools` table
#[derive(Queryable, Selectable, Insertable, Debug, Clone, Copy)]
#[diesel(table_name = crate::schemas::pools)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PoolRecord {
    pub address: DbAddress,
    pub token0: DbAddress,
    pub token1: DbAddress,
}

impl From<PoolRecord> for Pool {
    fn from(record: PoolRecord) -> Self {
        Self::new(record.address.value, record.token0.value, record.token1.value)
    }
}

impl From<&Pool> for PoolRecord {
    fn from(pool: &Pool) -> Self {
        Self {
            address: pool.address.into(),
            token0: pool.token0.into(),
            token1: pool.token1.into(),
        }
    }
}
