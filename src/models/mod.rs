pub mod address;
pub mod pool;
pub mod reserves;

pub use address::DbAddress;
pub use pool::{Pool, PoolRecord, PoolSide};
pub use reserves::{RankedPool, ReserveSnapshot, Reserves};
