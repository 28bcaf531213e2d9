pub mod factory_pairs;

pub use factory_pairs::{PoolScanner, ScanReport, ScanSettings};
