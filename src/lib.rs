pub mod catalog;
pub mod chain;
pub mod config;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod rank;
pub mod schemas;
pub mod sync;
pub mod trade;
pub mod utils;

#[cfg(test)]
mod test_helpers;

pub use errors::{Error, ErrorKind, Result};
