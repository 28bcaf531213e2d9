use alloy::primitives::{address, Address};

// Ethereum mainnet addresses
pub const WETH: Address = address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const UNISWAP_V2_FACTORY: Address = address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");

/// Largest token decimals exponent the normalizer accepts
pub const MAX_DECIMALS: u8 = 36;
