use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use url::Url;

use crate::chain::RetryPolicy;
use crate::errors::{Error, Result};
use crate::rank::{RankFailurePolicy, RankSettings};
use crate::sync::ScanSettings;
use crate::utils::constants::{UNISWAP_V2_FACTORY, WETH};

/// Configuration struct for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rpc_url: Url,
    /// Registry the scanner walks
    pub factory: Address,
    /// Default quote token for rankings
    pub reference_token: Address,
    pub db_pool_size: u32,
    pub scan: ScanSettings,
    pub rank: RankSettings,
    pub retry: RetryPolicy,
}

/// Local node, as run for development
const DEFAULT_RPC_URL: &str = "http://localhost:8545";
const DEFAULT_DATABASE_URL: &str = "pools.db";
const DEFAULT_DB_POOL_SIZE: u32 = 8;

impl Config {
    /// Load configuration from environment variables, after reading `.env` if present
    ///
    /// # Environment Variables:
    /// - `DATABASE_URL`: `SQLite` database path
    /// - `RPC_URL`: Ethereum HTTP RPC endpoint URL
    /// - `FACTORY_ADDRESS`: UniswapV2-style factory to index
    /// - `REFERENCE_TOKEN`: Quote token for `rank`
    /// - `SCAN_BATCH_SIZE`, `SCAN_CONCURRENCY`, `SCAN_TIMEOUT_SECS`: scanner tuning
    /// - `RPC_TIMEOUT_SECS`, `RPC_MAX_RETRIES`, `RPC_BACKOFF_MS`: per-call retry policy
    /// - `RANK_FAILURE_POLICY`: `skip` or `abort`
    /// - `RANK_VERIFY_TOKENS`: re-read candidate tokens before ranking
    /// - `RANK_TIMEOUT_SECS`: deadline for one ranking
    /// - `DB_POOL_SIZE`: catalog connection pool size
    ///
    /// # Returns
    /// Returns `Config` with values from environment variables or defaults
    ///
    /// # Errors
    /// * `Error::Config` if a variable is set but cannot be parsed or is out of range
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`
    ///
    /// # Errors
    /// See [`from_env`](Self::from_env)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());

        let default_scan = ScanSettings::default();
        let scan = ScanSettings {
            batch_size: positive(
                parse(&var, "SCAN_BATCH_SIZE", default_scan.batch_size)?,
                "SCAN_BATCH_SIZE",
            )?,
            concurrency: positive(
                parse(&var, "SCAN_CONCURRENCY", default_scan.concurrency)?,
                "SCAN_CONCURRENCY",
            )?,
            timeout: var("SCAN_TIMEOUT_SECS")
                .map(|_| parse(&var, "SCAN_TIMEOUT_SECS", 0u64))
                .transpose()?
                .map(Duration::from_secs),
        };

        let failure_policy = match var("RANK_FAILURE_POLICY") {
            Some(value) => value.parse::<RankFailurePolicy>().map_err(|e| Error::Config {
                variable: "RANK_FAILURE_POLICY",
                message: e.to_string(),
            })?,
            None => RankFailurePolicy::default(),
        };

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse(&var, "RPC_MAX_RETRIES", default_retry.max_retries)?,
            initial_backoff: Duration::from_millis(parse(
                &var,
                "RPC_BACKOFF_MS",
                u64::try_from(default_retry.initial_backoff.as_millis()).unwrap_or(u64::MAX),
            )?),
            call_timeout: Duration::from_secs(positive(
                parse(&var, "RPC_TIMEOUT_SECS", default_retry.call_timeout.as_secs())?,
                "RPC_TIMEOUT_SECS",
            )?),
        };

        let rpc_url = var("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let rpc_url = Url::parse(rpc_url.trim()).map_err(|e| Error::Config {
            variable: "RPC_URL",
            message: format!("{rpc_url:?}: {e}"),
        })?;

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            rpc_url,
            factory: parse(&var, "FACTORY_ADDRESS", UNISWAP_V2_FACTORY)?,
            reference_token: parse(&var, "REFERENCE_TOKEN", WETH)?,
            db_pool_size: positive(
                parse(&var, "DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE)?,
                "DB_POOL_SIZE",
            )?,
            scan,
            rank: RankSettings {
                concurrency: scan.concurrency,
                failure_policy,
                verify_tokens: parse(&var, "RANK_VERIFY_TOKENS", false)?,
                timeout: var("RANK_TIMEOUT_SECS")
                    .map(|_| parse(&var, "RANK_TIMEOUT_SECS", 0u64))
                    .transpose()?
                    .map(Duration::from_secs),
            },
            retry,
        })
    }
}

fn parse<T>(
    var: impl Fn(&'static str) -> Option<String>,
    variable: &'static str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    var(variable).map_or(Ok(default), |value| {
        value.trim().parse().map_err(|e: T::Err| Error::Config {
            variable,
            message: format!("{value:?}: {e}"),
        })
    })
}

fn positive<T: PartialEq + Default>(value: T, variable: &'static str) -> Result<T> {
    if value == T::default() {
        return Err(Error::Config {
            variable,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
