use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::DynProvider;
use clap::{Parser, Subcommand};
use eyre::Result;
use log::{info, warn, LevelFilter};
use tokio::sync::watch;

use lpscan::catalog::PoolCatalog;
use lpscan::chain::{normalized_balance, AlloyChainReader, ChainReader, RetryingChainReader};
use lpscan::config::Config;
use lpscan::rank::PoolRanker;
use lpscan::sync::PoolScanner;
use lpscan::utils::logger::setup_logger;
use lpscan::utils::providers::create_provider;
use lpscan::Error;

type Reader = RetryingChainReader<AlloyChainReader<DynProvider>>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Maximum log level
    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog schema
    Init,
    /// Index new pools from the factory registry
    Scan {
        /// Keep polling the registry after catching up
        #[arg(long)]
        follow: bool,
        /// Seconds between polls with --follow
        #[arg(long, default_value_t = 12)]
        interval_secs: u64,
    },
    /// Print the number of indexed pools
    Count,
    /// Rank the pools pairing a token with the reference token
    Rank {
        token: Address,
        /// Quote token, defaults to REFERENCE_TOKEN
        #[arg(long)]
        reference: Option<Address>,
        #[arg(long, default_value_t = 2)]
        top: usize,
        /// Print the ranking as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a token's symbol
    Symbol { token: Address },
    /// Print a holder's balance of a token, in whole tokens
    Balance { token: Address, holder: Address },
}

async fn connect(config: &Config) -> Result<Reader> {
    let provider = create_provider(&config.rpc_url).await?;
    Ok(RetryingChainReader::new(
        AlloyChainReader::new(provider, config.factory),
        config.retry,
    ))
}

/// Flips to `true` on Ctrl-C
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (cancel_tx, cancel) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current batch");
            let _ = cancel_tx.send(true);
        }
    });
    cancel
}

async fn scan(config: &Config, catalog: &PoolCatalog, follow: bool, interval: Duration) -> Result<()> {
    let scanner = PoolScanner::new(connect(config).await?, catalog.clone(), config.scan);
    let cancel = cancel_on_ctrl_c();

    if follow {
        return Ok(scanner.follow(interval, cancel).await?);
    }

    match scanner.scan_until(cancel).await {
        Ok(report) => info!(
            "Scanned {} registry entries, {} new pools, {} pools indexed",
            report.scanned(),
            report.inserted,
            catalog.count()?
        ),
        Err(Error::Cancelled) => info!("Scan stopped, resume from index {}", catalog.cursor()?),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn rank(
    config: &Config,
    catalog: &PoolCatalog,
    token: Address,
    reference: Address,
    top: usize,
    json: bool,
) -> Result<()> {
    let ranker = PoolRanker::new(connect(config).await?, catalog.clone(), config.rank);
    let ranked = ranker.rank_pools(token, reference, top).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else if ranked.is_empty() {
        println!("No pools pair {token} with {reference}");
    } else {
        for (position, pool) in ranked.iter().enumerate() {
            println!(
                "{}. {} score {} ({} + {})",
                position + 1,
                pool.address,
                pool.score.normalized(),
                pool.target_reserve.normalized(),
                pool.reference_reserve.normalized()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logger(cli.log_level)?;

    let config = Config::from_env()?;
    let catalog = PoolCatalog::open(&config.database_url, config.db_pool_size)?;
    catalog.initialize()?;

    match cli.command {
        Commands::Init => info!(
            "Catalog ready at {}: {} pools, cursor {}",
            config.database_url,
            catalog.count()?,
            catalog.cursor()?
        ),
        Commands::Scan {
            follow,
            interval_secs,
        } => scan(&config, &catalog, follow, Duration::from_secs(interval_secs)).await?,
        Commands::Count => println!("{}", catalog.count()?),
        Commands::Rank {
            token,
            reference,
            top,
            json,
        } => {
            let reference = reference.unwrap_or(config.reference_token);
            rank(&config, &catalog, token, reference, top, json).await?;
        }
        Commands::Symbol { token } => {
            let reader = connect(&config).await?;
            println!("{}", reader.token_symbol(token).await?);
        }
        Commands::Balance { token, holder } => {
            let reader = connect(&config).await?;
            println!("{}", normalized_balance(&reader, token, holder).await?.normalized());
        }
    }

    catalog.close();
    Ok(())
}
