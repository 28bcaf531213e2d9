use std::ops::Range;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use tokio::sync::watch;

use crate::catalog::PoolCatalog;
use crate::chain::ChainReader;
use crate::errors::{Error, Result};
use crate::models::Pool;

/// Tuning for [`PoolScanner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Registry indices resolved and committed together
    pub batch_size: usize,
    /// Maximum chain reads in flight
    pub concurrency: usize,
    /// Deadline for a whole `scan` call
    pub timeout: Option<Duration>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            concurrency: 16,
            timeout: None,
        }
    }
}

/// What a completed scan did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub registry_size: u64,
    pub start_cursor: u64,
    pub end_cursor: u64,
    /// Pools newly stored; replays of known pools are not counted
    pub inserted: usize,
}

impl ScanReport {
    pub const fn scanned(&self) -> u64 {
        self.end_cursor - self.start_cursor
    }
}

/// Walks the factory registry from the catalog cursor to the end, storing every pool.
///
/// Indices of a batch are resolved concurrently, then committed in index order together with
/// the cursor. Only the successful prefix of a batch is committed, so the cursor never passes
/// an index that failed, and an interrupted scan resumes exactly where it stopped.
pub struct PoolScanner<R> {
    reader: R,
    catalog: PoolCatalog,
    settings: ScanSettings,
}

impl<R: ChainReader> PoolScanner<R> {
    pub const fn new(reader: R, catalog: PoolCatalog, settings: ScanSettings) -> Self {
        Self {
            reader,
            catalog,
            settings,
        }
    }

    /// Scans until the registry end is reached.
    ///
    /// # Errors
    /// * `Error::Scan` if an index could not be resolved; earlier indices are committed
    /// * `Error::TimedOut` if the configured deadline passes
    /// * If the catalog cannot be read or written
    pub async fn scan(&self) -> Result<ScanReport> {
        let (_never, cancel) = watch::channel(false);
        self.scan_until(cancel).await
    }

    /// Like [`scan`](Self::scan), but stops with `Error::Cancelled` once `cancel` reads `true`.
    ///
    /// Cancellation and timeout abandon in-flight reads only; the cursor stays at the last
    /// committed batch.
    ///
    /// # Errors
    /// See [`scan`](Self::scan)
    pub async fn scan_until(&self, cancel: watch::Receiver<bool>) -> Result<ScanReport> {
        let run = self.run(cancel);
        match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| Error::TimedOut { after: limit })?,
            None => run.await,
        }
    }

    /// Keeps the catalog in step with the registry, scanning again every `interval`.
    ///
    /// Failed scans are logged and retried on the next round; returns once `cancel` fires.
    ///
    /// # Errors
    /// * If the catalog rejects a commit for a reason other than a chain failure
    pub async fn follow(&self, interval: Duration, mut cancel: watch::Receiver<bool>) -> Result<()> {
        info!("sync::factory_pairs: Following registry every {interval:?}");

        loop {
            match self.scan_until(cancel.clone()).await {
                Ok(report) if report.inserted > 0 => info!(
                    "sync::factory_pairs: Stored {} new pools, cursor at {}",
                    report.inserted, report.end_cursor
                ),
                Ok(_) => {}
                Err(Error::Cancelled) => return Ok(()),
                Err(e) if e.is_transient() || matches!(e, Error::TimedOut { .. }) => {
                    warn!("sync::factory_pairs: Scan round failed, retrying next round: {e}");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                () = cancelled(&mut cancel) => return Ok(()),
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn run(&self, mut cancel: watch::Receiver<bool>) -> Result<ScanReport> {
        let registry_size = self.reader.registry_size().await?;
        let start_cursor = self.catalog.blocking(PoolCatalog::cursor).await?;

        if start_cursor > registry_size {
            error!(
                "sync::factory_pairs: Cursor {start_cursor} is past registry size {registry_size}, wrong factory?"
            );
            return Err(Error::CursorConflict {
                expected: registry_size,
                stored: start_cursor,
            });
        }

        info!(
            "sync::factory_pairs: Registry has {registry_size} pools, resuming at {start_cursor}"
        );

        let batch_size = self.settings.batch_size.max(1) as u64;
        let mut cursor = start_cursor;
        let mut inserted = 0;

        while cursor < registry_size {
            if *cancel.borrow() {
                return Err(Error::Cancelled);
            }

            let end = registry_size.min(cursor + batch_size);
            let resolved = tokio::select! {
                biased;
                () = cancelled(&mut cancel) => return Err(Error::Cancelled),
                resolved = self.resolve_range(cursor..end) => resolved,
            };

            let (confirmed, failure) = confirmed_prefix(resolved);
            let confirmed_len = confirmed.len() as u64;
            let expected = cursor;
            inserted += self
                .catalog
                .blocking(move |catalog| catalog.commit_batch(expected, &confirmed))
                .await?;
            cursor += confirmed_len;

            info!("sync::factory_pairs: Scanned {cursor}/{registry_size}");

            if let Some((index, source)) = failure {
                error!("sync::factory_pairs: Failed to resolve registry index {index}: {source}");
                return Err(Error::Scan {
                    index,
                    committed: cursor,
                    source: Box::new(source),
                });
            }
        }

        Ok(ScanReport {
            registry_size,
            start_cursor,
            end_cursor: cursor,
            inserted,
        })
    }

    /// Resolves every index of `range`, results in index order whatever the completion order.
    async fn resolve_range(&self, range: Range<u64>) -> Vec<(u64, Result<Pool>)> {
        stream::iter(range)
            .map(|index| async move { (index, self.resolve(index).await) })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }

    async fn resolve(&self, index: u64) -> Result<Pool> {
        let address = self.reader.registry_entry_at(index).await?;
        let (token0, token1) = self.reader.pool_tokens(address).await?;
        Ok(Pool::new(address, token0, token1))
    }
}

/// Splits resolved indices into the pools before the first failure and that failure.
fn confirmed_prefix(resolved: Vec<(u64, Result<Pool>)>) -> (Vec<Pool>, Option<(u64, Error)>) {
    let mut confirmed = Vec::with_capacity(resolved.len());
    for (index, outcome) in resolved {
        match outcome {
            Ok(pool) => confirmed.push(pool),
            Err(e) => return (confirmed, Some((index, e))),
        }
    }
    (confirmed, None)
}

/// Resolves once `cancel` reads `true`; never, if its sender is gone.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
