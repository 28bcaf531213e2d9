use std::cmp::Ordering;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use derive_more::Display;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};

use crate::catalog::PoolCatalog;
use crate::chain::ChainReader;
use crate::errors::{Error, Result};
use crate::models::{Pool, PoolSide, RankedPool, ReserveSnapshot};
use crate::normalize::{check_decimals, normalize};

/// What to do with a candidate whose chain reads fail after retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum RankFailurePolicy {
    /// Leave the candidate out of the result and log it
    #[default]
    #[display("skip")]
    Skip,
    /// Fail the whole ranking call
    #[display("abort")]
    Abort,
}

impl FromStr for RankFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(Error::validation(
                "failure policy",
                format!("{other:?}, expected \"skip\" or \"abort\""),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankSettings {
    /// Maximum candidates read at once
    pub concurrency: usize,
    pub failure_policy: RankFailurePolicy,
    /// Re-read each candidate's tokens and compare them with the catalog
    pub verify_tokens: bool,
    /// Deadline for a whole `rank_pools` call
    pub timeout: Option<Duration>,
}

impl Default for RankSettings {
    fn default() -> Self {
        Self {
            concurrency: 16,
            failure_policy: RankFailurePolicy::Skip,
            verify_tokens: false,
            timeout: None,
        }
    }
}

/// Ranks the catalog's pools for a token pair by live, decimal-normalized liquidity.
pub struct PoolRanker<R> {
    reader: R,
    catalog: PoolCatalog,
    settings: RankSettings,
}

impl<R: ChainReader> PoolRanker<R> {
    pub const fn new(reader: R, catalog: PoolCatalog, settings: RankSettings) -> Self {
        Self {
            reader,
            catalog,
            settings,
        }
    }

    /// The `top_k` deepest pools pairing `target` with `reference`.
    ///
    /// # Arguments
    /// * `target` - Token being looked up
    /// * `reference` - Quote token, usually WETH
    /// * `top_k` - Maximum number of pools returned
    ///
    /// # Returns
    /// Pools sorted by `score` descending, ties by ascending address. No candidates in the
    /// catalog gives an empty vector.
    ///
    /// # Errors
    /// * `Error::Validation` for `top_k == 0`, equal or zero token addresses, or token decimals
    ///   above 36
    /// * `Error::DataConsistency` if a candidate does not hold both tokens
    /// * `Error::TransientChain` if the token decimals cannot be read, or a candidate's reads
    ///   fail under [`RankFailurePolicy::Abort`]
    /// * `Error::TimedOut` if the configured deadline passes first
    pub async fn rank_pools(
        &self,
        target: Address,
        reference: Address,
        top_k: usize,
    ) -> Result<Vec<RankedPool>> {
        validate_query(target, reference, top_k)?;

        let ranking = self.rank(target, reference, top_k);
        match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, ranking)
                .await
                .map_err(|_| Error::TimedOut { after: limit })?,
            None => ranking.await,
        }
    }

    async fn rank(
        &self,
        target: Address,
        reference: Address,
        top_k: usize,
    ) -> Result<Vec<RankedPool>> {
        let candidates = self
            .catalog
            .blocking(move |catalog| catalog.find_by_token_pair(target, reference))
            .await?;
        if candidates.is_empty() {
            info!("rank::rank_pools: No pools pair {target} with {reference}");
            return Ok(Vec::new());
        }
        debug!(
            "rank::rank_pools: {} candidates for {target}/{reference}",
            candidates.len()
        );

        let target_decimals = self.decimals(target).await?;
        let reference_decimals = self.decimals(reference).await?;
        let query = &Query {
            target,
            reference,
            target_decimals,
            reference_decimals,
        };

        let outcomes: Vec<(Pool, Result<RankedPool>)> = stream::iter(candidates)
            .map(|pool| async move { (pool, self.score(pool, query).await) })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut ranked = Vec::with_capacity(outcomes.len());
        for (pool, outcome) in outcomes {
            match outcome {
                Ok(entry) => ranked.push(entry),
                Err(e) if e.is_transient() && self.skips_failures() => {
                    warn!("rank::rank_pools: Skipping pool {}: {e}", pool.address);
                }
                Err(e) => return Err(e),
            }
        }

        sort_ranked(&mut ranked);
        ranked.truncate(top_k);
        Ok(ranked)
    }

    fn skips_failures(&self) -> bool {
        self.settings.failure_policy == RankFailurePolicy::Skip
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        let decimals = self.reader.token_decimals(token).await?;
        check_decimals(decimals)?;
        Ok(decimals)
    }

    async fn score(&self, pool: Pool, query: &Query) -> Result<RankedPool> {
        let side = match pool.side_of(query.target) {
            Some(side) if pool.has_pair(query.target, query.reference) => side,
            _ => {
                return Err(Error::inconsistent(
                    pool.address,
                    format!(
                        "stored pair ({}, {}) does not match query ({}, {})",
                        pool.token0, pool.token1, query.target, query.reference
                    ),
                ))
            }
        };

        if self.settings.verify_tokens {
            let live = self.reader.pool_tokens(pool.address).await?;
            if live != (pool.token0, pool.token1) {
                return Err(Error::inconsistent(
                    pool.address,
                    format!(
                        "catalog has ({}, {}), chain reports ({}, {})",
                        pool.token0, pool.token1, live.0, live.1
                    ),
                ));
            }
        }

        let reserves = self.reader.pool_reserves(pool.address).await?;
        let snapshot = match side {
            PoolSide::Token0 => ReserveSnapshot::new(
                pool.address,
                reserves,
                query.target_decimals,
                query.reference_decimals,
            ),
            PoolSide::Token1 => ReserveSnapshot::new(
                pool.address,
                reserves,
                query.reference_decimals,
                query.target_decimals,
            ),
        };

        let reserve0 = normalize(snapshot.raw_reserve0, snapshot.decimals0)?;
        let reserve1 = normalize(snapshot.raw_reserve1, snapshot.decimals1)?;
        let (target_reserve, reference_reserve) = match side {
            PoolSide::Token0 => (reserve0, reserve1),
            PoolSide::Token1 => (reserve1, reserve0),
        };

        Ok(RankedPool {
            address: pool.address,
            score: &target_reserve + &reference_reserve,
            target_reserve,
            reference_reserve,
            observed_at: snapshot.observed_at,
        })
    }
}

struct Query {
    target: Address,
    reference: Address,
    target_decimals: u8,
    reference_decimals: u8,
}

fn validate_query(target: Address, reference: Address, top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(Error::validation("top_k", "must be at least 1"));
    }
    if target.is_zero() {
        return Err(Error::validation("target token", "zero address"));
    }
    if reference.is_zero() {
        return Err(Error::validation("reference token", "zero address"));
    }
    if target == reference {
        return Err(Error::validation(
            "target token",
            format!("{target} is also the reference token"),
        ));
    }
    Ok(())
}

/// Deepest first; equal scores in ascending address order
pub fn sort_ranked(ranked: &mut [RankedPool]) {
    ranked.sort_by(compare_ranked);
}

fn compare_ranked(a: &RankedPool, b: &RankedPool) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.address.cmp(&b.address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::test_helpers::{addr, temp_catalog, Failure, MockChainReader};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;
    use std::sync::Arc;
    use tempfile::TempDir;

    const E6: u128 = 1_000_000;
    const E18: u128 = 1_000_000_000_000_000_000;

    fn token_a() -> Address {
        addr(0xA0)
    }

    fn weth() -> Address {
        addr(0xEE)
    }

    fn decimal(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    /// Registry of three pools: two A/WETH pools (one with reversed token order) worth 150 and
    /// 90, and one unrelated A/X pool. A has 6 decimals, WETH 18.
    fn scenario() -> (TempDir, PoolCatalog, Arc<MockChainReader>) {
        let pools = [
            Pool::new(addr(1), token_a(), weth()),
            Pool::new(addr(2), weth(), token_a()),
            Pool::new(addr(3), token_a(), addr(0x55)),
        ];
        let reader = Arc::new(MockChainReader::with_pools(&pools));
        reader.set_decimals(token_a(), 6);
        reader.set_decimals(weth(), 18);
        reader.set_reserves(addr(1), 100 * E6, 50 * E18);
        reader.set_reserves(addr(2), 40 * E18, 50 * E6);
        reader.set_reserves(addr(3), 1_000_000 * E6, 1_000_000 * E18);

        let (dir, catalog) = temp_catalog();
        for pool in &pools {
            catalog.insert(pool).unwrap();
        }
        (dir, catalog, reader)
    }

    fn ranker(
        reader: Arc<MockChainReader>,
        catalog: PoolCatalog,
        failure_policy: RankFailurePolicy,
    ) -> PoolRanker<Arc<MockChainReader>> {
        PoolRanker::new(
            reader,
            catalog,
            RankSettings {
                concurrency: 4,
                failure_policy,
                verify_tokens: false,
                timeout: None,
            },
        )
    }

    #[tokio::test]
    async fn test_rank_top_two() {
        let (_dir, catalog, reader) = scenario();
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let ranked = ranker.rank_pools(token_a(), weth(), 2).await.unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].address, addr(1));
        assert_eq!(ranked[0].score, decimal("150"));
        assert_eq!(ranked[1].address, addr(2));
        assert_eq!(ranked[1].score, decimal("90"));
    }

    #[tokio::test]
    async fn test_rank_top_one() {
        let (_dir, catalog, reader) = scenario();
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let ranked = ranker.rank_pools(token_a(), weth(), 1).await.unwrap();

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address, addr(1));
    }

    #[tokio::test]
    async fn test_reversed_pool_pairs_reserves_with_right_decimals() {
        let (_dir, catalog, reader) = scenario();
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        // addr(2) holds WETH as token0 and A as token1
        let ranked = ranker.rank_pools(token_a(), weth(), 5).await.unwrap();
        let reversed = ranked.iter().find(|r| r.address == addr(2)).unwrap();

        assert_eq!(reversed.target_reserve, decimal("50"));
        assert_eq!(reversed.reference_reserve, decimal("40"));
        assert!(reversed.observed_at.is_some());
    }

    #[tokio::test]
    async fn test_query_order_does_not_change_candidates() {
        let (_dir, catalog, reader) = scenario();
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let forward = ranker.rank_pools(token_a(), weth(), 5).await.unwrap();
        let backward = ranker.rank_pools(weth(), token_a(), 5).await.unwrap();

        let addresses = |ranked: &[RankedPool]| ranked.iter().map(|r| r.address).collect::<Vec<_>>();
        assert_eq!(addresses(&forward), addresses(&backward));
        assert_eq!(backward[0].target_reserve, decimal("50"));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_empty_result() {
        let (_dir, catalog) = temp_catalog();
        let reader = Arc::new(MockChainReader::default());
        let ranker = ranker(reader.clone(), catalog, RankFailurePolicy::Abort);

        let ranked = ranker.rank_pools(token_a(), weth(), 2).await.unwrap();

        assert!(ranked.is_empty());
        assert_eq!(reader.reserve_calls(), 0);
    }

    #[tokio::test]
    async fn test_equal_scores_ordered_by_address() {
        let pools = [
            Pool::new(addr(9), token_a(), weth()),
            Pool::new(addr(3), token_a(), weth()),
            Pool::new(addr(6), weth(), token_a()),
        ];
        let reader = Arc::new(MockChainReader::with_pools(&pools));
        reader.set_reserves(addr(9), 10 * E18, 10 * E18);
        reader.set_reserves(addr(3), 10 * E18, 10 * E18);
        reader.set_reserves(addr(6), 5 * E18, 15 * E18);
        let (_dir, catalog) = temp_catalog();
        for pool in &pools {
            catalog.insert(pool).unwrap();
        }
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let ranked = ranker.rank_pools(token_a(), weth(), 3).await.unwrap();
        let addresses: Vec<_> = ranked.iter().map(|r| r.address).collect();

        assert_eq!(addresses, vec![addr(3), addr(6), addr(9)]);
    }

    #[tokio::test]
    async fn test_ranking_is_deterministic() {
        let (_dir, catalog, reader) = scenario();
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let first = ranker.rank_pools(token_a(), weth(), 5).await.unwrap();
        for _ in 0..5 {
            assert_eq!(ranker.rank_pools(token_a(), weth(), 5).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_skip_policy_omits_failing_candidate() {
        let (_dir, catalog, reader) = scenario();
        reader.fail(Failure::Reserves(addr(1)), u32::MAX);
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let ranked = ranker.rank_pools(token_a(), weth(), 2).await.unwrap();

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address, addr(2));
    }

    #[tokio::test]
    async fn test_abort_policy_fails_whole_call() {
        let (_dir, catalog, reader) = scenario();
        reader.fail(Failure::Reserves(addr(1)), u32::MAX);
        let ranker = ranker(reader, catalog, RankFailurePolicy::Abort);

        let err = ranker.rank_pools(token_a(), weth(), 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientChain);
    }

    #[tokio::test]
    async fn test_unreadable_decimals_fail_the_call() {
        let (_dir, catalog, reader) = scenario();
        reader.fail(Failure::Decimals(weth()), u32::MAX);
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let err = ranker.rank_pools(token_a(), weth(), 2).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_live_token_mismatch_is_reported() {
        let (_dir, catalog, reader) = scenario();
        reader.set_live_tokens(addr(2), (weth(), addr(0x77)));
        let ranker = PoolRanker::new(
            reader,
            catalog,
            RankSettings {
                concurrency: 4,
                failure_policy: RankFailurePolicy::Skip,
                verify_tokens: true,
                timeout: None,
            },
        );

        let err = ranker.rank_pools(token_a(), weth(), 2).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DataConsistency);
        assert!(err.to_string().contains(&addr(2).to_string()));
    }

    #[tokio::test]
    async fn test_rejects_invalid_queries() {
        let (_dir, catalog, reader) = scenario();
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        for (target, reference, top_k) in [
            (token_a(), weth(), 0),
            (token_a(), token_a(), 2),
            (Address::ZERO, weth(), 2),
            (token_a(), Address::ZERO, 2),
        ] {
            let err = ranker.rank_pools(target, reference, top_k).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn test_rejects_excessive_decimals() {
        let (_dir, catalog, reader) = scenario();
        reader.set_decimals(token_a(), 40);
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);

        let err = ranker.rank_pools(token_a(), weth(), 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_slow_chain_hits_ranking_deadline() {
        let (_dir, catalog, reader) = scenario();
        reader.set_delay(Duration::from_millis(300));
        let ranker = PoolRanker::new(
            reader,
            catalog,
            RankSettings {
                timeout: Some(Duration::from_millis(50)),
                ..RankSettings::default()
            },
        );

        let started = std::time::Instant::now();
        let err = ranker.rank_pools(token_a(), weth(), 2).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_stored_pair_not_matching_query_is_inconsistent() {
        let pool = Pool::new(addr(4), token_a(), addr(0x55));
        let reader = Arc::new(MockChainReader::with_pools(&[pool]));
        let (_dir, catalog) = temp_catalog();
        let ranker = ranker(reader, catalog, RankFailurePolicy::Skip);
        let query = Query {
            target: token_a(),
            reference: weth(),
            target_decimals: 6,
            reference_decimals: 18,
        };

        let err = ranker.score(pool, &query).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataConsistency);
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!("skip".parse::<RankFailurePolicy>().unwrap(), RankFailurePolicy::Skip);
        assert_eq!(" Abort ".parse::<RankFailurePolicy>().unwrap(), RankFailurePolicy::Abort);
        assert!("retry".parse::<RankFailurePolicy>().is_err());
        assert_eq!(RankFailurePolicy::Abort.to_string(), "abort");
    }
}
