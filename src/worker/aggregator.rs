use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Context;
use async_trait::async_trait;
use futures::future::try_join_all;
use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    chain::PoolInfo,
    db::{
        models::{PointsCommit, PoolPoints, PoolWeight, UserPoints},
        PointsStore,
    },
    error::SyncError,
    oracle::PriceOracle,
    worker::{batcher::EventHandler, events::BatchEvent},
};

/// Turns a flushed batch into points deltas and commits them together with
/// the checkpoint.
pub struct PointsAggregator {
    store: Arc<dyn PointsStore>,
    oracle: PriceOracle,
}

impl PointsAggregator {
    pub fn new(store: Arc<dyn PointsStore>, oracle: PriceOracle) -> Self {
        Self {
            store,
            oracle,
        }
    }

    async fn build_commit(&self, batch: &BatchEvent) -> anyhow::Result<PointsCommit> {
        // Weights are read per batch so operator edits apply without a restart
        let weights: FxHashMap<Address, PoolWeight> = self
            .store
            .get_pool_weights()
            .await
            .context("Failed to load pool weights")?
            .into_iter()
            .map(|w| (w.pool, w))
            .collect();

        let weight = |pool: Address| -> Result<&PoolWeight, SyncError> {
            weights.get(&pool).ok_or(SyncError::MissingPoolWeight(pool))
        };

        let mut users: FxHashMap<Address, UserPoints> = FxHashMap::default();
        let mut pools: FxHashMap<Address, PoolPoints> = FxHashMap::default();

        for trade in &batch.trades {
            let points =
                (&trade.usd_value0 + &trade.usd_value1) * &weight(trade.pool.address)?.trade_weight;

            users
                .entry(trade.user)
                .or_insert_with(|| UserPoints::new(trade.user))
                .trade_points += &points;
            pool_entry(&mut pools, &trade.pool).trade_points += points;
        }

        for liquidity in &batch.liquidities {
            let points = (&liquidity.usd_value0_per_second + &liquidity.usd_value1_per_second)
                * &weight(liquidity.pool.address)?.liquidity_weight;

            users
                .entry(liquidity.user)
                .or_insert_with(|| UserPoints::new(liquidity.user))
                .liquidity_points += &points;
            pool_entry(&mut pools, &liquidity.pool).liquidity_points += points;
        }

        let block = batch.window.max_block;
        let tvls = try_join_all(pools.values().map(|p| {
            let pool = p.pool.clone();
            async move {
                self.oracle
                    .pool_tvl(&pool, Some(block))
                    .await
                    .with_context(|| format!("Failed to compute TVL of pool {}", pool.label()))
                    .map(|tvl| (pool.address, tvl))
            }
        }))
        .await?;

        for (pool, tvl) in tvls {
            if let Some(points) = pools.get_mut(&pool) {
                debug!("[AGGREGATOR] TVL of {} at block {}: {}", points.pool.label(), block, tvl);
                points.tvl = tvl;
            }
        }

        let mut users: Vec<UserPoints> = users.into_values().collect();
        users.sort_by_key(|u| u.user);

        let mut pools: Vec<PoolPoints> = pools.into_values().collect();
        pools.sort_by_key(|p| p.pool.address);

        Ok(PointsCommit {
            timestamp: batch.window.timestamp,
            users,
            pools,
        })
    }
}

fn pool_entry<'a>(
    pools: &'a mut FxHashMap<Address, PoolPoints>,
    pool: &Arc<PoolInfo>,
) -> &'a mut PoolPoints {
    pools
        .entry(pool.address)
        .or_insert_with(|| PoolPoints::new(pool.clone()))
}

#[async_trait]
impl EventHandler for PointsAggregator {
    async fn on_batch(&self, batch: &BatchEvent) -> anyhow::Result<()> {
        let commit = self.build_commit(batch).await?;

        self.store.commit_points(&commit).await.with_context(|| {
            format!("Failed to commit points of window {}", batch.window.timestamp)
        })
    }
}
