use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Context;
use log::debug;
use moka::future::Cache;

use crate::chain::{ChainCaller, PoolInfo, TokenInfo};

const TOKEN_CACHE_CAPACITY: u64 = 10_000;
const POOL_CACHE_CAPACITY: u64 = 10_000;

/// Memoizing store for immutable on-chain facts.
///
/// Entries never expire: token metadata and pool composition do not change
/// once deployed. Lookups are get-then-fetch-then-insert, so two tasks racing
/// on the same key both fetch and the second insert overwrites the first with
/// an identical value.
#[derive(Clone)]
pub struct MetadataCache {
    caller: Arc<dyn ChainCaller>,
    tokens: Cache<Address, TokenInfo>,
    pools: Cache<Address, PoolInfo>,
}

impl MetadataCache {
    pub fn new(caller: Arc<dyn ChainCaller>) -> Self {
        Self {
            caller,
            tokens: Cache::builder().max_capacity(TOKEN_CACHE_CAPACITY).build(),
            pools: Cache::builder().max_capacity(POOL_CACHE_CAPACITY).build(),
        }
    }

    pub async fn token(&self, address: Address) -> anyhow::Result<TokenInfo> {
        if let Some(token) = self.tokens.get(&address).await {
            return Ok(token);
        }

        let (name, symbol, decimals) = tokio::try_join!(
            self.caller.name(address),
            self.caller.symbol(address),
            self.caller.decimals(address),
        )
        .with_context(|| format!("Failed to fetch metadata of token {}", address))?;

        let token = TokenInfo {
            address,
            name,
            symbol,
            decimals,
        };

        debug!("Cached token {} ({}, {} decimals)", address, token.symbol, decimals);
        self.tokens.insert(address, token.clone()).await;

        Ok(token)
    }

    pub async fn pool(&self, address: Address) -> anyhow::Result<PoolInfo> {
        if let Some(pool) = self.pools.get(&address).await {
            return Ok(pool);
        }

        let (token0, token1) =
            tokio::try_join!(self.caller.token0(address), self.caller.token1(address))
                .with_context(|| format!("Failed to fetch tokens of pool {}", address))?;

        let (token0, token1) = tokio::try_join!(self.token(token0), self.token(token1))?;

        let pool = PoolInfo {
            address,
            token0,
            token1,
        };

        debug!("Cached pool {} ({})", address, pool.label());
        self.pools.insert(address, pool.clone()).await;

        Ok(pool)
    }
}
