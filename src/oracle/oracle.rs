use std::sync::Arc;

use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use log::debug;
use num_traits::Zero;

use crate::{
    chain::{ChainCaller, MetadataCache, PoolInfo, TokenInfo},
    error::PriceError,
    oracle::{BalancePricer, OracleTokens, PriceProvider, RoutedPricer},
    utils::u256_to_decimal,
};

/// Ordered chain of [`PriceProvider`]s.
///
/// Providers are asked in turn until one returns a price or a real error.
#[derive(Clone)]
pub struct PriceOracle {
    caller: Arc<dyn ChainCaller>,
    providers: Vec<Arc<dyn PriceProvider>>,
}

impl PriceOracle {
    /// Routed reserves first, pool balances as fallback.
    pub fn new(caller: Arc<dyn ChainCaller>, metadata: MetadataCache, tokens: OracleTokens) -> Self {
        let providers: Vec<Arc<dyn PriceProvider>> = vec![
            Arc::new(RoutedPricer::new(caller.clone(), metadata.clone(), tokens)),
            Arc::new(BalancePricer::new(caller.clone(), metadata, tokens)),
        ];

        Self::with_providers(caller, providers)
    }

    pub fn with_providers(
        caller: Arc<dyn ChainCaller>,
        providers: Vec<Arc<dyn PriceProvider>>,
    ) -> Self {
        Self {
            caller,
            providers,
        }
    }

    pub async fn price_usd(
        &self,
        pool: Address,
        token: Address,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        for provider in &self.providers {
            if let Some(price) = provider.try_price(pool, token, block).await? {
                return Ok(price);
            }
            debug!("No {} price for {} in pool {}", provider.name(), token, pool);
        }

        Err(PriceError::PoolNotFound { pool, token })
    }

    /// Sum of `balance * price` over both pool tokens at `block`.
    pub async fn pool_tvl(
        &self,
        pool: &PoolInfo,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        let (value0, value1) = tokio::try_join!(
            self.token_value(pool.address, &pool.token0, block),
            self.token_value(pool.address, &pool.token1, block),
        )?;

        Ok(value0 + value1)
    }

    async fn token_value(
        &self,
        pool: Address,
        token: &TokenInfo,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        let balance = self.caller.balance_of(token.address, pool, block).await?;
        if balance.is_zero() {
            return Ok(BigDecimal::zero());
        }

        let price = self.price_usd(pool, token.address, block).await?;

        Ok(u256_to_decimal(balance, token.decimals) * price)
    }
}
