use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use num_traits::{One, Zero};

use crate::{
    chain::{ChainCaller, MetadataCache},
    error::PriceError,
    oracle::{found, OracleTokens, PriceProvider},
    utils::{ratio, u256_to_decimal},
};

/// Prices tokens from the reserves of factory-registered pairs.
pub struct RoutedPricer {
    caller: Arc<dyn ChainCaller>,
    metadata: MetadataCache,
    tokens: OracleTokens,
}

impl RoutedPricer {
    pub fn new(caller: Arc<dyn ChainCaller>, metadata: MetadataCache, tokens: OracleTokens) -> Self {
        Self {
            caller,
            metadata,
            tokens,
        }
    }

    /// Price of one `base` in `quote` units from the `(base, quote)` pair reserves.
    ///
    /// Returns [`PriceError::NotFound`] when the factory has no such pair.
    pub async fn price(
        &self,
        base: Address,
        quote: Address,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        let pair = self
            .caller
            .get_pair(self.tokens.factory, base, quote, block)
            .await?;

        if pair.is_zero() {
            return Err(PriceError::NotFound { base, quote });
        }

        let info = self.metadata.pool(pair).await?;
        let (reserve0, reserve1) = self.caller.get_reserves(pair, block).await?;

        let reserve0 = u256_to_decimal(reserve0, info.token0.decimals);
        let reserve1 = u256_to_decimal(reserve1, info.token1.decimals);

        if info.token0.address == base {
            Ok(ratio(&reserve1, &reserve0))
        } else if info.token1.address == base {
            Ok(ratio(&reserve0, &reserve1))
        } else {
            Err(PriceError::TokenNotInPool { pool: pair, token: base })
        }
    }

    /// USD price of `token`.
    ///
    /// The stable token is 1 and the hub goes through the hub/stable pair.
    /// Anything else prefers token/hub/stable and falls back to token/stable
    /// when either hop is missing.
    pub async fn price_auto(
        &self,
        token: Address,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        let OracleTokens { stable, hub, .. } = self.tokens;

        if token == stable {
            return Ok(BigDecimal::one());
        }

        if token == hub {
            return self.price(hub, stable, block).await;
        }

        match self.price_via_hub(token, block).await {
            Err(e) if e.is_not_found() => self.price(token, stable, block).await,
            res => res,
        }
    }

    async fn price_via_hub(
        &self,
        token: Address,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        let in_hub = self.price(token, self.tokens.hub, block).await?;
        let hub_usd = self.price(self.tokens.hub, self.tokens.stable, block).await?;

        if in_hub.is_zero() || hub_usd.is_zero() {
            return Ok(BigDecimal::zero());
        }

        Ok(in_hub * hub_usd)
    }
}

#[async_trait]
impl PriceProvider for RoutedPricer {
    fn name(&self) -> &'static str {
        "routed"
    }

    async fn try_price(
        &self,
        _pool: Address,
        token: Address,
        block: Option<u64>,
    ) -> Result<Option<BigDecimal>, PriceError> {
        found(self.price_auto(token, block).await)
    }
}
