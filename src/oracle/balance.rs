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

/// Prices tokens from the ERC-20 balances a pool holds.
///
/// Works for pools the factory does not know about, as long as the pool's
/// other token is the stable or the hub.
pub struct BalancePricer {
    caller: Arc<dyn ChainCaller>,
    metadata: MetadataCache,
    tokens: OracleTokens,
}

impl BalancePricer {
    pub fn new(caller: Arc<dyn ChainCaller>, metadata: MetadataCache, tokens: OracleTokens) -> Self {
        Self {
            caller,
            metadata,
            tokens,
        }
    }

    /// Price of one `token` in units of the pool's other token.
    pub async fn price(
        &self,
        pool: Address,
        token: Address,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        let info = self.metadata.pool(pool).await?;

        let (base, quote) = match (info.token(token), info.other(token)) {
            (Some(base), Some(quote)) => (base, quote),
            _ => return Err(PriceError::TokenNotInPool { pool, token }),
        };

        let (base_balance, quote_balance) = tokio::try_join!(
            self.caller.balance_of(base.address, pool, block),
            self.caller.balance_of(quote.address, pool, block),
        )?;

        Ok(ratio(
            &u256_to_decimal(quote_balance, quote.decimals),
            &u256_to_decimal(base_balance, base.decimals),
        ))
    }

    /// USD price of `token` traded in `pool`.
    pub async fn price_usd(
        &self,
        pool: Address,
        token: Address,
        block: Option<u64>,
    ) -> Result<BigDecimal, PriceError> {
        let OracleTokens {
            stable,
            hub,
            hub_stable_pool,
            ..
        } = self.tokens;

        if token == stable {
            return Ok(BigDecimal::one());
        }

        if token == hub {
            return self.price(hub_stable_pool, hub, block).await;
        }

        let info = self.metadata.pool(pool).await?;
        let other = info
            .other(token)
            .ok_or(PriceError::TokenNotInPool { pool, token })?
            .address;

        if other == stable {
            return self.price(pool, token, block).await;
        }

        if other != hub {
            return Err(PriceError::NotFound {
                base: token,
                quote: stable,
            });
        }

        let in_hub = self.price(pool, token, block).await?;
        if in_hub.is_zero() {
            return Ok(BigDecimal::zero());
        }

        let hub_usd = self.price(hub_stable_pool, hub, block).await?;

        Ok(in_hub * hub_usd)
    }
}

#[async_trait]
impl PriceProvider for BalancePricer {
    fn name(&self) -> &'static str {
        "balance"
    }

    async fn try_price(
        &self,
        pool: Address,
        token: Address,
        block: Option<u64>,
    ) -> Result<Option<BigDecimal>, PriceError> {
        found(self.price_usd(pool, token, block).await)
    }
}
