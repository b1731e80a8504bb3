//! USD pricing of pool tokens.
//!
//! Two strategies are available:
//!
//! - [`RoutedPricer`] - reserves of factory-registered pairs, routed through the hub token
//! - [`BalancePricer`] - ERC-20 balances held by the pool itself, for pools the factory
//!   does not know
//!
//! [`PriceOracle`] tries them in order and also computes pool TVL.

mod balance;
mod oracle;
mod routed;

use alloy::primitives::Address;
use async_trait::async_trait;
use bigdecimal::BigDecimal;

pub use balance::BalancePricer;
pub use oracle::PriceOracle;
pub use routed::RoutedPricer;

use crate::{config::ChainSettings, error::PriceError};

/// Well-known addresses the pricing strategies route through.
#[derive(Debug, Clone, Copy)]
pub struct OracleTokens {
    pub factory: Address,
    pub stable: Address,
    pub hub: Address,
    pub hub_stable_pool: Address,
}

impl From<&ChainSettings> for OracleTokens {
    fn from(settings: &ChainSettings) -> Self {
        Self {
            factory: settings.factory,
            stable: settings.stable_token,
            hub: settings.hub_token,
            hub_stable_pool: settings.hub_stable_pool,
        }
    }
}

/// One pricing strategy in the oracle's fallback chain.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// USD price of `token` (traded in `pool`) at `block`.
    ///
    /// `Ok(None)` means this strategy has no route for the token and the next
    /// one should be tried. Any `Err` stops the chain.
    async fn try_price(
        &self,
        pool: Address,
        token: Address,
        block: Option<u64>,
    ) -> Result<Option<BigDecimal>, PriceError>;
}

/// Turn a `NotFound` routing signal into `None`.
fn found(res: Result<BigDecimal, PriceError>) -> Result<Option<BigDecimal>, PriceError> {
    match res {
        Ok(price) => Ok(Some(price)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
