use alloy::primitives::Address;
use bigdecimal::BigDecimal;

use crate::config::PoolSettings;

/// Points multipliers of one pool (PostgreSQL)
///
/// Primary Key: pool
/// Every pool the pipeline syncs must have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolWeight {
    pub pool: Address,
    pub trade_weight: BigDecimal,
    pub liquidity_weight: BigDecimal,
}

impl From<&PoolSettings> for PoolWeight {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            pool: settings.address,
            trade_weight: settings.trade_weight.clone(),
            liquidity_weight: settings.liquidity_weight.clone(),
        }
    }
}

/// Weight row joined with the stored pool symbols, for listing.
#[derive(Debug, Clone)]
pub struct PoolWeightView {
    pub weight: PoolWeight,
    pub token0_symbol: Option<String>,
    pub token1_symbol: Option<String>,
}

impl PoolWeightView {
    /// `SYM0/SYM1`, or `?/?` for a pool that has not been synced yet.
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            self.token0_symbol.as_deref().unwrap_or("?"),
            self.token1_symbol.as_deref().unwrap_or("?")
        )
    }
}
