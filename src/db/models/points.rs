use std::sync::Arc;

use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::chain::PoolInfo;

/// Points of one user (PostgreSQL)
///
/// Primary Key: user
/// Also used as an additive delta when committing a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPoints {
    pub user: Address,
    pub trade_points: BigDecimal,
    pub liquidity_points: BigDecimal,
}

impl UserPoints {
    pub fn new(user: Address) -> Self {
        Self {
            user,
            trade_points: BigDecimal::zero(),
            liquidity_points: BigDecimal::zero(),
        }
    }
}

/// Points delta of one pool plus its latest TVL.
///
/// `trade_points` and `liquidity_points` are added to the stored values,
/// `tvl` replaces the stored value.
#[derive(Debug, Clone)]
pub struct PoolPoints {
    pub pool: Arc<PoolInfo>,
    pub tvl: BigDecimal,
    pub trade_points: BigDecimal,
    pub liquidity_points: BigDecimal,
}

impl PoolPoints {
    pub fn new(pool: Arc<PoolInfo>) -> Self {
        Self {
            pool,
            tvl: BigDecimal::zero(),
            trade_points: BigDecimal::zero(),
            liquidity_points: BigDecimal::zero(),
        }
    }
}

/// Everything one flushed batch writes, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct PointsCommit {
    /// Timestamp of the last window in the batch, stored as the checkpoint
    pub timestamp: i64,
    pub users: Vec<UserPoints>,
    pub pools: Vec<PoolPoints>,
}
