use std::sync::Arc;

use alloy::primitives::Address;
use bigdecimal::BigDecimal;

use crate::{
    chain::PoolInfo,
    source::{LiquidityRecord, TradeRecord},
};

/// One polling window.
///
/// `timestamp` is the label the contract-data service uses; the window covers
/// `[timestamp - interval, timestamp - 1]`. Block bounds are resolved once by
/// the poller and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub timestamp: i64,
    pub interval: i64,
    pub min_block: u64,
    pub max_block: u64,
}

/// Raw activity of one pool in one window.
#[derive(Debug, Clone)]
pub struct PoolActivity {
    pub pool: Address,
    pub trades: Vec<TradeRecord>,
    pub liquidities: Vec<LiquidityRecord>,
}

impl PoolActivity {
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty() && self.liquidities.is_empty()
    }
}

/// Unit of work handed from the poller to the emitter.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub window: Window,
    pub pools: Vec<PoolActivity>,
}

#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub timestamp: i64,
    pub user: Address,
    pub pool: Arc<PoolInfo>,
    pub usd_value0: BigDecimal,
    pub usd_value1: BigDecimal,
}

/// Liquidity provision priced as average USD held per second of the window.
#[derive(Debug, Clone)]
pub struct LiquidityEvent {
    pub timestamp: i64,
    pub user: Address,
    pub pool: Arc<PoolInfo>,
    pub usd_value0_per_second: BigDecimal,
    pub usd_value1_per_second: BigDecimal,
}

/// Priced events of one or more consecutive windows.
#[derive(Debug, Clone)]
pub struct BatchEvent {
    /// Latest window merged into this batch
    pub window: Window,
    pub trades: Vec<TradeEvent>,
    pub liquidities: Vec<LiquidityEvent>,
}

impl BatchEvent {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            trades: Vec::new(),
            liquidities: Vec::new(),
        }
    }

    /// Append `other`'s events and move the window forward to `other`'s.
    pub fn merge(&mut self, other: BatchEvent) {
        self.window = other.window;
        self.trades.extend(other.trades);
        self.liquidities.extend(other.liquidities);
    }

    pub fn len(&self) -> usize {
        self.trades.len() + self.liquidities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
