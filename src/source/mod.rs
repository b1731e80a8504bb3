//! Upstream data sources of the poller.
//!
//! - [`ActivitySource`] - per-window trade and liquidity records of a pool
//! - [`BlockNumberSource`] - timestamp to block number resolution

mod paging;
mod rpc;
mod scan;

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{de, Deserialize, Deserializer};

pub use paging::{fetch_all_liquidities, fetch_all_trades};
pub use rpc::ContractParserClient;
pub use scan::ScanApi;

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    pub total: usize,
    #[serde(default = "Vec::new", deserialize_with = "deserialize_list")]
    pub data: Vec<T>,
}

/// `null` data decodes as an empty list.
fn deserialize_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Raw trade volume of one user in one window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeRecord {
    #[serde(rename = "userAddress")]
    pub user: Address,
    #[serde(rename = "token0volumes", deserialize_with = "deserialize_big")]
    pub token0_volume: U256,
    #[serde(rename = "token1volumes", deserialize_with = "deserialize_big")]
    pub token1_volume: U256,
}

/// Raw liquidity-seconds of one user in one window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LiquidityRecord {
    #[serde(rename = "userAddress")]
    pub user: Address,
    #[serde(rename = "token0LiquiditySeconds", deserialize_with = "deserialize_big")]
    pub token0_liquidity_seconds: U256,
    #[serde(rename = "token1LiquiditySeconds", deserialize_with = "deserialize_big")]
    pub token1_liquidity_seconds: U256,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BigRepr {
    Number(u64),
    Text(String),
}

/// Big integer given as `0x` hex, decimal string or plain JSON number.
fn deserialize_big<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match BigRepr::deserialize(deserializer)? {
        BigRepr::Number(n) => Ok(U256::from(n)),
        BigRepr::Text(s) => U256::from_str(s.trim()).map_err(de::Error::custom),
    }
}

/// Contract-data service producing per-window activity.
///
/// Paged calls return `Ok(None)` when the service has nothing for the window
/// yet, which is not the same as an empty page.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn first_timestamp(&self) -> anyhow::Result<i64>;

    async fn latest_timestamp(&self) -> anyhow::Result<i64>;

    /// Window length in seconds.
    async fn snapshot_interval(&self) -> anyhow::Result<i64>;

    async fn trade_page(
        &self,
        pool: Address,
        timestamp: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<Page<TradeRecord>>>;

    async fn liquidity_page(
        &self,
        pool: Address,
        timestamp: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<Page<LiquidityRecord>>>;
}

/// Which block to pick when no block has exactly the requested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closest {
    Before,
    After,
}

impl Closest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Closest::Before => "before",
            Closest::After => "after",
        }
    }
}

#[async_trait]
pub trait BlockNumberSource: Send + Sync {
    async fn block_number_by_time(&self, timestamp: i64, closest: Closest) -> anyhow::Result<u64>;
}
