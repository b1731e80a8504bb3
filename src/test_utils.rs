//! In-memory fakes shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use alloy::primitives::{address, Address, U256};
use anyhow::anyhow;
use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::{
    chain::{ChainCaller, MetadataCache, PoolInfo, TokenInfo},
    config::PollerSettings,
    db::{
        models::{PointsCommit, PoolPoints, PoolWeight, UserPoints},
        PointsStore,
    },
    oracle::{OracleTokens, PriceOracle},
    source::{
        ActivitySource, BlockNumberSource, Closest, LiquidityRecord, Page, TradeRecord,
    },
};

pub const STABLE: Address = address!("00000000000000000000000000000000000000f1");
pub const HUB: Address = address!("00000000000000000000000000000000000000f2");

pub fn addr(n: u8) -> Address {
    Address::with_last_byte(n)
}

/// `amount * 10^decimals` as a raw on-chain integer.
pub fn units(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

/// Value history keyed by the first block it applies to.
#[derive(Default)]
struct History<T>(Vec<(u64, T)>);

impl<T: Clone> History<T> {
    fn set(&mut self, from_block: u64, value: T) {
        self.0.retain(|(b, _)| *b != from_block);
        self.0.push((from_block, value));
        self.0.sort_by_key(|(b, _)| *b);
    }

    fn at(&self, block: Option<u64>) -> Option<T> {
        let block = block.unwrap_or(u64::MAX);
        self.0
            .iter()
            .rev()
            .find(|(b, _)| *b <= block)
            .map(|(_, v)| v.clone())
    }
}

#[derive(Default)]
struct ChainState {
    tokens: HashMap<Address, (String, String, u8)>,
    pools: HashMap<Address, (Address, Address)>,
    pairs: HashMap<(Address, Address), Address>,
    reserves: HashMap<Address, History<(U256, U256)>>,
    balances: HashMap<(Address, Address), History<U256>>,
    failing: bool,
}

/// Fake chain with per-block reserves and balances.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
    metadata_calls: AtomicUsize,
    state_calls: AtomicUsize,
}

impl FakeChain {
    pub fn add_token(&self, token: Address, name: &str, symbol: &str, decimals: u8) {
        self.state
            .lock()
            .unwrap()
            .tokens
            .insert(token, (name.to_string(), symbol.to_string(), decimals));
    }

    /// Register a pool that is not known to the factory.
    pub fn add_pool(&self, pool: Address, token0: Address, token1: Address) {
        self.state
            .lock()
            .unwrap()
            .pools
            .insert(pool, (token0, token1));
    }

    /// Register a pool that the factory resolves for both token orders.
    pub fn add_pair(&self, pair: Address, token0: Address, token1: Address) {
        let mut state = self.state.lock().unwrap();
        state.pools.insert(pair, (token0, token1));
        state.pairs.insert((token0, token1), pair);
        state.pairs.insert((token1, token0), pair);
    }

    pub fn set_reserves(&self, pair: Address, from_block: u64, reserve0: U256, reserve1: U256) {
        self.state
            .lock()
            .unwrap()
            .reserves
            .entry(pair)
            .or_default()
            .set(from_block, (reserve0, reserve1));
    }

    pub fn set_balance(&self, token: Address, account: Address, from_block: u64, value: U256) {
        self.state
            .lock()
            .unwrap()
            .balances
            .entry((token, account))
            .or_default()
            .set(from_block, value);
    }

    /// Make every state read (balances, reserves, pair lookups) fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    fn token_meta(&self, token: Address) -> anyhow::Result<(String, String, u8)> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(&token)
            .cloned()
            .ok_or_else(|| anyhow!("execution reverted: {} is not a token", token))
    }

    fn pool_tokens(&self, pair: Address) -> anyhow::Result<(Address, Address)> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .pools
            .get(&pair)
            .copied()
            .ok_or_else(|| anyhow!("execution reverted: {} is not a pool", pair))
    }

    fn check_state_read(&self) -> anyhow::Result<()> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().unwrap().failing {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainCaller for FakeChain {
    async fn name(&self, token: Address) -> anyhow::Result<String> {
        Ok(self.token_meta(token)?.0)
    }

    async fn symbol(&self, token: Address) -> anyhow::Result<String> {
        Ok(self.token_meta(token)?.1)
    }

    async fn decimals(&self, token: Address) -> anyhow::Result<u8> {
        Ok(self.token_meta(token)?.2)
    }

    async fn balance_of(
        &self,
        token: Address,
        account: Address,
        block: Option<u64>,
    ) -> anyhow::Result<U256> {
        self.check_state_read()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .balances
            .get(&(token, account))
            .and_then(|h| h.at(block))
            .unwrap_or(U256::ZERO))
    }

    async fn get_pair(
        &self,
        _factory: Address,
        a: Address,
        b: Address,
        _block: Option<u64>,
    ) -> anyhow::Result<Address> {
        self.check_state_read()?;
        let state = self.state.lock().unwrap();
        Ok(state.pairs.get(&(a, b)).copied().unwrap_or(Address::ZERO))
    }

    async fn token0(&self, pair: Address) -> anyhow::Result<Address> {
        Ok(self.pool_tokens(pair)?.0)
    }

    async fn token1(&self, pair: Address) -> anyhow::Result<Address> {
        Ok(self.pool_tokens(pair)?.1)
    }

    async fn get_reserves(
        &self,
        pair: Address,
        block: Option<u64>,
    ) -> anyhow::Result<(U256, U256)> {
        self.check_state_read()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .reserves
            .get(&pair)
            .and_then(|h| h.at(block))
            .unwrap_or((U256::ZERO, U256::ZERO)))
    }
}

// ============================================
// Priced world
// ============================================

/// Fake chain with a hub/stable market where 1 hub = 2 USD.
///
/// - pair `addr(60)` (HUB, STABLE) registered in the factory, reserves 10 / 20
/// - pool `addr(50)` (HUB, STABLE) outside the factory, balances 100 / 200
pub struct World {
    pub chain: Arc<FakeChain>,
    pub tokens: OracleTokens,
}

impl World {
    pub fn metadata(&self) -> MetadataCache {
        MetadataCache::new(self.chain.clone())
    }

    pub fn oracle(&self) -> PriceOracle {
        PriceOracle::new(self.chain.clone(), self.metadata(), self.tokens)
    }
}

pub fn world() -> World {
    let chain = Arc::new(FakeChain::default());

    chain.add_token(STABLE, "Tether USD", "USDT", 6);
    chain.add_token(HUB, "Wrapped CFX", "WCFX", 18);

    chain.add_pair(addr(60), HUB, STABLE);
    chain.set_reserves(addr(60), 0, units(10, 18), units(20, 6));

    chain.add_pool(addr(50), HUB, STABLE);
    chain.set_balance(HUB, addr(50), 0, units(100, 18));
    chain.set_balance(STABLE, addr(50), 0, units(200, 6));

    World {
        chain,
        tokens: OracleTokens {
            factory: addr(100),
            stable: STABLE,
            hub: HUB,
            hub_stable_pool: addr(50),
        },
    }
}

pub fn pool_info(pool: Address) -> PoolInfo {
    PoolInfo {
        address: pool,
        token0: TokenInfo {
            address: HUB,
            name: "Wrapped CFX".to_string(),
            symbol: "WCFX".to_string(),
            decimals: 18,
        },
        token1: TokenInfo {
            address: STABLE,
            name: "Tether USD".to_string(),
            symbol: "USDT".to_string(),
            decimals: 6,
        },
    }
}

// ============================================
// Activity source
// ============================================

pub fn trade(user: Address, token0_volume: u64, token1_volume: u64) -> TradeRecord {
    TradeRecord {
        user,
        token0_volume: U256::from(token0_volume),
        token1_volume: U256::from(token1_volume),
    }
}

pub fn liquidity(user: Address, token0_seconds: u64, token1_seconds: u64) -> LiquidityRecord {
    LiquidityRecord {
        user,
        token0_liquidity_seconds: U256::from(token0_seconds),
        token1_liquidity_seconds: U256::from(token1_seconds),
    }
}

#[derive(Default)]
struct SourceState {
    latest: i64,
    failures: usize,
    trades: HashMap<(Address, i64), Vec<TradeRecord>>,
    liquidities: HashMap<(Address, i64), Vec<LiquidityRecord>>,
    not_ready: HashSet<(Address, i64)>,
}

/// Contract-data service with hourly windows. Windows without records
/// return an empty page.
pub struct FakeSource {
    first: i64,
    page_size: Option<usize>,
    state: Mutex<SourceState>,
    page_calls: AtomicUsize,
}

impl FakeSource {
    pub const INTERVAL: i64 = 3600;

    pub fn new(first: i64, latest: i64) -> Self {
        Self {
            first,
            page_size: None,
            state: Mutex::new(SourceState {
                latest,
                ..Default::default()
            }),
            page_calls: AtomicUsize::new(0),
        }
    }

    /// Serve at most `size` records per page when the caller sets no limit.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn set_latest(&self, latest: i64) {
        self.state.lock().unwrap().latest = latest;
    }

    /// Fail the next `n` latest-timestamp queries.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().failures = n;
    }

    pub fn set_trades(&self, pool: Address, timestamp: i64, records: Vec<TradeRecord>) {
        self.state.lock().unwrap().trades.insert((pool, timestamp), records);
    }

    pub fn set_liquidities(&self, pool: Address, timestamp: i64, records: Vec<LiquidityRecord>) {
        self.state
            .lock()
            .unwrap()
            .liquidities
            .insert((pool, timestamp), records);
    }

    /// Answer `null` for both listings of the window.
    pub fn set_not_ready(&self, pool: Address, timestamp: i64, not_ready: bool) {
        let mut state = self.state.lock().unwrap();
        if not_ready {
            state.not_ready.insert((pool, timestamp));
        } else {
            state.not_ready.remove(&(pool, timestamp));
        }
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(
        &self,
        records: Option<&Vec<T>>,
        offset: usize,
        limit: Option<usize>,
    ) -> Page<T> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);

        let records = records.map(Vec::as_slice).unwrap_or_default();
        let size = limit.or(self.page_size).unwrap_or(usize::MAX);

        Page {
            total: records.len(),
            data: records.iter().skip(offset).take(size).cloned().collect(),
        }
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    async fn first_timestamp(&self) -> anyhow::Result<i64> {
        Ok(self.first)
    }

    async fn latest_timestamp(&self) -> anyhow::Result<i64> {
        let mut state = self.state.lock().unwrap();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(state.latest)
    }

    async fn snapshot_interval(&self) -> anyhow::Result<i64> {
        Ok(Self::INTERVAL)
    }

    async fn trade_page(
        &self,
        pool: Address,
        timestamp: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<Page<TradeRecord>>> {
        let state = self.state.lock().unwrap();
        if state.not_ready.contains(&(pool, timestamp)) {
            return Ok(None);
        }
        Ok(Some(self.page(state.trades.get(&(pool, timestamp)), offset, limit)))
    }

    async fn liquidity_page(
        &self,
        pool: Address,
        timestamp: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<Page<LiquidityRecord>>> {
        let state = self.state.lock().unwrap();
        if state.not_ready.contains(&(pool, timestamp)) {
            return Ok(None);
        }
        Ok(Some(self.page(state.liquidities.get(&(pool, timestamp)), offset, limit)))
    }
}

/// Explorer of a chain producing one block every two seconds from genesis.
#[derive(Default)]
pub struct FakeBlocks {
    before: AtomicUsize,
    after: AtomicUsize,
}

impl FakeBlocks {
    pub fn calls(&self, closest: Closest) -> usize {
        match closest {
            Closest::Before => self.before.load(Ordering::SeqCst),
            Closest::After => self.after.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl BlockNumberSource for FakeBlocks {
    async fn block_number_by_time(&self, timestamp: i64, closest: Closest) -> anyhow::Result<u64> {
        let ts = timestamp.max(0) as u64;
        match closest {
            Closest::Before => {
                self.before.fetch_add(1, Ordering::SeqCst);
                Ok(ts / 2)
            },
            Closest::After => {
                self.after.fetch_add(1, Ordering::SeqCst);
                Ok(ts.div_ceil(2))
            },
        }
    }
}

pub fn poller_settings() -> PollerSettings {
    PollerSettings {
        rpc_url: "http://127.0.0.1:8545".to_string(),
        scan_url: "http://127.0.0.1:8080".to_string(),
        scan_api_key: None,
        page_limit: None,
        buffer_size: 16,
        interval_error_secs: 5,
        interval_idle_secs: 60,
        request_timeout_secs: 5,
    }
}

// ============================================
// Points store
// ============================================

#[derive(Default)]
struct StoreState {
    weights: Vec<PoolWeight>,
    users: HashMap<Address, UserPoints>,
    pools: HashMap<Address, PoolPoints>,
    checkpoint: Option<i64>,
}

/// Points store applying each commit atomically under one lock.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    failures: AtomicUsize,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn set_weight(&self, pool: Address, trade_weight: i64, liquidity_weight: i64) {
        let mut state = self.state.lock().unwrap();
        state.weights.retain(|w| w.pool != pool);
        state.weights.push(PoolWeight {
            pool,
            trade_weight: BigDecimal::from(trade_weight),
            liquidity_weight: BigDecimal::from(liquidity_weight),
        });
    }

    pub fn set_checkpoint(&self, timestamp: i64) {
        self.state.lock().unwrap().checkpoint = Some(timestamp);
    }

    /// Reject the next `n` commits.
    pub fn fail_commits(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Successful commits so far.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn checkpoint(&self) -> Option<i64> {
        self.state.lock().unwrap().checkpoint
    }

    pub fn user(&self, user: Address) -> Option<UserPoints> {
        self.state.lock().unwrap().users.get(&user).cloned()
    }

    pub fn pool(&self, pool: Address) -> Option<PoolPoints> {
        self.state.lock().unwrap().pools.get(&pool).cloned()
    }
}

#[async_trait]
impl PointsStore for MemoryStore {
    async fn get_checkpoint(&self) -> anyhow::Result<Option<i64>> {
        Ok(self.checkpoint())
    }

    async fn get_pool_weights(&self) -> anyhow::Result<Vec<PoolWeight>> {
        Ok(self.state.lock().unwrap().weights.clone())
    }

    async fn commit_points(&self, commit: &PointsCommit) -> anyhow::Result<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(anyhow!("could not serialize access due to concurrent update"));
        }

        let mut state = self.state.lock().unwrap();

        if state.checkpoint.is_some_and(|ts| commit.timestamp <= ts) {
            return Ok(());
        }

        for delta in &commit.users {
            let user = state
                .users
                .entry(delta.user)
                .or_insert_with(|| UserPoints::new(delta.user));
            user.trade_points += &delta.trade_points;
            user.liquidity_points += &delta.liquidity_points;
        }

        for delta in &commit.pools {
            let pool = state
                .pools
                .entry(delta.pool.address)
                .or_insert_with(|| PoolPoints::new(delta.pool.clone()));
            pool.trade_points += &delta.trade_points;
            pool.liquidity_points += &delta.liquidity_points;
            pool.tvl = delta.tvl.clone();
        }

        state.checkpoint = Some(commit.timestamp);
        self.commits.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
