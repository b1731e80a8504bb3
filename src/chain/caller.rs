use std::{future::IntoFuture, time::Duration};

use alloy::{
    eips::BlockId,
    primitives::{Address, U256},
    providers::{DynProvider, ProviderBuilder},
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use url::Url;

use crate::abis::{IUniswapV2Factory, IUniswapV2Pair, IERC20};

/// Point-in-time contract reads.
///
/// Every state read takes an optional block height; `None` reads at latest.
#[async_trait]
pub trait ChainCaller: Send + Sync {
    async fn name(&self, token: Address) -> anyhow::Result<String>;

    async fn symbol(&self, token: Address) -> anyhow::Result<String>;

    async fn decimals(&self, token: Address) -> anyhow::Result<u8>;

    async fn balance_of(
        &self,
        token: Address,
        account: Address,
        block: Option<u64>,
    ) -> anyhow::Result<U256>;

    /// Pair address for `(a, b)`, zero when the factory has no such pair.
    async fn get_pair(
        &self,
        factory: Address,
        a: Address,
        b: Address,
        block: Option<u64>,
    ) -> anyhow::Result<Address>;

    async fn token0(&self, pair: Address) -> anyhow::Result<Address>;

    async fn token1(&self, pair: Address) -> anyhow::Result<Address>;

    async fn get_reserves(&self, pair: Address, block: Option<u64>)
        -> anyhow::Result<(U256, U256)>;
}

/// [`ChainCaller`] backed by an alloy HTTP provider.
#[derive(Clone)]
pub struct RpcChainCaller {
    provider: DynProvider,
    call_timeout: Duration,
}

impl RpcChainCaller {
    pub fn new(rpc_url: &str, call_timeout: Duration) -> anyhow::Result<Self> {
        let url = Url::parse(rpc_url).context("Invalid chain RPC URL")?;

        let client = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            provider: DynProvider::new(client),
            call_timeout,
        })
    }

    /// Await a contract call, bounded by the configured timeout.
    async fn call<T, E, F>(&self, what: &str, target: Address, fut: F) -> anyhow::Result<T>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(res) => res.with_context(|| format!("{} call on {} failed", what, target)),
            Err(_) => Err(anyhow!(
                "{} call on {} timed out after {:?}",
                what,
                target,
                self.call_timeout
            )),
        }
    }
}

fn block_id(block: Option<u64>) -> BlockId {
    match block {
        Some(number) => BlockId::number(number),
        None => BlockId::latest(),
    }
}

#[async_trait]
impl ChainCaller for RpcChainCaller {
    async fn name(&self, token: Address) -> anyhow::Result<String> {
        let contract = IERC20::new(token, &self.provider);
        self.call("name", token, contract.name().call()).await
    }

    async fn symbol(&self, token: Address) -> anyhow::Result<String> {
        let contract = IERC20::new(token, &self.provider);
        self.call("symbol", token, contract.symbol().call()).await
    }

    async fn decimals(&self, token: Address) -> anyhow::Result<u8> {
        let contract = IERC20::new(token, &self.provider);
        self.call("decimals", token, contract.decimals().call()).await
    }

    async fn balance_of(
        &self,
        token: Address,
        account: Address,
        block: Option<u64>,
    ) -> anyhow::Result<U256> {
        let contract = IERC20::new(token, &self.provider);
        self.call(
            "balanceOf",
            token,
            contract.balanceOf(account).block(block_id(block)).call(),
        )
        .await
    }

    async fn get_pair(
        &self,
        factory: Address,
        a: Address,
        b: Address,
        block: Option<u64>,
    ) -> anyhow::Result<Address> {
        let contract = IUniswapV2Factory::new(factory, &self.provider);
        self.call(
            "getPair",
            factory,
            contract.getPair(a, b).block(block_id(block)).call(),
        )
        .await
    }

    async fn token0(&self, pair: Address) -> anyhow::Result<Address> {
        let contract = IUniswapV2Pair::new(pair, &self.provider);
        self.call("token0", pair, contract.token0().call()).await
    }

    async fn token1(&self, pair: Address) -> anyhow::Result<Address> {
        let contract = IUniswapV2Pair::new(pair, &self.provider);
        self.call("token1", pair, contract.token1().call()).await
    }

    async fn get_reserves(
        &self,
        pair: Address,
        block: Option<u64>,
    ) -> anyhow::Result<(U256, U256)> {
        let contract = IUniswapV2Pair::new(pair, &self.provider);
        let reserves = self
            .call(
                "getReserves",
                pair,
                contract.getReserves().block(block_id(block)).call(),
            )
            .await?;

        Ok((U256::from(reserves.reserve0), U256::from(reserves.reserve1)))
    }
}
