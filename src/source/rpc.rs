use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy::primitives::Address;
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::source::{ActivitySource, LiquidityRecord, Page, TradeRecord};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client of the contract-data service.
pub struct ContractParserClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl ContractParserClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build contract-data HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method`, returning `None` for a `null` result.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> anyhow::Result<Option<T>> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?
            .error_for_status()
            .with_context(|| format!("{} request rejected", method))?;

        let resp: RpcResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to decode {} response", method))?;

        if let Some(err) = resp.error {
            bail!("{} rpc error {}: {}", method, err.code, err.message);
        }

        Ok(resp.result)
    }

    async fn call_required<T: DeserializeOwned>(&self, method: &str, params: Value) -> anyhow::Result<T> {
        self.call(method, params)
            .await?
            .ok_or_else(|| anyhow!("missing result for {}", method))
    }
}

fn page_params(pool: Address, timestamp: i64, offset: usize, limit: Option<usize>) -> Value {
    match limit {
        Some(limit) => json!([pool, timestamp, offset, limit]),
        None => json!([pool, timestamp, offset]),
    }
}

#[async_trait]
impl ActivitySource for ContractParserClient {
    async fn first_timestamp(&self) -> anyhow::Result<i64> {
        self.call_required("firstTimestamp", json!([])).await
    }

    async fn latest_timestamp(&self) -> anyhow::Result<i64> {
        self.call_required("latestTimestamp", json!([])).await
    }

    async fn snapshot_interval(&self) -> anyhow::Result<i64> {
        self.call_required("snapshotInterval", json!([])).await
    }

    async fn trade_page(
        &self,
        pool: Address,
        timestamp: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<Page<TradeRecord>>> {
        self.call("getTradeData", page_params(pool, timestamp, offset, limit))
            .await
    }

    async fn liquidity_page(
        &self,
        pool: Address,
        timestamp: i64,
        offset: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Option<Page<LiquidityRecord>>> {
        self.call("getLiquidityData", page_params(pool, timestamp, offset, limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_pass_limit_only_when_set() {
        let pool = Address::with_last_byte(0x0a);

        let params = page_params(pool, 3600, 20, None);
        assert_eq!(params.as_array().unwrap().len(), 3);
        assert_eq!(params[1], json!(3600));

        let params = page_params(pool, 3600, 20, Some(50));
        assert_eq!(params[3], json!(50));
    }

    #[test]
    fn test_error_response_is_decoded() {
        let resp: RpcResponse<i64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"not synced"}}"#,
        )
        .unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, -32000);
    }
}
