use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::SyncError,
    source::{BlockNumberSource, Closest},
};

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(u64),
    Text(String),
}

impl Numeric {
    fn as_text(&self) -> String {
        match self {
            Numeric::Number(n) => n.to_string(),
            Numeric::Text(s) => s.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ScanResponse {
    status: Numeric,
    #[serde(default)]
    message: String,
    result: Option<Numeric>,
}

impl ScanResponse {
    fn block_number(self) -> anyhow::Result<u64> {
        let status = self.status.as_text();
        if status != "1" {
            return Err(SyncError::Scan {
                status,
                message: self.message,
            }
            .into());
        }

        match self.result {
            Some(Numeric::Number(n)) => Ok(n),
            Some(Numeric::Text(s)) => s
                .trim()
                .parse()
                .with_context(|| format!("Invalid block number in scan result: {}", s)),
            None => Err(anyhow!("Scan response carries no result")),
        }
    }
}

/// Explorer open API client.
pub struct ScanApi {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ScanApi {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build scan HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl BlockNumberSource for ScanApi {
    async fn block_number_by_time(&self, timestamp: i64, closest: Closest) -> anyhow::Result<u64> {
        let timestamp = timestamp.to_string();
        let mut query = vec![
            ("module", "block"),
            ("action", "getblocknobytime"),
            ("timestamp", timestamp.as_str()),
            ("closest", closest.as_str()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apiKey", key.as_str()));
        }

        let resp: ScanResponse = self
            .client
            .get(format!("{}/api", self.base_url))
            .query(&query)
            .send()
            .await
            .context("Failed to query block number by time")?
            .error_for_status()
            .context("Scan request rejected")?
            .json()
            .await
            .context("Failed to decode scan response")?;

        resp.block_number()
            .with_context(|| format!("No block {} timestamp {}", closest.as_str(), timestamp))
    }
}
